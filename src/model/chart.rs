use crate::error::{ChartError, ChartResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of playable lanes (Green, Red, Yellow, Blue, Orange).
pub const LANE_COUNT: u8 = 5;
pub const MAX_LANE: u8 = LANE_COUNT - 1;
pub const CENTER_LANE: u8 = 2;

/// Ticks per beat used by most charts in the wild.
pub const DEFAULT_RESOLUTION: u32 = 192;
pub const DEFAULT_BPM: f64 = 120.0;

/// `S` line kind for star power phrases.
pub const STAR_POWER_KIND: u32 = 2;

/// Modifiers the game engine applies to a note independently of its lane.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteFlag {
    Forced,
    Tap,
    /// The engine ignores the lane of an open note. The lane is kept at 0.
    Open,
}

impl NoteFlag {
    pub const fn code(self) -> u8 {
        match self {
            NoteFlag::Forced => 5,
            NoteFlag::Tap => 6,
            NoteFlag::Open => 7,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            5 => Some(NoteFlag::Forced),
            6 => Some(NoteFlag::Tap),
            7 => Some(NoteFlag::Open),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LaneNote {
    pub tick: u64,
    pub lane: u8,
    pub sustain: u64,
    pub flags: BTreeSet<NoteFlag>,
}

impl LaneNote {
    pub fn new(tick: u64, lane: u8, sustain: u64) -> Self {
        Self {
            tick,
            lane,
            sustain,
            flags: BTreeSet::new(),
        }
    }

    /// An open note, stored on the canonical lane 0.
    pub fn open(tick: u64, sustain: u64) -> Self {
        Self::new(tick, 0, sustain).with_flag(NoteFlag::Open)
    }

    pub fn with_flag(mut self, flag: NoteFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn has_flag(&self, flag: NoteFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_open(&self) -> bool {
        self.has_flag(NoteFlag::Open)
    }
}

/// A tempo change. BPM is held as an integer number of milli-BPM, which is
/// exactly what the chart text stores, so tempos never drift on a round-trip.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    pub tick: u64,
    milli_bpm: u64,
}

impl SyncPoint {
    /// Quantises `bpm` to the nearest 1/1000 BPM.
    pub fn from_bpm(tick: u64, bpm: f64) -> ChartResult<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ChartError::InvalidTempo { tick, bpm });
        }

        let milli_bpm = (bpm * 1000.0).round() as u64;
        Self::from_milli_bpm(tick, milli_bpm).map_err(|_| ChartError::InvalidTempo { tick, bpm })
    }

    pub fn from_milli_bpm(tick: u64, milli_bpm: u64) -> ChartResult<Self> {
        if milli_bpm == 0 {
            return Err(ChartError::InvalidTempo { tick, bpm: 0.0 });
        }

        Ok(Self { tick, milli_bpm })
    }

    pub fn bpm(&self) -> f64 {
        self.milli_bpm as f64 / 1000.0
    }

    pub fn milli_bpm(&self) -> u64 {
        self.milli_bpm
    }
}

/// Checks that a tempo map is usable: non-empty, anchored at tick 0 and
/// strictly increasing in tick.
pub fn validate_sync_track(sync_track: &[SyncPoint]) -> ChartResult<()> {
    let Some(first) = sync_track.first() else {
        return Err(ChartError::FormatInvariantViolation(
            "sync track has no tempo".into(),
        ));
    };

    if first.tick != 0 {
        return Err(ChartError::FormatInvariantViolation(format!(
            "first tempo must be at tick 0, found tick {}",
            first.tick
        )));
    }

    for pair in sync_track.windows(2) {
        if pair[1].tick <= pair[0].tick {
            return Err(ChartError::FormatInvariantViolation(format!(
                "tempo at tick {} does not follow tempo at tick {}",
                pair[1].tick, pair[0].tick
            )));
        }
    }

    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u32,
    /// Denominator as a power of two (`2` means x/4). `None` when the line omitted it.
    pub denominator_power: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QaKind {
    /// A higher pitch was charted on a lower lane.
    TooLow,
    /// A lower pitch was charted on a higher lane.
    TooHigh,
    DifferentFretSamePitch,
}

impl QaKind {
    pub const ALL: [QaKind; 3] = [QaKind::TooLow, QaKind::TooHigh, QaKind::DifferentFretSamePitch];

    pub const fn marker_text(self) -> &'static str {
        match self {
            QaKind::TooLow => "Bad_Too_Low",
            QaKind::TooHigh => "Bad_Too_High",
            QaKind::DifferentFretSamePitch => "Bad_Different_Fret",
        }
    }

    pub fn from_marker_text(text: &str) -> Option<Self> {
        QaKind::ALL.into_iter().find(|kind| kind.marker_text() == text)
    }
}

/// Advisory annotation. Never affects lane data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QaMarker {
    pub tick: u64,
    pub kind: QaKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChartEvent {
    pub tick: u64,
    pub text: String,
}

/// A `[SyncTrack]` line of a kind the converter does not interpret, such as an
/// `A` anchor. Kept verbatim and written back after the tempo at the same tick.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RawSyncEvent {
    pub tick: u64,
    pub kind: String,
    pub args: String,
}

/// An `S <kind> <length>` line. Kind 2 is star power.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialPhrase {
    pub tick: u64,
    pub kind: u32,
    pub length: u64,
}

impl SpecialPhrase {
    pub fn star_power(tick: u64, length: u64) -> Self {
        Self {
            tick,
            kind: STAR_POWER_KIND,
            length,
        }
    }
}

/// One difficulty/instrument section, e.g. `ExpertSingle`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    pub name: String,
    pub notes: Vec<LaneNote>,
    pub phrases: Vec<SpecialPhrase>,
    /// Track-local events, raw text after `E `.
    pub events: Vec<ChartEvent>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[default]
    Expert,
}

impl Difficulty {
    /// Section name of the five-fret guitar track for this difficulty.
    pub fn section_name(self) -> String {
        format!("{:?}Single", self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChartMetadata {
    pub name: String,
    pub artist: String,
    pub charter: String,
    pub offset_ms: i64,
    pub resolution: u32,
    /// Unrecognised `[Song]` keys with their raw values, in file order.
    pub extra: Vec<(String, String)>,
}

impl Default for ChartMetadata {
    fn default() -> Self {
        Self {
            name: String::from("Unknown"),
            artist: String::from("Unknown"),
            charter: String::from("Auto-Generated"),
            offset_ms: 0,
            resolution: DEFAULT_RESOLUTION,
            extra: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub sync_track: Vec<SyncPoint>,
    pub time_signatures: Vec<TimeSignature>,
    pub sync_extras: Vec<RawSyncEvent>,
    pub events: Vec<ChartEvent>,
    pub qa_markers: Vec<QaMarker>,
    pub tracks: Vec<Track>,
}

impl Chart {
    pub fn new(metadata: ChartMetadata, sync_track: Vec<SyncPoint>) -> Self {
        Self {
            metadata,
            sync_track,
            time_signatures: Vec::new(),
            sync_extras: Vec::new(),
            events: Vec::new(),
            qa_markers: Vec::new(),
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn track_mut(&mut self, name: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.name == name)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bpm_is_quantised_to_milli_bpm() {
        let point = SyncPoint::from_bpm(0, 123.456_789).unwrap();
        assert_eq!(point.milli_bpm(), 123_457);
        assert_eq!(point.bpm(), 123.457);
    }

    #[test]
    fn non_positive_bpm_is_rejected() {
        assert_eq!(
            SyncPoint::from_bpm(480, 0.0),
            Err(ChartError::InvalidTempo { tick: 480, bpm: 0.0 })
        );
        assert!(SyncPoint::from_bpm(0, -90.0).is_err());
        assert!(SyncPoint::from_bpm(0, f64::NAN).is_err());
        // Rounds down to zero milli-BPM.
        assert!(SyncPoint::from_bpm(0, 0.0001).is_err());
        assert!(SyncPoint::from_milli_bpm(0, 0).is_err());
    }

    #[test]
    fn sync_track_must_start_at_zero_and_increase() {
        let a = SyncPoint::from_bpm(0, 120.0).unwrap();
        let b = SyncPoint::from_bpm(768, 140.0).unwrap();
        let late = SyncPoint::from_bpm(10, 120.0).unwrap();

        assert!(validate_sync_track(&[a, b]).is_ok());
        assert!(validate_sync_track(&[]).is_err());
        assert!(validate_sync_track(&[late]).is_err());
        assert!(validate_sync_track(&[a, b, b]).is_err());
    }

    #[test]
    fn flag_codes() {
        for flag in [NoteFlag::Forced, NoteFlag::Tap, NoteFlag::Open] {
            assert_eq!(NoteFlag::from_code(flag.code()), Some(flag));
        }
        assert_eq!(NoteFlag::from_code(4), None);
    }

    #[test]
    fn qa_marker_texts() {
        assert_eq!(QaKind::from_marker_text("Bad_Too_Low"), Some(QaKind::TooLow));
        assert_eq!(
            QaKind::from_marker_text("Bad_Different_Fret"),
            Some(QaKind::DifferentFretSamePitch)
        );
        assert_eq!(QaKind::from_marker_text("section intro"), None);
    }

    #[test]
    fn difficulty_section_names() {
        assert_eq!(Difficulty::Expert.section_name(), "ExpertSingle");
        assert_eq!(Difficulty::Easy.section_name(), "EasySingle");
    }
}
