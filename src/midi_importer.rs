use crate::model::chart::{DEFAULT_RESOLUTION, SyncPoint, TimeSignature};
use crate::model::song::NoteEvent;
use anyhow::{Result, anyhow, bail};
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const EPSILON_MS: f64 = 2.0;
const DEFAULT_MPQN: u32 = 500_000;
const MILLI_BPM_PER_MPQN: u64 = 60_000_000_000;

/// Simple policy for converting polyphonic MIDI to a single monophonic melody line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyPolicy {
    /// Pick the highest active pitch for a given set of overlapping events.
    #[default]
    Highest,

    /// Pick the lowest active pitch for a given set of overlapping events.
    Lowest,

    /// Pick the highest velocity note for a given set of overlapping events.
    Loudest,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Explicit melody track. When `None` the lead track is guessed.
    pub track_index: Option<usize>,
    pub transpose: i32,
    pub policy: PolyPolicy,
    pub merge: bool,
    /// Target chart resolution the sync track is rescaled to.
    pub resolution: u32,
    /// Case-insensitive track name fragments that mark a lead track.
    pub lead_track_patterns: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            track_index: None,
            transpose: 0,
            policy: PolyPolicy::Highest,
            merge: false,
            resolution: DEFAULT_RESOLUTION,
            lead_track_patterns: ["lead", "melody", "vocal", "synth"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// The melody of a MIDI file plus the timing needed to chart it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMidi {
    /// Monophonic, time-ordered melody.
    pub events: Vec<NoteEvent>,
    /// Tempo map in chart ticks.
    pub sync_track: Vec<SyncPoint>,
    pub time_signatures: Vec<TimeSignature>,
    /// Name of the track the melody was taken from.
    pub track_name: Option<String>,
    /// File name of the source, when imported from disk.
    pub title: Option<String>,
}

struct NoteInterval {
    pub track: usize,
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub velocity: u8,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub ms_at_start: f64,
}

/// A note after tick to ms conversion, before monophonic reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimedNote {
    pitch: u8,
    velocity: u8,
    start_ms: f64,
    duration_ms: f64,
}

#[derive(Debug, Clone)]
struct Point {
    time_ms: f64,
    is_start: bool,
    pitch: u8,
    velocity: u8,
}

#[derive(Debug, Default)]
struct TrackSummary {
    name: Option<String>,
    notes: usize,
    pitch_sum: u64,
}

pub fn import_midi_file<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<ImportedMidi> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let mut imported = import_midi_bytes(&bytes, options)?;
    imported.title = path
        .as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    Ok(imported)
}

pub fn import_midi_bytes(bytes: &[u8], options: &ImportOptions) -> Result<ImportedMidi> {
    if options.resolution == 0 {
        bail!("Chart resolution must be greater than 0..!");
    }

    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };
    if ticks_per_quarter == 0 {
        bail!("MIDI header declares 0 ticks per quarter note..!");
    }

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    tempo_changes.push((0u64, DEFAULT_MPQN)); // default tempo to 120bpm until a tempo meta appears

    let mut signatures: Vec<(u64, u8, u8)> = Vec::new();
    let mut summaries: Vec<TrackSummary> = Vec::new();
    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(usize, u8, u8), Vec<(u64, u8)>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut summary = TrackSummary::default();
        let mut abs_tick: u64 = 0;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        if mpqn == 0 {
                            warn!("Ignoring a zero tempo meta event at tick {}..!", abs_tick);
                            continue;
                        }

                        tempo_changes.push((abs_tick, mpqn));
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                    }
                    MetaMessage::TimeSignature(numerator, denominator_power, _, _) => {
                        signatures.push((abs_tick, *numerator, *denominator_power));
                    }
                    MetaMessage::TrackName(bytes) => {
                        if summary.name.is_none() {
                            let name = String::from_utf8_lossy(bytes).trim().to_string();
                            debug!("Track {} name: {}", track_idx, name);
                            summary.name = Some(name);
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(
                                    &mut open_notes,
                                    &mut intervals,
                                    (track_idx, ch, key.as_int()),
                                    abs_tick,
                                );
                            } else {
                                open_notes
                                    .entry((track_idx, ch, key.as_int()))
                                    .or_default()
                                    .push((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(
                                &mut open_notes,
                                &mut intervals,
                                (track_idx, ch, key.as_int()),
                                abs_tick,
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        summaries.push(summary);
    }

    let last_tick_estimate = intervals
        .iter()
        .map(|interval| interval.end_tick)
        .max()
        .unwrap_or(0)
        .max(
            tempo_changes
                .iter()
                .map(|(tempo, _)| *tempo)
                .max()
                .unwrap_or(0),
        );

    for ((track, ch, key), stack) in open_notes.into_iter() {
        for (start_tick, start_vel) in stack {
            let end_tick = if last_tick_estimate > start_tick {
                last_tick_estimate
            } else {
                start_tick + ticks_per_quarter
            };

            intervals.push(NoteInterval {
                track,
                midi: key,
                start_tick,
                end_tick,
                velocity: start_vel,
            });

            warn!(
                "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                key, ch, start_tick, end_tick
            );
        }
    }

    for interval in intervals.iter() {
        let summary = &mut summaries[interval.track];
        summary.notes += 1;
        summary.pitch_sum += interval.midi as u64;
    }

    let lead = select_lead_track(&summaries, options)?;
    let track_name = lead.and_then(|idx| summaries[idx].name.clone());
    match lead {
        Some(idx) => info!(
            "Using track {} ('{}') as the melody..!",
            idx,
            track_name.as_deref().unwrap_or("<unnamed>")
        ),
        None => warn!("MIDI file contains no notes..!"),
    }

    // A later tempo at the same tick replaces the earlier one.
    tempo_changes.sort_by_key(|(tick, _)| *tick);
    let mut tempo_map: BTreeMap<u64, u32> = BTreeMap::new();
    tempo_map.extend(tempo_changes);

    let mut last_tick: u64 = 0;
    let mut ms_accum: f64 = 0.0;
    let mut last_mpqn: u32 = DEFAULT_MPQN;
    let mut tempo_segments: Vec<TempoSegment> = Vec::new();

    for (&tick, &mpqn) in tempo_map.iter() {
        if tick > last_tick {
            let delta_ticks = (tick - last_tick) as f64;
            ms_accum += delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1000.0;
        }

        // ms_at_start reflects the ms accumulated up to this tick
        tempo_segments.push(TempoSegment {
            start_tick: tick,
            mpqn,
            ms_at_start: ms_accum,
        });

        last_tick = tick;
        last_mpqn = mpqn;
    }

    let ticks_to_ms = |tick: u64| -> f64 {
        let segment = match tempo_segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(s) => s,
            None => &tempo_segments[0],
        };

        let delta_ticks = tick.saturating_sub(segment.start_tick) as f64;
        segment.ms_at_start
            + delta_ticks * (segment.mpqn as f64) / (ticks_per_quarter as f64) / 1000.0
    };

    let mut raw_notes: Vec<TimedNote> = Vec::new();
    for interval in intervals.into_iter().filter(|i| Some(i.track) == lead) {
        let note_id = interval.midi as i32 + options.transpose;

        if !(0..=127).contains(&note_id) {
            warn!("Dropping out-of-range MIDI {} after transpose..!", note_id);
            continue;
        }

        let start_ms = ticks_to_ms(interval.start_tick);
        let end_ms = ticks_to_ms(interval.end_tick);

        if end_ms <= start_ms {
            debug!(
                "Skipping zero/negative duration midi note {}, start: {} end: {}..!",
                interval.midi, start_ms, end_ms
            );
            continue;
        } else if end_ms - start_ms < EPSILON_MS {
            warn!(
                "Culling a tiny note shorter than {}ms..! Duration: {}ms",
                EPSILON_MS,
                end_ms - start_ms
            );
            continue;
        }

        raw_notes.push(TimedNote {
            pitch: note_id as u8,
            velocity: interval.velocity,
            start_ms,
            duration_ms: end_ms - start_ms,
        });
    }

    raw_notes.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));

    let events = reduce_to_monophonic(raw_notes, options.policy, options.merge)
        .into_iter()
        .filter(|note| {
            if note.duration_ms < EPSILON_MS {
                warn!(
                    "Culling final note with a duration below the allowed epsilon..! [{:.3}ms]",
                    note.duration_ms
                );
                return false;
            }
            true
        })
        .map(|note| NoteEvent::new(note.pitch as i32, note.start_ms, note.duration_ms))
        .collect::<Vec<_>>();

    let rescale = |tick: u64| rescale_tick(tick, ticks_per_quarter, options.resolution);
    let sync_track = build_sync_track(&tempo_map, rescale);
    let time_signatures = build_time_signatures(&signatures, rescale);

    debug!(
        "Imported {} melody note(s), {} tempo(s) and {} time signature(s)..!",
        events.len(),
        sync_track.len(),
        time_signatures.len()
    );

    Ok(ImportedMidi {
        events,
        sync_track,
        time_signatures,
        track_name,
        title: None,
    })
}

/// Per-track counts reported by [`inspect_midi_bytes`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOverview {
    pub index: usize,
    pub name: Option<String>,
    pub notes: usize,
    /// `None` for tracks without notes.
    pub average_pitch: Option<f64>,
}

/// What a MIDI file holds, gathered without converting it.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiOverview {
    pub ticks_per_quarter: u64,
    pub tracks: Vec<TrackOverview>,
    /// Tempo in effect at tick 0.
    pub initial_bpm: f64,
    /// Tempo meta events after tick 0.
    pub tempo_changes: usize,
    /// Track that `import_midi_bytes` would pick with the same options.
    pub lead_track: Option<usize>,
}

pub fn inspect_midi_file<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<MidiOverview> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    inspect_midi_bytes(&bytes, options)
}

pub fn inspect_midi_bytes(bytes: &[u8], options: &ImportOptions) -> Result<MidiOverview> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    let mut initial_mpqn = DEFAULT_MPQN;
    let mut tempo_changes = 0;
    let mut summaries: Vec<TrackSummary> = Vec::new();

    for track in smf.tracks.iter() {
        let mut summary = TrackSummary::default();
        let mut abs_tick: u64 = 0;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) if micro.as_int() > 0 => {
                    if abs_tick == 0 {
                        initial_mpqn = micro.as_int();
                    } else {
                        tempo_changes += 1;
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) if summary.name.is_none() => {
                    summary.name = Some(String::from_utf8_lossy(bytes).trim().to_string());
                }
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => {
                    summary.notes += 1;
                    summary.pitch_sum += key.as_int() as u64;
                }
                _ => {}
            }
        }

        summaries.push(summary);
    }

    let lead_track = select_lead_track(&summaries, options)?;
    let tracks = summaries
        .into_iter()
        .enumerate()
        .map(|(index, summary)| TrackOverview {
            index,
            average_pitch: (summary.notes > 0)
                .then(|| summary.pitch_sum as f64 / summary.notes as f64),
            name: summary.name,
            notes: summary.notes,
        })
        .collect();

    Ok(MidiOverview {
        ticks_per_quarter,
        tracks,
        initial_bpm: 60_000_000.0 / initial_mpqn as f64,
        tempo_changes,
        lead_track,
    })
}

/// Explicit index, then the first named lead track with notes, then the
/// track with the highest average pitch. `None` only when there are no notes.
fn select_lead_track(summaries: &[TrackSummary], options: &ImportOptions) -> Result<Option<usize>> {
    if let Some(idx) = options.track_index {
        let Some(summary) = summaries.get(idx) else {
            bail!(
                "Track {} does not exist, the file has {} track(s)..!",
                idx,
                summaries.len()
            );
        };
        if summary.notes == 0 {
            bail!("Track {} contains no notes..!", idx);
        }
        return Ok(Some(idx));
    }

    let patterns: Vec<String> = options
        .lead_track_patterns
        .iter()
        .map(|p| p.to_lowercase())
        .collect();

    let by_name = summaries.iter().position(|summary| {
        summary.notes > 0
            && summary.name.as_ref().is_some_and(|name| {
                let name = name.to_lowercase();
                patterns.iter().any(|p| !p.is_empty() && name.contains(p.as_str()))
            })
    });
    if by_name.is_some() {
        return Ok(by_name);
    }

    // Compares pitch_sum/notes without floats; the first track wins ties.
    let mut best: Option<usize> = None;
    for (idx, summary) in summaries.iter().enumerate() {
        if summary.notes == 0 {
            continue;
        }
        let higher = best.is_none_or(|b| {
            let current = &summaries[b];
            summary.pitch_sum as u128 * current.notes as u128
                > current.pitch_sum as u128 * summary.notes as u128
        });
        if higher {
            best = Some(idx);
        }
    }

    Ok(best)
}

/// `round(tick * resolution / ppq)` in integer arithmetic.
fn rescale_tick(tick: u64, ppq: u64, resolution: u32) -> u64 {
    let scaled = (tick as u128 * resolution as u128 * 2 + ppq as u128) / (ppq as u128 * 2);
    scaled as u64
}

fn build_sync_track(
    tempo_map: &BTreeMap<u64, u32>,
    rescale: impl Fn(u64) -> u64,
) -> Vec<SyncPoint> {
    let mut sync_track: Vec<SyncPoint> = Vec::new();

    for (&tick, &mpqn) in tempo_map.iter() {
        let milli_bpm = (MILLI_BPM_PER_MPQN + mpqn as u64 / 2) / mpqn as u64;
        let point = match SyncPoint::from_milli_bpm(rescale(tick), milli_bpm) {
            Ok(point) => point,
            Err(e) => {
                warn!("Dropping tempo at tick {}: {}..!", tick, e);
                continue;
            }
        };

        // Two MIDI tempos may land on the same chart tick after rescaling.
        match sync_track.last_mut() {
            Some(last) if last.tick == point.tick => *last = point,
            _ => sync_track.push(point),
        }
    }

    sync_track
}

fn build_time_signatures(
    signatures: &[(u64, u8, u8)],
    rescale: impl Fn(u64) -> u64,
) -> Vec<TimeSignature> {
    let mut sorted = signatures.to_vec();
    sorted.sort_by_key(|(tick, _, _)| *tick);

    let mut out: Vec<TimeSignature> = Vec::new();
    for (tick, numerator, denominator_power) in sorted {
        let signature = TimeSignature {
            tick: rescale(tick),
            numerator: numerator as u32,
            // x/4 is the implied default
            denominator_power: (denominator_power != 2).then_some(denominator_power as u32),
        };

        match out.last_mut() {
            Some(last) if last.tick == signature.tick => *last = signature,
            _ => out.push(signature),
        }
    }

    out
}

fn close_note(
    open_notes: &mut HashMap<(usize, u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    key: (usize, u8, u8),
    abs_tick: u64,
) {
    let (track, ch, midi_num) = key;

    if let Some((start_tick, start_vel)) = open_notes.get_mut(&key).and_then(|stack| stack.pop()) {
        intervals.push(NoteInterval {
            track,
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
            velocity: start_vel,
        });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}

/// Given a possibly-overlapping set of notes, reduce to a single monophonic sequence according
/// to the specified policy. The notes emitted by this function do not overlap.
///
/// Basic approach: create a sorted set of time points where something changes (start or end), and
/// at each point decide which note should be active using the policy.
fn reduce_to_monophonic(notes: Vec<TimedNote>, policy: PolyPolicy, merge: bool) -> Vec<TimedNote> {
    if notes.is_empty() {
        return notes;
    }

    let mut points: Vec<Point> = Vec::new();
    for note in notes.into_iter() {
        points.push(Point {
            time_ms: note.start_ms,
            is_start: true,
            pitch: note.pitch,
            velocity: note.velocity,
        });
        points.push(Point {
            time_ms: note.start_ms + note.duration_ms,
            is_start: false,
            pitch: note.pitch,
            velocity: note.velocity,
        });
    }

    // Points with `is_start == false` come before `is_start == true` for the same time_ms,
    // so that notes ending at some time_ms `t` will not be counted active for another
    // note starting at the same `t`.
    points.sort_by(|a, b| {
        a.time_ms
            .total_cmp(&b.time_ms)
            .then_with(|| (a.is_start as u8).cmp(&(b.is_start as u8)))
    });

    let mut result: Vec<TimedNote> = Vec::new();
    let mut current: Option<(u8, u8, f64)> = None;
    let mut active: BTreeMap<u8, u8> = BTreeMap::new();

    let mut reduced = false;
    for pt in points.into_iter() {
        if pt.is_start {
            active.insert(pt.pitch, pt.velocity);
        } else {
            active.remove(&pt.pitch);
        }

        let chosen: Option<(u8, u8)> = match policy {
            PolyPolicy::Highest => active.iter().next_back().map(|(&p, &v)| (p, v)),
            PolyPolicy::Lowest => active.iter().next().map(|(&p, &v)| (p, v)),
            PolyPolicy::Loudest => active
                .iter()
                .max_by_key(|(_, vel)| **vel)
                .map(|(&p, &v)| (p, v)),
        };

        if active.len() > 1 && !reduced {
            reduced = true;
            warn!(
                "MIDI contains multiple overlapping notes, so reducing to monophony \
                 according to the chosen policy [{:?}]..!",
                policy
            );
        }

        if chosen.map(|(p, _)| p) != current.map(|(p, _, _)| p) {
            if let Some((pitch, velocity, start)) = current
                && pt.time_ms > start + EPSILON_MS
            {
                result.push(TimedNote {
                    pitch,
                    velocity,
                    start_ms: start,
                    duration_ms: pt.time_ms - start,
                });
            }

            current = chosen.map(|(pitch, velocity)| (pitch, velocity, pt.time_ms));
        }
    }

    let mut n = 0;
    let mut merged: Vec<TimedNote> = Vec::new();
    for note in result.into_iter() {
        if let Some(last) = merged.last_mut()
            && merge
            && last.pitch == note.pitch
            && ((last.start_ms + last.duration_ms) - note.start_ms).abs() <= EPSILON_MS
        {
            n += 1;
            let new_end = (last.start_ms + last.duration_ms).max(note.start_ms + note.duration_ms);
            last.duration_ms = new_end - last.start_ms;
            continue;
        }

        merged.push(note);
    }

    if merge && n > 0 {
        warn!(
            "Merged {} consecutive note(s) during monophonic reduction..!",
            n
        );
    }

    merged
}
