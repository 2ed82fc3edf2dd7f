use crate::error::{ChartError, ChartResult};
use crate::model::chart::{
    Chart, ChartMetadata, LaneNote, MAX_LANE, NoteFlag, QaKind, Track, validate_sync_track,
};
use log::debug;
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub(crate) const SONG_SECTION: &str = "Song";
pub(crate) const SYNC_SECTION: &str = "SyncTrack";
pub(crate) const EVENTS_SECTION: &str = "Events";
pub(crate) const RESERVED_SECTIONS: [&str; 3] = [SONG_SECTION, SYNC_SECTION, EVENTS_SECTION];

pub(crate) const KNOWN_SONG_KEYS: [&str; 5] =
    ["Name", "Artist", "Charter", "Offset", "Resolution"];

/// Renders a chart to text.
///
/// Sections come out as `[Song]`, `[SyncTrack]`, `[Events]` and then every track in
/// stored order. Lines inside a section are sorted by tick with a stable sort, so
/// notes sharing a tick keep the order they have in the model.
///
/// Forced and Tap are written once per tick for the whole chord, so a chord where
/// only some notes carry a flag reads back with the flag on every note of that tick.
pub fn serialize_chart(chart: &Chart) -> ChartResult<String> {
    let mut out = String::new();

    write_song_section(&mut out, &chart.metadata)?;
    write_sync_section(&mut out, chart)?;
    write_events_section(&mut out, chart)?;

    for track in &chart.tracks {
        write_track_section(&mut out, track)?;
    }

    debug!(
        "Serialized chart '{}' with {} track(s) and {} note(s)..!",
        chart.metadata.name,
        chart.tracks.len(),
        chart.note_count()
    );

    Ok(out)
}

fn violation(message: String) -> ChartError {
    ChartError::FormatInvariantViolation(message)
}

fn check_single_line(what: &str, text: &str) -> ChartResult<()> {
    if text.contains(['\n', '\r']) {
        return Err(violation(format!("{} must fit on one line: {:?}", what, text)));
    }
    Ok(())
}

fn open_section(out: &mut String, name: &str) {
    out.push('[');
    out.push_str(name);
    out.push_str("]\n{\n");
}

fn close_section(out: &mut String) {
    out.push_str("}\n");
}

/// Writes `(tick, rank, body)` lines ordered by tick, then rank, then insertion order.
fn write_body(out: &mut String, mut lines: Vec<(u64, u8, String)>) {
    lines.sort_by_key(|(tick, rank, _)| (*tick, *rank));
    for (tick, _, body) in lines {
        let _ = writeln!(out, "  {} = {}", tick, body);
    }
}

fn write_song_section(out: &mut String, metadata: &ChartMetadata) -> ChartResult<()> {
    if metadata.resolution == 0 {
        return Err(violation("resolution must be greater than 0".into()));
    }

    check_single_line("song name", &metadata.name)?;
    check_single_line("artist", &metadata.artist)?;
    check_single_line("charter", &metadata.charter)?;

    open_section(out, SONG_SECTION);
    let _ = writeln!(out, "  Name = \"{}\"", metadata.name);
    let _ = writeln!(out, "  Artist = \"{}\"", metadata.artist);
    let _ = writeln!(out, "  Charter = \"{}\"", metadata.charter);
    let _ = writeln!(out, "  Offset = {}", metadata.offset_ms);
    let _ = writeln!(out, "  Resolution = {}", metadata.resolution);

    for (key, value) in &metadata.extra {
        check_single_line("song key", key)?;
        check_single_line("song value", value)?;

        let key_ok = !key.trim().is_empty() && key.trim() == key.as_str() && !key.contains('=');
        if !key_ok || KNOWN_SONG_KEYS.contains(&key.as_str()) {
            return Err(violation(format!("unusable [Song] key {:?}", key)));
        }
        let _ = writeln!(out, "  {} = {}", key, value.trim());
    }

    close_section(out);
    Ok(())
}

fn write_sync_section(out: &mut String, chart: &Chart) -> ChartResult<()> {
    if let Some(bad) = chart.sync_track.iter().find(|p| p.milli_bpm() == 0) {
        return Err(ChartError::InvalidTempo {
            tick: bad.tick,
            bpm: bad.bpm(),
        });
    }

    let mut tempos = chart.sync_track.clone();
    tempos.sort_by_key(|p| p.tick);
    validate_sync_track(&tempos)?;

    let mut lines: Vec<(u64, u8, String)> = Vec::new();
    for ts in &chart.time_signatures {
        let body = match ts.denominator_power {
            Some(power) => format!("TS {} {}", ts.numerator, power),
            None => format!("TS {}", ts.numerator),
        };
        lines.push((ts.tick, 0, body));
    }
    for tempo in &tempos {
        lines.push((tempo.tick, 1, format!("B {}", tempo.milli_bpm())));
    }
    for extra in &chart.sync_extras {
        let kind_ok = !extra.kind.is_empty()
            && extra.kind.chars().all(|c| c.is_ascii_alphanumeric())
            && !["B", "TS"].contains(&extra.kind.as_str());
        if !kind_ok {
            return Err(violation(format!("unusable sync event kind {:?}", extra.kind)));
        }
        check_single_line("sync event", &extra.args)?;

        let body = match extra.args.trim() {
            "" => extra.kind.clone(),
            args => format!("{} {}", extra.kind, args),
        };
        lines.push((extra.tick, 2, body));
    }

    open_section(out, SYNC_SECTION);
    write_body(out, lines);
    close_section(out);
    Ok(())
}

fn write_events_section(out: &mut String, chart: &Chart) -> ChartResult<()> {
    let mut lines: Vec<(u64, u8, String)> = Vec::new();

    for event in &chart.events {
        check_single_line("event text", &event.text)?;
        if QaKind::from_marker_text(&event.text).is_some() {
            return Err(violation(format!(
                "event text {:?} is reserved for QA markers",
                event.text
            )));
        }
        lines.push((event.tick, 0, format!("E \"{}\"", event.text)));
    }
    for marker in &chart.qa_markers {
        lines.push((marker.tick, 1, format!("E \"{}\"", marker.kind.marker_text())));
    }

    open_section(out, EVENTS_SECTION);
    write_body(out, lines);
    close_section(out);
    Ok(())
}

fn note_line(note: &LaneNote) -> ChartResult<String> {
    if note.is_open() {
        return Ok(format!("N {} {}", NoteFlag::Open.code(), note.sustain));
    }

    if note.lane > MAX_LANE {
        return Err(violation(format!(
            "lane {} at tick {} is outside 0..={}",
            note.lane, note.tick, MAX_LANE
        )));
    }

    Ok(format!("N {} {}", note.lane, note.sustain))
}

fn write_track_section(out: &mut String, track: &Track) -> ChartResult<()> {
    let name = track.name.as_str();
    let name_ok = !name.is_empty()
        && !name.contains(['[', ']', '\n', '\r'])
        && name.trim() == name
        && !RESERVED_SECTIONS.contains(&name);
    if !name_ok {
        return Err(violation(format!("unusable track section name {:?}", name)));
    }

    let mut notes: Vec<&LaneNote> = track.notes.iter().collect();
    notes.sort_by_key(|n| n.tick);

    let mut lines: Vec<(u64, u8, String)> = Vec::new();
    for chord in notes.chunk_by(|a, b| a.tick == b.tick) {
        let tick = chord[0].tick;
        let mut flags: BTreeSet<NoteFlag> = BTreeSet::new();

        for note in chord {
            lines.push((tick, 0, note_line(note)?));
            flags.extend(note.flags.iter().filter(|f| **f != NoteFlag::Open));
        }

        // Forced/Tap are chord-wide in the game, so they are written once per tick.
        for flag in flags {
            lines.push((tick, 1, format!("N {} 0", flag.code())));
        }
    }

    for phrase in &track.phrases {
        lines.push((phrase.tick, 2, format!("S {} {}", phrase.kind, phrase.length)));
    }

    for event in &track.events {
        check_single_line("track event", &event.text)?;
        lines.push((event.tick, 3, format!("E {}", event.text.trim())));
    }

    open_section(out, name);
    write_body(out, lines);
    close_section(out);
    Ok(())
}
