use crate::chart::writer::{EVENTS_SECTION, SONG_SECTION, SYNC_SECTION};
use crate::error::{ChartError, ChartResult};
use crate::model::chart::{
    Chart, ChartEvent, ChartMetadata, LaneNote, MAX_LANE, NoteFlag, QaKind, QaMarker,
    RawSyncEvent, SpecialPhrase, SyncPoint, TimeSignature, Track,
};
use log::debug;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Song,
    SyncTrack,
    Events,
    /// Index into `Chart::tracks`.
    Track(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Between sections, waiting for a `[Name]` header.
    Start,
    /// Header read, waiting for `{`.
    Opening { name: String, kind: SectionKind },
    InSection { name: String, kind: SectionKind },
}

/// Parses chart text.
///
/// Sections may come in any order. Unknown `[Song]` keys are kept in
/// `ChartMetadata::extra` and unknown `[SyncTrack]` kinds in `Chart::sync_extras`.
/// The first malformed line stops parsing with a positioned error.
pub fn parse_chart(text: &str) -> ChartResult<Chart> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ChartReader::new();

    for (idx, raw) in text.lines().enumerate() {
        reader.feed(idx + 1, raw)?;
    }

    let chart = reader.finish()?;
    debug!(
        "Parsed chart '{}' with {} tempo(s), {} track(s) and {} note(s)..!",
        chart.metadata.name,
        chart.sync_track.len(),
        chart.tracks.len(),
        chart.note_count()
    );

    Ok(chart)
}

struct ChartReader {
    chart: Chart,
    state: State,
    seen: HashSet<String>,
    last_ok_line: usize,
    sync_header_line: Option<usize>,
    /// Last tick read in the current section, for ordering checks.
    last_tick: Option<u64>,
}

/// A `<tick> = <kind> <args>` body line.
struct BodyLine<'a> {
    tick: u64,
    kind: &'a str,
    args: &'a str,
}

impl ChartReader {
    fn new() -> Self {
        let metadata = ChartMetadata {
            name: String::new(),
            artist: String::new(),
            charter: String::new(),
            ..Default::default()
        };

        Self {
            chart: Chart::new(metadata, Vec::new()),
            state: State::Start,
            seen: HashSet::new(),
            last_ok_line: 0,
            sync_header_line: None,
            last_tick: None,
        }
    }

    fn section_name(&self) -> Option<&str> {
        match &self.state {
            State::Start => None,
            State::Opening { name, .. } | State::InSection { name, .. } => Some(name.as_str()),
        }
    }

    fn error(&self, line: usize, reason: impl Into<String>) -> ChartError {
        ChartError::parse(line, self.section_name(), reason)
    }

    fn feed(&mut self, line_no: usize, raw: &str) -> ChartResult<()> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        match self.state.clone() {
            State::Start => self.read_header(line_no, line)?,
            State::Opening { name, kind } => {
                if line != "{" {
                    let reason = format!("expected '{{' after [{}], found {:?}", name, line);
                    return Err(self.error(line_no, reason));
                }
                self.state = State::InSection { name, kind };
            }
            State::InSection { kind, .. } => {
                if line == "}" {
                    self.state = State::Start;
                    self.last_tick = None;
                } else {
                    match kind {
                        SectionKind::Song => self.read_song_line(line_no, line)?,
                        SectionKind::SyncTrack => self.read_sync_line(line_no, line)?,
                        SectionKind::Events => self.read_event_line(line_no, line)?,
                        SectionKind::Track(index) => self.read_track_line(line_no, line, index)?,
                    }
                }
            }
        }

        self.last_ok_line = line_no;
        Ok(())
    }

    fn read_header(&mut self, line_no: usize, line: &str) -> ChartResult<()> {
        let name = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.contains(['[', ']']))
            .ok_or_else(|| {
                self.error(line_no, format!("expected a section header, found {:?}", line))
            })?;

        if !self.seen.insert(name.to_owned()) {
            return Err(self.error(line_no, format!("duplicate section [{}]", name)));
        }

        let kind = match name {
            SONG_SECTION => SectionKind::Song,
            SYNC_SECTION => {
                self.sync_header_line = Some(line_no);
                SectionKind::SyncTrack
            }
            EVENTS_SECTION => SectionKind::Events,
            _ => {
                self.chart.tracks.push(Track::new(name));
                SectionKind::Track(self.chart.tracks.len() - 1)
            }
        };

        self.state = State::Opening {
            name: name.to_owned(),
            kind,
        };
        Ok(())
    }

    fn read_song_line(&mut self, line_no: usize, line: &str) -> ChartResult<()> {
        let Some((key, value)) = line.split_once('=') else {
            return Err(self.error(line_no, format!("expected 'key = value', found {:?}", line)));
        };
        let key = key.trim();
        let value = value.trim();

        if key.is_empty() {
            return Err(self.error(line_no, "missing key before '='"));
        }

        match key {
            "Name" => self.chart.metadata.name = unquote(value).to_owned(),
            "Artist" => self.chart.metadata.artist = unquote(value).to_owned(),
            "Charter" => self.chart.metadata.charter = unquote(value).to_owned(),
            "Offset" => {
                let offset = value.parse::<i64>().map_err(|_| {
                    self.error(line_no, format!("Offset must be an integer, found {:?}", value))
                })?;
                self.chart.metadata.offset_ms = offset;
            }
            "Resolution" => {
                let resolution = value.parse::<u32>().ok().filter(|r| *r > 0);
                let Some(resolution) = resolution else {
                    let reason =
                        format!("Resolution must be a positive integer, found {:?}", value);
                    return Err(self.error(line_no, reason));
                };
                self.chart.metadata.resolution = resolution;
            }
            _ => {
                debug!("Keeping unknown [Song] key '{}'..!", key);
                let extra = &mut self.chart.metadata.extra;
                match extra.iter_mut().find(|(k, _)| k == key) {
                    Some(entry) => entry.1 = value.to_owned(),
                    None => extra.push((key.to_owned(), value.to_owned())),
                }
            }
        }

        Ok(())
    }

    fn split_body_line<'a>(&self, line_no: usize, line: &'a str) -> ChartResult<BodyLine<'a>> {
        let Some((tick, rest)) = line.split_once('=') else {
            let reason = format!("expected '<tick> = <event>', found {:?}", line);
            return Err(self.error(line_no, reason));
        };

        let tick = tick
            .trim()
            .parse::<u64>()
            .map_err(|_| self.error(line_no, format!("invalid tick {:?}", tick.trim())))?;

        let rest = rest.trim();
        let (kind, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if kind.is_empty() {
            return Err(self.error(line_no, "missing event type after '='"));
        }

        Ok(BodyLine {
            tick,
            kind,
            args: args.trim(),
        })
    }

    /// Parses exactly `N` whitespace separated integers.
    fn numbers<const N: usize>(
        &self,
        line_no: usize,
        body: &BodyLine<'_>,
    ) -> ChartResult<[u64; N]> {
        let values: Vec<u64> = body
            .args
            .split_whitespace()
            .map(|v| v.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| {
                let reason = format!("invalid number in '{} {}'", body.kind, body.args);
                self.error(line_no, reason)
            })?;

        values.try_into().map_err(|values: Vec<u64>| {
            self.error(
                line_no,
                format!("'{}' expects {} value(s), found {}", body.kind, N, values.len()),
            )
        })
    }

    fn check_order(&mut self, line_no: usize, tick: u64) -> ChartResult<()> {
        if let Some(last) = self.last_tick
            && tick < last
        {
            return Err(self.error(line_no, format!("tick {} comes after tick {}", tick, last)));
        }
        self.last_tick = Some(tick);
        Ok(())
    }

    fn read_sync_line(&mut self, line_no: usize, line: &str) -> ChartResult<()> {
        let body = self.split_body_line(line_no, line)?;
        self.check_order(line_no, body.tick)?;

        match body.kind {
            "B" => {
                let milli_bpm = match body.args.split_whitespace().collect::<Vec<_>>()[..] {
                    [value] => value.parse::<i64>().ok(),
                    _ => None,
                };
                let Some(milli_bpm) = milli_bpm else {
                    return Err(self.error(line_no, format!("invalid tempo {:?}", body.args)));
                };
                if milli_bpm <= 0 {
                    return Err(ChartError::InvalidTempo {
                        tick: body.tick,
                        bpm: milli_bpm as f64 / 1000.0,
                    });
                }

                if let Some(prev) = self.chart.sync_track.last()
                    && prev.tick >= body.tick
                {
                    return Err(self.error(line_no, format!("second tempo at tick {}", body.tick)));
                }
                if self.chart.sync_track.is_empty() && body.tick != 0 {
                    return Err(self.error(
                        line_no,
                        format!("first tempo must be at tick 0, found tick {}", body.tick),
                    ));
                }

                let point = SyncPoint::from_milli_bpm(body.tick, milli_bpm as u64)?;
                self.chart.sync_track.push(point);
            }
            "TS" => {
                let values: Vec<&str> = body.args.split_whitespace().collect();
                let parse = |v: &str| v.parse::<u32>().ok();
                let (numerator, denominator_power) = match values.as_slice() {
                    [n] => (parse(*n), None),
                    [n, d] => (parse(*n), Some(parse(*d))),
                    _ => (None, None),
                };

                let invalid = || format!("invalid time signature {:?}", body.args);
                let Some(numerator) = numerator else {
                    return Err(self.error(line_no, invalid()));
                };
                let denominator_power = match denominator_power {
                    Some(Some(power)) => Some(power),
                    Some(None) => return Err(self.error(line_no, invalid())),
                    None => None,
                };

                self.chart.time_signatures.push(TimeSignature {
                    tick: body.tick,
                    numerator,
                    denominator_power,
                });
            }
            other if other.chars().all(|c| c.is_ascii_alphanumeric()) => {
                debug!("Keeping [SyncTrack] '{}' line at tick {}..!", other, body.tick);
                self.chart.sync_extras.push(RawSyncEvent {
                    tick: body.tick,
                    kind: other.to_owned(),
                    args: body.args.to_owned(),
                });
            }
            other => {
                return Err(self.error(line_no, format!("malformed sync event '{}'", other)));
            }
        }

        Ok(())
    }

    fn read_event_line(&mut self, line_no: usize, line: &str) -> ChartResult<()> {
        let body = self.split_body_line(line_no, line)?;
        self.check_order(line_no, body.tick)?;

        if body.kind != "E" {
            return Err(self.error(line_no, format!("unsupported global event '{}'", body.kind)));
        }

        let text = unquote(body.args);
        match QaKind::from_marker_text(text) {
            Some(kind) => self.chart.qa_markers.push(QaMarker {
                tick: body.tick,
                kind,
            }),
            None => self.chart.events.push(ChartEvent {
                tick: body.tick,
                text: text.to_owned(),
            }),
        }

        Ok(())
    }

    fn read_track_line(&mut self, line_no: usize, line: &str, index: usize) -> ChartResult<()> {
        let body = self.split_body_line(line_no, line)?;
        self.check_order(line_no, body.tick)?;

        match body.kind {
            "N" => {
                let [code, sustain] = self.numbers::<2>(line_no, &body)?;
                let note = match code {
                    lane if lane <= MAX_LANE as u64 => {
                        Some(LaneNote::new(body.tick, lane as u8, sustain))
                    }
                    7 => Some(LaneNote::open(body.tick, sustain)),
                    5 | 6 => None,
                    other => {
                        return Err(self.error(line_no, format!("unsupported note code {}", other)));
                    }
                };

                if let Some(note) = note {
                    self.chart.tracks[index].notes.push(note);
                    return Ok(());
                }

                // Forced/Tap lines apply to the notes already read at this tick.
                let flag = match NoteFlag::from_code(code as u8) {
                    Some(flag) => flag,
                    None => {
                        let reason = format!("unsupported note code {}", code);
                        return Err(self.error(line_no, reason));
                    }
                };
                if sustain != 0 {
                    let reason = format!("flag line must have length 0, found {}", sustain);
                    return Err(self.error(line_no, reason));
                }

                let mut applied = 0;
                for note in self.chart.tracks[index]
                    .notes
                    .iter_mut()
                    .rev()
                    .take_while(|n| n.tick == body.tick)
                {
                    note.flags.insert(flag);
                    applied += 1;
                }

                if applied == 0 {
                    let reason = format!("{:?} flag at tick {} has no note", flag, body.tick);
                    return Err(self.error(line_no, reason));
                }
            }
            "S" => {
                let [kind, length] = self.numbers::<2>(line_no, &body)?;
                let kind = u32::try_from(kind)
                    .map_err(|_| self.error(line_no, format!("invalid phrase kind {}", kind)))?;

                self.chart.tracks[index].phrases.push(SpecialPhrase {
                    tick: body.tick,
                    kind,
                    length,
                });
            }
            "E" => {
                self.chart.tracks[index].events.push(ChartEvent {
                    tick: body.tick,
                    text: body.args.to_owned(),
                });
            }
            other => {
                return Err(self.error(line_no, format!("unsupported track event '{}'", other)));
            }
        }

        Ok(())
    }

    fn finish(self) -> ChartResult<Chart> {
        if let State::Opening { name, .. } | State::InSection { name, .. } = &self.state {
            return Err(ChartError::parse(
                self.last_ok_line,
                Some(name.as_str()),
                format!(
                    "missing closing '}}' before end of file, last parsed line was {}",
                    self.last_ok_line
                ),
            ));
        }

        if !self.seen.contains(SONG_SECTION) {
            return Err(ChartError::parse(self.last_ok_line, None, "missing [Song] section"));
        }

        let Some(sync_line) = self.sync_header_line else {
            return Err(ChartError::parse(self.last_ok_line, None, "missing [SyncTrack] section"));
        };
        if self.chart.sync_track.is_empty() {
            return Err(ChartError::parse(sync_line, Some(SYNC_SECTION), "sync track has no tempo"));
        }

        Ok(self.chart)
    }
}

/// Strips one pair of surrounding double quotes, if present.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
