use crate::error::ChartResult;
use crate::mapper::{QaFinding, detect_qa_issues, map_lanes};
use crate::model::chart::{
    Chart, ChartEvent, ChartMetadata, LaneNote, QaMarker, SyncPoint, TimeSignature, Track,
};
use crate::model::config::ConvertConfig;
use crate::model::song::NoteEvent;
use crate::timing::TickClock;
use log::{debug, info, warn};

/// Result of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub chart: Chart,
    /// Final lane per input event, in input order.
    pub lanes: Vec<u8>,
    /// QA findings, indexed by input event. Present even when markers are not attached.
    pub findings: Vec<QaFinding>,
}

/// Maps time-ordered note events onto a chart.
///
/// An empty `sync_track` means a single tempo of `config.default_bpm`. The
/// resolution in `metadata` is replaced by `config.resolution`. Unless switched
/// off in `config`, the chart opens with `TS 4 2` and a `section intro` event at tick 0.
pub fn convert_events(
    events: &[NoteEvent],
    sync_track: &[SyncPoint],
    mut metadata: ChartMetadata,
    config: &ConvertConfig,
) -> ChartResult<Conversion> {
    let lanes = map_lanes(events, &config.mapping)?;

    let pitches: Vec<i32> = events.iter().map(|e| e.pitch).collect();
    let findings = detect_qa_issues(&pitches, &lanes, &config.qa);

    let sync_track = if sync_track.is_empty() {
        debug!("No tempo map given, using {} BPM..!", config.default_bpm);
        vec![SyncPoint::from_bpm(0, config.default_bpm)?]
    } else {
        sync_track.to_vec()
    };

    let clock = TickClock::new(&sync_track, config.resolution)?;
    let min_sustain = clock.beats_to_ticks(config.min_sustain_beats);

    let notes: Vec<LaneNote> = events
        .iter()
        .zip(&lanes)
        .map(|(event, &lane)| {
            let tick = clock.ms_to_tick(event.start_ms);
            let length = clock.ms_to_tick(event.end_ms()).saturating_sub(tick);
            let sustain = if length > 0 && length >= min_sustain { length } else { 0 };
            LaneNote::new(tick, lane, sustain)
        })
        .collect();

    metadata.resolution = config.resolution;
    let mut chart = Chart::new(metadata, sync_track);

    if config.default_time_signature {
        chart.time_signatures.push(TimeSignature {
            tick: 0,
            numerator: 4,
            denominator_power: Some(2),
        });
    }
    if config.intro_section {
        chart.events.push(ChartEvent {
            tick: 0,
            text: String::from("section intro"),
        });
    }

    for difficulty in &config.difficulties {
        let name = difficulty.section_name();
        if chart.track(&name).is_some() {
            continue;
        }

        let mut track = Track::new(name);
        track.notes = notes.clone();
        chart.tracks.push(track);
    }

    if !findings.is_empty() {
        warn!(
            "Flagged {} suspicious lane assignment(s) for review..!",
            findings.len()
        );
    }

    if config.include_qa {
        chart.qa_markers = findings
            .iter()
            .map(|finding| QaMarker {
                tick: notes[finding.index].tick,
                kind: finding.kind,
            })
            .collect();
    }

    info!(
        "Converted {} event(s) into {} track(s) at resolution {}..!",
        events.len(),
        chart.tracks.len(),
        config.resolution
    );

    Ok(Conversion {
        chart,
        lanes,
        findings,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ChartError;
    use crate::model::chart::{Difficulty, QaKind};
    use crate::model::config::MappingConfig;
    use pretty_assertions::assert_eq;

    fn ev(pitch: i32, start_ms: f64, duration_ms: f64) -> NoteEvent {
        NoteEvent::new(pitch, start_ms, duration_ms)
    }

    fn convert(events: &[NoteEvent], config: &ConvertConfig) -> Conversion {
        convert_events(events, &[], ChartMetadata::default(), config).unwrap()
    }

    fn expert_lanes(chart: &Chart) -> Vec<u8> {
        chart
            .track("ExpertSingle")
            .unwrap()
            .notes
            .iter()
            .map(|n| n.lane)
            .collect()
    }

    #[test]
    fn ascending_triad() {
        env_logger::try_init().unwrap_or(());

        let events = [ev(60, 0.0, 200.0), ev(64, 300.0, 200.0), ev(67, 600.0, 200.0)];
        let conversion = convert(&events, &ConvertConfig::default());

        assert_eq!(conversion.lanes, vec![0, 2, 4]);
        assert_eq!(expert_lanes(&conversion.chart), vec![0, 2, 4]);

        // 120 BPM at 192 ticks per beat: 2.604ms per tick
        let ticks: Vec<u64> = conversion.chart.tracks[0].notes.iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![0, 115, 230]);

        // 200ms is shorter than half a beat
        assert!(conversion.chart.tracks[0].notes.iter().all(|n| n.sustain == 0));
        assert!(conversion.chart.qa_markers.is_empty());
    }

    #[test]
    fn single_note_is_centered_without_markers() {
        let conversion = convert(&[ev(69, 0.0, 500.0)], &ConvertConfig::default());

        assert_eq!(
            conversion.chart.tracks[0].notes,
            vec![LaneNote::new(0, 2, 192)]
        );
        assert!(conversion.findings.is_empty());
        assert!(conversion.chart.qa_markers.is_empty());
    }

    #[test]
    fn zigzag_is_clamped_and_stays_put() {
        let config = ConvertConfig {
            mapping: MappingConfig {
                max_lane_jump: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let events = [ev(60, 0.0, 200.0), ev(64, 250.0, 200.0), ev(60, 500.0, 200.0)];

        assert_eq!(convert(&events, &config).lanes, vec![0, 1, 0]);
    }

    #[test]
    fn repeated_pitch_on_new_lane_gets_a_marker() {
        env_logger::try_init().unwrap_or(());

        // The last note sits alone in its phrase, so it is centered.
        let events = [ev(60, 0.0, 200.0), ev(64, 300.0, 200.0), ev(60, 1500.0, 200.0)];
        let conversion = convert(&events, &ConvertConfig::default());

        assert_eq!(conversion.lanes, vec![0, 2, 2]);
        assert_eq!(
            conversion.chart.qa_markers,
            vec![QaMarker {
                tick: 576,
                kind: QaKind::DifferentFretSamePitch
            }]
        );

        let config = ConvertConfig {
            include_qa: false,
            ..Default::default()
        };
        let conversion = convert(&events, &config);
        assert_eq!(conversion.findings.len(), 1);
        assert!(conversion.chart.qa_markers.is_empty());
    }

    #[test]
    fn ticks_follow_the_tempo_map() {
        let sync = [
            SyncPoint::from_bpm(0, 120.0).unwrap(),
            SyncPoint::from_bpm(384, 60.0).unwrap(),
        ];
        // Two beats at 120 BPM take 1000ms; after that a beat is 1000ms.
        let events = [ev(60, 500.0, 400.0), ev(62, 1000.0, 900.0), ev(64, 2500.0, 100.0)];
        let config = ConvertConfig::default();
        let conversion = convert_events(&events, &sync, ChartMetadata::default(), &config).unwrap();

        let notes = &conversion.chart.tracks[0].notes;
        let ticks: Vec<u64> = notes.iter().map(|n| n.tick).collect();
        assert_eq!(ticks, vec![192, 384, 672]);
        assert_eq!(notes[1].sustain, 173);
        assert_eq!(conversion.chart.sync_track, sync.to_vec());
    }

    #[test]
    fn ticks_never_go_backwards() {
        let events: Vec<NoteEvent> = (0..64)
            .map(|i| ev(48 + (i * 7) % 30, i as f64 * 37.5, 30.0))
            .collect();
        let conversion = convert(&events, &ConvertConfig::default());

        let notes = &conversion.chart.tracks[0].notes;
        assert_eq!(notes.len(), events.len());
        assert!(notes.windows(2).all(|pair| pair[0].tick <= pair[1].tick));
        assert!(notes.iter().all(|n| n.lane <= 4));
    }

    #[test]
    fn every_difficulty_gets_the_same_notes() {
        let config = ConvertConfig {
            difficulties: vec![Difficulty::Expert, Difficulty::Hard, Difficulty::Expert],
            resolution: 480,
            ..Default::default()
        };
        let conversion = convert(&[ev(60, 0.0, 100.0), ev(62, 100.0, 100.0)], &config);

        let names: Vec<&str> = conversion.chart.tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ExpertSingle", "HardSingle"]);
        assert_eq!(conversion.chart.tracks[0].notes, conversion.chart.tracks[1].notes);
        assert_eq!(conversion.chart.metadata.resolution, 480);
    }

    #[test]
    fn unordered_events_fail_before_mapping() {
        let events = [ev(60, 300.0, 100.0), ev(62, 0.0, 100.0)];
        let config = ConvertConfig::default();
        let result = convert_events(&events, &[], ChartMetadata::default(), &config);
        assert!(matches!(result, Err(ChartError::UnorderedInput { index: 1, .. })));
    }

    #[test]
    fn bad_default_tempo_is_invalid() {
        let config = ConvertConfig {
            default_bpm: 0.0,
            ..Default::default()
        };
        let result = convert_events(&[ev(60, 0.0, 100.0)], &[], ChartMetadata::default(), &config);
        assert!(matches!(result, Err(ChartError::InvalidTempo { tick: 0, .. })));
    }

    #[test]
    fn empty_input_gives_empty_tracks() {
        let conversion = convert(&[], &ConvertConfig::default());
        assert_eq!(conversion.chart.tracks.len(), 1);
        assert!(conversion.chart.tracks[0].notes.is_empty());
        assert_eq!(conversion.chart.sync_track.len(), 1);
    }

    #[test]
    fn chart_opens_with_four_four_and_intro() {
        let conversion = convert(&[ev(60, 0.0, 100.0)], &ConvertConfig::default());

        assert_eq!(
            conversion.chart.time_signatures,
            vec![TimeSignature {
                tick: 0,
                numerator: 4,
                denominator_power: Some(2)
            }]
        );
        assert_eq!(
            conversion.chart.events,
            vec![ChartEvent {
                tick: 0,
                text: String::from("section intro")
            }]
        );

        let text = crate::chart::serialize_chart(&conversion.chart).unwrap();
        assert!(text.contains("  0 = TS 4 2\n  0 = B 120000\n"));
        assert!(text.contains("  0 = E \"section intro\"\n"));
    }

    #[test]
    fn opening_markers_follow_config() {
        let config = ConvertConfig {
            default_time_signature: false,
            intro_section: false,
            ..Default::default()
        };
        let conversion = convert(&[ev(60, 0.0, 100.0)], &config);

        assert!(conversion.chart.time_signatures.is_empty());
        assert!(conversion.chart.events.is_empty());
    }
}
