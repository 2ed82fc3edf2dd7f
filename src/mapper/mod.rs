use crate::error::{ChartError, ChartResult};
use crate::model::config::MappingConfig;
use crate::model::song::NoteEvent;
use log::debug;

pub mod direction;
pub mod lanes;
pub mod phrase;
pub mod qa;
pub mod smoothing;

pub use direction::preserve_direction;
pub use lanes::{map_phrase, map_phrases, scale_pitch_to_lane};
pub use phrase::segment_phrases;
pub use qa::{QaFinding, detect_qa_issues};
pub use smoothing::smooth_lanes;

/// Rejects events whose start times go backwards.
pub fn check_ordered(events: &[NoteEvent]) -> ChartResult<()> {
    for (i, pair) in events.windows(2).enumerate() {
        // `!(a >= b)` also catches NaN start times
        if !(pair[1].start_ms >= pair[0].start_ms) {
            return Err(ChartError::UnorderedInput {
                index: i + 1,
                previous_ms: pair[0].start_ms,
                start_ms: pair[1].start_ms,
            });
        }
    }

    Ok(())
}

/// Runs segmentation, per-phrase scaling, smoothing and direction correction.
///
/// Never fails on time-ordered input; every pitch ends up on some lane.
pub fn map_lanes(events: &[NoteEvent], config: &MappingConfig) -> ChartResult<Vec<u8>> {
    check_ordered(events)?;

    let phrases = segment_phrases(events, config.silence_threshold_ms);
    debug!(
        "Segmented {} event(s) into {} phrase(s)..!",
        events.len(),
        phrases.len()
    );

    let scaled = map_phrases(&phrases);
    let smoothed = smooth_lanes(&scaled, config.max_lane_jump, config.smoothing_passes);
    let clamped = scaled.iter().zip(&smoothed).filter(|(a, b)| a != b).count();

    let pitches: Vec<i32> = events.iter().map(|e| e.pitch).collect();
    let directed = preserve_direction(&smoothed, &pitches, config.max_lane_jump);
    let nudged = smoothed.iter().zip(&directed).filter(|(a, b)| a != b).count();

    debug!(
        "Lane mapping done: {} jump(s) clamped, {} lane(s) nudged toward the melody..!",
        clamped, nudged
    );

    Ok(directed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mapper::smoothing::max_jump_of;

    fn ev(pitch: i32, start_ms: f64, duration_ms: f64) -> NoteEvent {
        NoteEvent::new(pitch, start_ms, duration_ms)
    }

    #[test]
    fn ascending_triad_spreads_across_lanes() {
        env_logger::try_init().unwrap_or(());

        let events = [ev(60, 0.0, 200.0), ev(64, 300.0, 200.0), ev(67, 600.0, 200.0)];
        let lanes = map_lanes(&events, &MappingConfig::default()).unwrap();
        assert_eq!(lanes, vec![0, 2, 4]);
    }

    #[test]
    fn single_note_lands_in_center() {
        let lanes = map_lanes(&[ev(69, 0.0, 500.0)], &MappingConfig::default()).unwrap();
        assert_eq!(lanes, vec![2]);
    }

    #[test]
    fn empty_input_maps_to_nothing() {
        assert!(map_lanes(&[], &MappingConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn unordered_input_is_rejected() {
        let events = [ev(60, 100.0, 50.0), ev(62, 50.0, 50.0)];
        assert_eq!(
            map_lanes(&events, &MappingConfig::default()),
            Err(ChartError::UnorderedInput {
                index: 1,
                previous_ms: 100.0,
                start_ms: 50.0
            })
        );
    }

    #[test]
    fn equal_start_times_are_ordered() {
        let events = [ev(60, 0.0, 50.0), ev(64, 0.0, 50.0)];
        assert!(map_lanes(&events, &MappingConfig::default()).is_ok());
    }

    #[test]
    fn tight_jump_limit_holds_across_phrases() {
        let config = MappingConfig {
            silence_threshold_ms: 300.0,
            max_lane_jump: 1,
            smoothing_passes: 1,
        };
        let events: Vec<NoteEvent> = [48, 84, 50, 80, 60, 61, 90, 30, 72, 72]
            .iter()
            .enumerate()
            .map(|(i, &pitch)| ev(pitch, i as f64 * 400.0, if i % 3 == 0 { 50.0 } else { 380.0 }))
            .collect();

        let lanes = map_lanes(&events, &config).unwrap();
        assert_eq!(lanes.len(), events.len());
        assert!(max_jump_of(&lanes) <= 1);
        assert!(lanes.iter().all(|&lane| lane <= 4));
    }

    #[test]
    fn ascending_scale_mostly_rises() {
        let events: Vec<NoteEvent> = (60..73)
            .enumerate()
            .map(|(i, pitch)| ev(pitch, i as f64 * 250.0, 240.0))
            .collect();

        let lanes = map_lanes(&events, &MappingConfig::default()).unwrap();
        assert!(lanes.windows(2).all(|pair| pair[1] >= pair[0]));
        assert_eq!(lanes.first(), Some(&0));
        assert_eq!(lanes.last(), Some(&4));
    }
}
