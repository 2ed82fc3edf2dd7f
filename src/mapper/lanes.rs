use crate::model::chart::{CENTER_LANE, MAX_LANE};
use crate::model::song::Phrase;

/// Scales one pitch into `0..=MAX_LANE` relative to the phrase range.
///
/// A flat range maps to the center lane. Exact half-way values round away from
/// `previous` (the lane of the preceding note in the phrase), or up when there is none.
pub fn scale_pitch_to_lane(pitch: i32, min_pitch: i32, max_pitch: i32, previous: Option<u8>) -> u8 {
    if max_pitch <= min_pitch {
        return CENTER_LANE;
    }

    let span = (max_pitch - min_pitch) as i64;
    let offset = (pitch.clamp(min_pitch, max_pitch) - min_pitch) as i64;

    // lane = offset / span * MAX_LANE, kept in integers so ties are exact
    let scaled = offset * MAX_LANE as i64;
    let floor = scaled / span;
    let twice_rem = 2 * (scaled % span);

    let lane = if twice_rem < span {
        floor
    } else if twice_rem > span {
        floor + 1
    } else {
        match previous {
            Some(prev) if prev as i64 > floor => floor,
            _ => floor + 1,
        }
    };

    lane.clamp(0, MAX_LANE as i64) as u8
}

/// Lane assignment for a single phrase. Pure, so phrases can be mapped independently.
pub fn map_phrase(phrase: &Phrase<'_>) -> Vec<u8> {
    let Some((min_pitch, max_pitch)) = phrase.pitch_range() else {
        return Vec::new();
    };

    let mut lanes: Vec<u8> = Vec::with_capacity(phrase.len());
    for event in phrase.events {
        let previous = lanes.last().copied();
        lanes.push(scale_pitch_to_lane(event.pitch, min_pitch, max_pitch, previous));
    }

    lanes
}

/// Maps every phrase and concatenates the results in phrase order.
pub fn map_phrases(phrases: &[Phrase<'_>]) -> Vec<u8> {
    phrases.iter().flat_map(map_phrase).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::song::NoteEvent;

    fn phrase(events: &[NoteEvent]) -> Phrase<'_> {
        Phrase { start: 0, events }
    }

    #[test]
    fn range_endpoints_and_middle() {
        assert_eq!(scale_pitch_to_lane(60, 60, 72, None), 0);
        assert_eq!(scale_pitch_to_lane(72, 60, 72, None), 4);
        assert_eq!(scale_pitch_to_lane(66, 60, 72, None), 2);
        assert_eq!(scale_pitch_to_lane(65, 60, 70, None), 2);
    }

    #[test]
    fn flat_range_maps_to_center() {
        assert_eq!(scale_pitch_to_lane(60, 60, 60, None), CENTER_LANE);
        assert_eq!(scale_pitch_to_lane(60, 60, 60, Some(4)), CENTER_LANE);
    }

    #[test]
    fn ties_round_away_from_previous_lane() {
        // 61 in 60..=68 scales to exactly 0.5.
        assert_eq!(scale_pitch_to_lane(61, 60, 68, None), 1);
        assert_eq!(scale_pitch_to_lane(61, 60, 68, Some(0)), 1);
        assert_eq!(scale_pitch_to_lane(61, 60, 68, Some(3)), 0);
    }

    #[test]
    fn ascending_triad() {
        let events = [
            NoteEvent::new(60, 0.0, 200.0),
            NoteEvent::new(64, 300.0, 200.0),
            NoteEvent::new(67, 600.0, 200.0),
        ];
        assert_eq!(map_phrase(&phrase(&events)), vec![0, 2, 4]);
    }

    #[test]
    fn single_note_phrase_is_centered() {
        let events = [NoteEvent::new(69, 0.0, 500.0)];
        assert_eq!(map_phrase(&phrase(&events)), vec![CENTER_LANE]);
    }

    #[test]
    fn extreme_pitches_stay_in_range() {
        let events = [
            NoteEvent::new(-20, 0.0, 10.0),
            NoteEvent::new(200, 10.0, 10.0),
            NoteEvent::new(60, 20.0, 10.0),
        ];
        let lanes = map_phrase(&phrase(&events));
        assert!(lanes.iter().all(|&lane| lane <= MAX_LANE));
        assert_eq!(lanes[0], 0);
        assert_eq!(lanes[1], 4);
    }

    #[test]
    fn phrases_are_scaled_independently() {
        let low = [NoteEvent::new(40, 0.0, 100.0), NoteEvent::new(44, 100.0, 100.0)];
        let high = [NoteEvent::new(80, 2000.0, 100.0), NoteEvent::new(84, 2100.0, 100.0)];
        let phrases = [
            Phrase { start: 0, events: &low },
            Phrase { start: 2, events: &high },
        ];

        assert_eq!(map_phrases(&phrases), vec![0, 4, 0, 4]);
    }
}
