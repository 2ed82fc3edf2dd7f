use crate::model::song::{NoteEvent, Phrase};

/// Splits time-ordered events into phrases.
///
/// A new phrase starts at the first event and whenever the silence between the end of
/// the previous event and the start of the current one is at least `silence_threshold_ms`.
/// Phrases are contiguous slices that partition `events` in order.
pub fn segment_phrases(events: &[NoteEvent], silence_threshold_ms: f64) -> Vec<Phrase<'_>> {
    let mut phrases: Vec<Phrase<'_>> = Vec::new();
    if events.is_empty() {
        return phrases;
    }

    let mut phrase_start = 0;
    for i in 1..events.len() {
        let gap = events[i].start_ms - events[i - 1].end_ms();
        if gap >= silence_threshold_ms {
            phrases.push(Phrase {
                start: phrase_start,
                events: &events[phrase_start..i],
            });
            phrase_start = i;
        }
    }

    phrases.push(Phrase {
        start: phrase_start,
        events: &events[phrase_start..],
    });

    phrases
}
