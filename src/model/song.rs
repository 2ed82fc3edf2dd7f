use serde::{Deserialize, Serialize};

/// A single pitched note handed over by the event-extraction stage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Semitone number (MIDI numbering, 60 = C4).
    pub pitch: i32,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl NoteEvent {
    pub fn new(pitch: i32, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            pitch,
            start_ms,
            duration_ms,
        }
    }

    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }
}

/// A contiguous run of events with no internal silence gap.
///
/// `start` is the index of the first event in the full sequence, so that
/// phrase-local results can be written back in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phrase<'a> {
    pub start: usize,
    pub events: &'a [NoteEvent],
}

impl Phrase<'_> {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// `(min, max)` pitch of the phrase.
    pub fn pitch_range(&self) -> Option<(i32, i32)> {
        let min = self.events.iter().map(|e| e.pitch).min()?;
        let max = self.events.iter().map(|e| e.pitch).max()?;
        Some((min, max))
    }
}
