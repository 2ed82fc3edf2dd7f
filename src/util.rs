use crate::PolyPolicy;
use crate::model::chart::{LANE_COUNT, QaKind, QaMarker};
use crate::model::song::NoteEvent;
use log::info;
use std::collections::BTreeMap;

const LANE_LABELS: [char; LANE_COUNT as usize] = ['G', 'R', 'Y', 'B', 'O'];

pub fn parse_policy(s: &str) -> PolyPolicy {
    match s.to_lowercase().as_str() {
        "h" | "highest" => PolyPolicy::Highest,
        "lw" | "lowest" => PolyPolicy::Lowest,
        "lu" | "loudest" => PolyPolicy::Loudest,
        other => {
            info!("Unknown policy '{}', defaulting to `highest`..!", other);
            PolyPolicy::Highest
        }
    }
}

/// Counts markers per kind. Every kind is present, possibly with 0.
pub fn summarize_qa(markers: &[QaMarker]) -> BTreeMap<QaKind, usize> {
    let mut counts: BTreeMap<QaKind, usize> = QaKind::ALL.iter().map(|&kind| (kind, 0)).collect();
    for marker in markers {
        *counts.entry(marker.kind).or_default() += 1;
    }
    counts
}

/// Renders the lane assignment as five rows of text, orange on top.
///
/// Columns are proportional to note start times over `width` characters.
pub fn preview_lanes_ascii(notes: &[NoteEvent], lanes: &[u8], width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let mut grid = vec![vec!['-'; width]; LANE_COUNT as usize];
    let span = notes.iter().map(|n| n.end_ms()).fold(0.0_f64, f64::max);

    for (note, &lane) in notes.iter().zip(lanes) {
        let Some(row) = grid.get_mut(lane as usize) else {
            continue;
        };

        let column = if span > 0.0 {
            (note.start_ms * (width - 1) as f64 / span).floor() as usize
        } else {
            0
        };
        row[column.min(width - 1)] = 'o';
    }

    let mut out = String::new();
    for (lane, row) in grid.iter().enumerate().rev() {
        out.push(LANE_LABELS[lane]);
        out.push_str(" |");
        out.extend(row.iter());
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn policy_aliases() {
        assert_eq!(parse_policy("LoWeSt"), PolyPolicy::Lowest);
        assert_eq!(parse_policy("lu"), PolyPolicy::Loudest);
        assert_eq!(parse_policy("densest"), PolyPolicy::Highest);
    }

    #[test]
    fn qa_summary_counts_every_kind() {
        let markers = [
            QaMarker {
                tick: 0,
                kind: QaKind::TooLow,
            },
            QaMarker {
                tick: 192,
                kind: QaKind::TooLow,
            },
        ];
        let summary = summarize_qa(&markers);

        assert_eq!(summary[&QaKind::TooLow], 2);
        assert_eq!(summary[&QaKind::TooHigh], 0);
        assert_eq!(summary[&QaKind::DifferentFretSamePitch], 0);
    }

    #[test]
    fn preview_draws_one_mark_per_note() {
        let notes = [
            NoteEvent::new(60, 0.0, 100.0),
            NoteEvent::new(64, 100.0, 100.0),
            NoteEvent::new(67, 200.0, 100.0),
        ];
        let preview = preview_lanes_ascii(&notes, &[0, 2, 4], 7);

        assert_eq!(
            preview,
            "O |----o--|\nB |-------|\nY |--o----|\nR |-------|\nG |o------|\n"
        );
    }

    #[test]
    fn preview_of_nothing() {
        assert_eq!(preview_lanes_ascii(&[], &[], 0), "");
        assert_eq!(preview_lanes_ascii(&[], &[], 2).lines().count(), 5);
    }
}
