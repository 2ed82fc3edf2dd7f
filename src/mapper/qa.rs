use crate::model::chart::QaKind;
use crate::model::config::QaConfig;
use log::debug;
use std::collections::{BTreeSet, HashMap};

/// A suspicious lane assignment at note `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QaFinding {
    pub index: usize,
    pub kind: QaKind,
}

/// Compares pitch order against lane order. Read-only; never changes lanes.
///
/// - `DifferentFretSamePitch`: a pitch shows up on a lane it has not used before.
/// - `TooLow` / `TooHigh`: relative to the previous note, pitch and lane move in
///   opposite directions by more than the configured slack.
pub fn detect_qa_issues(pitches: &[i32], lanes: &[u8], config: &QaConfig) -> Vec<QaFinding> {
    let mut findings: Vec<QaFinding> = Vec::new();
    let mut pitch_lanes: HashMap<i32, BTreeSet<u8>> = HashMap::new();

    for (index, (&pitch, &lane)) in pitches.iter().zip(lanes).enumerate() {
        let seen = pitch_lanes.entry(pitch).or_default();
        if !seen.is_empty() && !seen.contains(&lane) {
            findings.push(QaFinding {
                index,
                kind: QaKind::DifferentFretSamePitch,
            });
        }
        seen.insert(lane);

        if index == 0 {
            continue;
        }

        let pitch_delta = pitch as i64 - pitches[index - 1] as i64;
        let lane_delta = lane as i16 - lanes[index - 1] as i16;
        let pitch_slack = config.pitch_slack as i64;
        let lane_slack = config.lane_slack as i16;

        if pitch_delta > pitch_slack && lane_delta < -lane_slack {
            findings.push(QaFinding {
                index,
                kind: QaKind::TooLow,
            });
        }

        if pitch_delta < -pitch_slack && lane_delta > lane_slack {
            findings.push(QaFinding {
                index,
                kind: QaKind::TooHigh,
            });
        }
    }

    debug!("QA scan flagged {} finding(s)..!", findings.len());
    findings
}
