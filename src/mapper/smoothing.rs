use crate::model::chart::MAX_LANE;

/// Bounds the lane delta between consecutive notes to `max_jump`.
///
/// Each pass reads the previous pass's buffer and writes a fresh one. A note that jumps
/// too far is pulled to `previous ± max_jump`, keeping the sign of the original delta,
/// where `previous` is the already-smoothed lane of the note before it.
pub fn smooth_lanes(lanes: &[u8], max_jump: u8, passes: u32) -> Vec<u8> {
    let mut current: Vec<u8> = lanes.to_vec();

    for _ in 0..passes {
        let next = smoothing_pass(&current, max_jump);
        if next == current {
            break;
        }
        current = next;
    }

    current
}

fn smoothing_pass(input: &[u8], max_jump: u8) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(input.len());

    for (i, &lane) in input.iter().enumerate() {
        let lane = lane.min(MAX_LANE);
        if i == 0 {
            out.push(lane);
            continue;
        }

        let prev = out[i - 1] as i16;
        let delta = lane as i16 - prev;
        let jump = max_jump as i16;

        let smoothed = if delta > jump {
            prev + jump
        } else if delta < -jump {
            prev - jump
        } else {
            lane as i16
        };

        out.push(smoothed.clamp(0, MAX_LANE as i16) as u8);
    }

    out
}

/// Largest lane delta between neighbours.
pub fn max_jump_of(lanes: &[u8]) -> u8 {
    lanes
        .windows(2)
        .map(|pair| pair[0].abs_diff(pair[1]))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamps_large_jump() {
        assert_eq!(smooth_lanes(&[0, 4], 2, 1), vec![0, 2]);
        assert_eq!(smooth_lanes(&[4, 0], 2, 1), vec![4, 2]);
    }

    #[test]
    fn preserves_small_jumps() {
        assert_eq!(smooth_lanes(&[0, 2, 4], 2, 1), vec![0, 2, 4]);
    }

    #[test]
    fn trivial_inputs() {
        assert_eq!(smooth_lanes(&[], 2, 1), Vec::<u8>::new());
        assert_eq!(smooth_lanes(&[3], 2, 1), vec![3]);
    }

    #[test]
    fn clamp_reads_smoothed_previous_lane() {
        // The third note is compared against the clamped 1, not the original 4.
        assert_eq!(smooth_lanes(&[0, 4, 4], 1, 1), vec![0, 1, 2]);
        assert_eq!(smooth_lanes(&[0, 4, 0], 1, 1), vec![0, 1, 0]);
    }

    #[test]
    fn single_pass_bounds_every_jump() {
        let lanes = [0, 4, 0, 4, 1, 4, 0, 0, 3, 4, 0];
        for max_jump in 1..=4 {
            let smoothed = smooth_lanes(&lanes, max_jump, 1);
            assert!(max_jump_of(&smoothed) <= max_jump);
            assert!(smoothed.iter().all(|&lane| lane <= MAX_LANE));
        }
    }

    #[test]
    fn smoothing_is_idempotent() {
        let lanes = [4, 0, 3, 0, 4, 4, 1, 0, 2, 4];
        let once = smooth_lanes(&lanes, 2, 1);
        assert_eq!(smooth_lanes(&once, 2, 1), once);
        assert_eq!(smooth_lanes(&lanes, 2, 5), once);
    }

    #[test]
    fn zero_passes_is_identity() {
        assert_eq!(smooth_lanes(&[0, 4], 1, 0), vec![0, 4]);
    }
}
