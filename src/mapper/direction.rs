use crate::model::chart::MAX_LANE;

/// Nudges lanes that move against the melody.
///
/// When the pitch and the lane of a note both move relative to the previous note but in
/// opposite directions, the lane is moved one step in the pitch's direction. The nudge is
/// skipped when it would leave `0..=MAX_LANE` or break `max_jump` against either neighbour.
/// The next neighbour is the next note's input lane, so a nudge is refused whenever the
/// following note would then sit more than `max_jump` lanes away.
pub fn preserve_direction(lanes: &[u8], pitches: &[i32], max_jump: u8) -> Vec<u8> {
    let len = lanes.len().min(pitches.len());
    let mut out: Vec<u8> = Vec::with_capacity(lanes.len());
    out.extend(lanes.first().copied());

    for i in 1..len {
        let prev = out[i - 1] as i16;
        let lane = lanes[i] as i16;

        let pitch_sign = (pitches[i] - pitches[i - 1]).signum() as i16;
        let lane_sign = (lane - prev).signum();

        if pitch_sign == 0 || lane_sign == 0 || pitch_sign == lane_sign {
            out.push(lanes[i]);
            continue;
        }

        let nudged = lane + pitch_sign;
        let jump = max_jump as i16;
        let next_ok = lanes
            .get(i + 1)
            .is_none_or(|&next| (next as i16 - nudged).abs() <= jump);

        if (0..=MAX_LANE as i16).contains(&nudged) && (nudged - prev).abs() <= jump && next_ok {
            out.push(nudged as u8);
        } else {
            out.push(lanes[i]);
        }
    }

    // Lanes without a matching pitch are passed through untouched.
    out.extend_from_slice(&lanes[out.len()..]);
    out
}
