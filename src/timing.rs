use crate::error::{ChartError, ChartResult};
use crate::model::chart::{SyncPoint, validate_sync_track};
use log::debug;

const MS_PER_MINUTE_MILLI: f64 = 60_000.0 * 1000.0;

#[derive(Debug, Clone)]
struct TempoSegment {
    pub start_tick: u64,
    pub milli_bpm: u64,
    pub ms_at_start: f64,
}

/// Piecewise tick/millisecond conversion over a tempo map.
#[derive(Debug, Clone)]
pub struct TickClock {
    resolution: u32,
    segments: Vec<TempoSegment>,
}

impl TickClock {
    pub fn new(sync_track: &[SyncPoint], resolution: u32) -> ChartResult<Self> {
        if resolution == 0 {
            return Err(ChartError::FormatInvariantViolation(
                "resolution must be a positive number of ticks per beat".into(),
            ));
        }

        if let Some(bad) = sync_track.iter().find(|p| p.milli_bpm() == 0) {
            return Err(ChartError::InvalidTempo {
                tick: bad.tick,
                bpm: bad.bpm(),
            });
        }
        validate_sync_track(sync_track)?;

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(sync_track.len());
        let mut ms_accum = 0.0;

        for point in sync_track {
            if let Some(prev) = segments.last() {
                let delta_ticks = (point.tick - prev.start_tick) as f64;
                ms_accum += delta_ticks * ms_per_tick(prev.milli_bpm, resolution);
            }

            // ms_at_start reflects the ms accumulated up to this tick
            segments.push(TempoSegment {
                start_tick: point.tick,
                milli_bpm: point.milli_bpm(),
                ms_at_start: ms_accum,
            });
        }

        debug!(
            "Built tick clock with {} tempo segment(s) at resolution {}..!",
            segments.len(),
            resolution
        );

        Ok(Self {
            resolution,
            segments,
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn tick_to_ms(&self, tick: u64) -> f64 {
        let segment = self
            .segments
            .iter()
            .rfind(|seg| seg.start_tick <= tick)
            .unwrap_or(&self.segments[0]);

        let delta_ticks = (tick - segment.start_tick) as f64;
        segment.ms_at_start + delta_ticks * ms_per_tick(segment.milli_bpm, self.resolution)
    }

    /// Nearest tick for `ms`, ties to even. Negative times clamp to tick 0.
    pub fn ms_to_tick(&self, ms: f64) -> u64 {
        let ticks = self.ms_to_fractional_tick(ms).round_ties_even();
        if ticks <= 0.0 { 0 } else { ticks as u64 }
    }

    fn ms_to_fractional_tick(&self, ms: f64) -> f64 {
        if !(ms > 0.0) {
            return 0.0;
        }

        let segment = self
            .segments
            .iter()
            .rfind(|seg| seg.ms_at_start <= ms)
            .unwrap_or(&self.segments[0]);

        let delta_ms = ms - segment.ms_at_start;
        segment.start_tick as f64 + delta_ms / ms_per_tick(segment.milli_bpm, self.resolution)
    }

    /// Number of ticks spanned by `beats` at this resolution, rounded to nearest.
    pub fn beats_to_ticks(&self, beats: f64) -> u64 {
        let ticks = (beats * self.resolution as f64).round_ties_even();
        if ticks <= 0.0 { 0 } else { ticks as u64 }
    }
}

fn ms_per_tick(milli_bpm: u64, resolution: u32) -> f64 {
    MS_PER_MINUTE_MILLI / (milli_bpm as f64 * resolution as f64)
}

#[cfg(test)]
mod test {
    use super::*;

    fn clock(points: &[(u64, f64)], resolution: u32) -> TickClock {
        let sync: Vec<SyncPoint> = points
            .iter()
            .map(|&(tick, bpm)| SyncPoint::from_bpm(tick, bpm).unwrap())
            .collect();
        TickClock::new(&sync, resolution).unwrap()
    }

    #[test]
    fn constant_tempo_conversion() {
        let clock = clock(&[(0, 120.0)], 192);

        assert_eq!(clock.ms_to_tick(0.0), 0);
        assert_eq!(clock.ms_to_tick(500.0), 192);
        assert_eq!(clock.ms_to_tick(1000.0), 384);
        assert!((clock.tick_to_ms(192) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_is_piecewise() {
        // 120 BPM for two beats (1000ms) then 60 BPM.
        let clock = clock(&[(0, 120.0), (384, 60.0)], 192);

        assert!((clock.tick_to_ms(384) - 1000.0).abs() < 1e-9);
        assert!((clock.tick_to_ms(576) - 2000.0).abs() < 1e-9);
        assert_eq!(clock.ms_to_tick(2000.0), 576);
        assert_eq!(clock.ms_to_tick(1500.0), 480);
    }

    #[test]
    fn ticks_round_trip_through_ms() {
        let clock = clock(&[(0, 133.337), (1000, 87.5), (2500, 210.0)], 480);

        for tick in 0..4000u64 {
            assert_eq!(clock.ms_to_tick(clock.tick_to_ms(tick)), tick);
        }
    }

    #[test]
    fn ties_round_to_even() {
        // One tick lasts 500ms here.
        let clock = clock(&[(0, 60.0)], 2);

        assert_eq!(clock.ms_to_tick(250.0), 0);
        assert_eq!(clock.ms_to_tick(750.0), 2);
        assert_eq!(clock.ms_to_tick(1250.0), 2);
    }

    #[test]
    fn negative_time_clamps_to_zero() {
        let clock = clock(&[(0, 120.0)], 192);
        assert_eq!(clock.ms_to_tick(-40.0), 0);
    }

    #[test]
    fn rejects_bad_tempo_maps() {
        let late = SyncPoint::from_bpm(96, 120.0).unwrap();
        assert!(matches!(
            TickClock::new(&[late], 192),
            Err(ChartError::FormatInvariantViolation(_))
        ));

        let ok = SyncPoint::from_bpm(0, 120.0).unwrap();
        assert!(TickClock::new(&[ok], 0).is_err());
        assert!(TickClock::new(&[], 192).is_err());
    }
}
