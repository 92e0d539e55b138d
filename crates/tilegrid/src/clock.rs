use std::time::Duration;

use tracing::warn;

/// Fixed-timestep accumulator: converts variable frame times into a whole
/// number of simulation ticks.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(ticks_per_second: u32, max_frame_delta: Duration, max_ticks_per_frame: u32) -> Self {
        let ticks_per_second = ticks_per_second.max(1);
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / f64::from(ticks_per_second)),
            max_frame_delta: if max_frame_delta.is_zero() {
                Duration::from_millis(250)
            } else {
                max_frame_delta
            },
            max_ticks_per_frame: max_ticks_per_frame.max(1),
            accumulator: Duration::ZERO,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt.as_secs_f32()
    }

    /// Adds one frame's elapsed time and returns how many ticks to run now.
    /// Frame deltas are clamped; backlog beyond the per-frame tick cap is
    /// dropped rather than carried.
    pub fn advance(&mut self, frame_delta: Duration) -> u32 {
        let clamped = frame_delta.min(self.max_frame_delta);
        self.accumulator = self.accumulator.saturating_add(clamped);

        let mut ticks = 0u32;
        while self.accumulator >= self.fixed_dt && ticks < self.max_ticks_per_frame {
            self.accumulator = self.accumulator.saturating_sub(self.fixed_dt);
            ticks = ticks.saturating_add(1);
        }
        if self.accumulator >= self.fixed_dt {
            warn!(
                dropped_ms = self.accumulator.as_millis() as u64,
                max_ticks_per_frame = self.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
            self.accumulator = Duration::ZERO;
        }
        ticks
    }
}

impl Default for FixedStepClock {
    fn default() -> Self {
        Self::new(60, Duration::from_millis(250), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_carries_into_the_next_frame() {
        let mut clock = FixedStepClock::new(10, Duration::from_secs(1), 5);
        assert_eq!(clock.advance(Duration::from_millis(150)), 1);
        assert_eq!(clock.advance(Duration::from_millis(60)), 1);
        assert_eq!(clock.advance(Duration::from_millis(5)), 0);
    }

    #[test]
    fn long_frames_are_capped_and_backlog_dropped() {
        let mut clock = FixedStepClock::new(60, Duration::from_secs(10), 3);
        assert_eq!(clock.advance(Duration::from_secs(1)), 3);
        assert_eq!(clock.advance(Duration::ZERO), 0);
    }

    #[test]
    fn frame_delta_is_clamped_before_accumulating() {
        let mut clock = FixedStepClock::new(10, Duration::from_millis(250), 100);
        assert_eq!(clock.advance(Duration::from_secs(5)), 2);
    }
}
