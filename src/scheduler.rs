//! Fixed-timestep accumulator.

use std::time::Duration;

use tracing::debug;

/// Simulated seconds per tick.
pub const TIMESTEP: f32 = 1.0 / 60.0;

/// Converts wall-clock time into a whole number of ticks.
///
/// Elapsed time is scaled by the speed factor and accumulated; each call
/// returns at most `max_catch_up` ticks and drops any backlog beyond that.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    accumulator: f32,
    speed: f32,
    paused: bool,
    max_catch_up: u32,
    /// Ticks thrown away by the catch-up cap
    dropped: u64,
}

impl TickScheduler {
    pub fn new(max_catch_up: u32) -> Self {
        Self {
            accumulator: 0.0,
            speed: 1.0,
            paused: false,
            max_catch_up: max_catch_up.max(1),
            dropped: 0,
        }
    }

    pub fn set_max_catch_up(&mut self, steps: u32) {
        self.max_catch_up = steps.max(1);
    }

    /// Negative and non-finite speeds are treated as zero.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes without replaying the time spent paused.
    pub fn resume(&mut self) {
        self.paused = false;
        self.accumulator = 0.0;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped
    }

    /// Number of ticks to run for `elapsed` wall-clock time.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        if self.paused {
            return 0;
        }
        self.accumulator += elapsed.as_secs_f32() * self.speed;

        let due = (self.accumulator / TIMESTEP).floor();
        if due >= self.max_catch_up as f32 {
            let surplus = due as u64 - self.max_catch_up as u64;
            if surplus > 0 {
                debug!(surplus, "scheduler backlog discarded");
                self.dropped += surplus;
            }
            self.accumulator = 0.0;
            self.max_catch_up
        } else {
            self.accumulator -= due * TIMESTEP;
            due as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut scheduler = TickScheduler::new(10);
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(50)), 3);
    }

    #[test]
    fn catch_up_is_capped() {
        let mut scheduler = TickScheduler::new(10);
        assert_eq!(scheduler.advance(Duration::from_secs(5)), 10);
        assert!((289..=290).contains(&scheduler.dropped_ticks()));
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 0);
    }

    #[test]
    fn speed_and_pause() {
        let mut scheduler = TickScheduler::new(10);
        scheduler.set_speed(2.0);
        assert_eq!(scheduler.advance(Duration::from_millis(60)), 7);
        scheduler.pause();
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        scheduler.resume();
        scheduler.set_speed(f32::NAN);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
    }
}
