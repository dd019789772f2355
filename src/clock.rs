//! Pause-aware playback timing.

use std::time::Instant;

/// A stoppable, seekable clock driving the `iTime` timeline.
///
/// All points in time are milliseconds relative to the instant the clock was
/// created, which keeps the arithmetic well away from rounding trouble as
/// uptime grows. Elapsed time is `(running ? now : stop) - start`.
///
/// The clock is only ever touched from the render-frame call, so it carries
/// no synchronization.
pub struct PlaybackClock {
    epoch: Instant,
    /// Start and stop points, in milliseconds since `epoch`.
    start: f64,
    stop: f64,
    running: bool,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            start: 0.0,
            stop: 0.0,
            running: false,
        }
    }

    /// Creates the clock and immediately starts it.
    pub fn started() -> Self {
        let mut clock = Self::new();
        clock.start();
        clock
    }

    /// Restarts the timeline from zero and begins running.
    pub fn start(&mut self) {
        self.start = self.now_ms();
        self.stop = self.start;
        self.running = true;
    }

    /// Freezes elapsed time at its current value.
    pub fn stop(&mut self) {
        self.stop = self.now_ms();
        self.running = false;
    }

    /// Continues from the frozen elapsed time without a jump.
    pub fn resume(&mut self) {
        if !self.running {
            let elapsed = self.stop - self.start;
            self.start = self.now_ms() - elapsed;
            self.stop = self.start;
            self.running = true;
        }
    }

    /// Shifts the timeline by `ms` (positive = fast-forward).
    ///
    /// Elapsed time is clamped so it never goes negative and never runs past
    /// the clock's own "now". If the clock is running this is a live seek.
    pub fn adjust_time_ms(&mut self, ms: f64) {
        self.start -= ms;

        let cutoff = if self.running { self.now_ms() } else { self.stop };
        // Rewinding past zero.
        if self.start > cutoff {
            self.start = cutoff;
        }
        // Fast-forwarding past "now".
        if self.start < 0.0 {
            self.start = 0.0;
        }
        // Happens when the timer is running and we're rewinding.
        if self.stop < self.start {
            self.stop = self.start;
        }
    }

    pub fn adjust_time_secs(&mut self, secs: f64) {
        self.adjust_time_ms(secs * 1000.0);
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn elapsed_ms(&self) -> f64 {
        (if self.running {
            self.now_ms()
        } else {
            self.stop
        }) - self.start
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ms() / 1000.0
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn new_clock_is_stopped_at_zero() {
        let clock = PlaybackClock::new();
        assert!(!clock.running());
        assert_eq!(clock.elapsed_ms(), 0.0);
    }

    #[test]
    fn stop_freezes_elapsed_time() {
        let mut clock = PlaybackClock::started();
        sleep(Duration::from_millis(20));
        clock.stop();
        let frozen = clock.elapsed_ms();
        sleep(Duration::from_millis(20));
        assert_eq!(clock.elapsed_ms(), frozen);
    }

    #[test]
    fn resume_continues_without_a_jump() {
        let mut clock = PlaybackClock::started();
        sleep(Duration::from_millis(20));
        clock.stop();
        let frozen = clock.elapsed_ms();
        sleep(Duration::from_millis(50));
        clock.resume();
        let after = clock.elapsed_ms();
        assert!(after >= frozen);
        // The 50ms stopped gap must not appear in the timeline.
        assert!(after < frozen + 40.0, "after={after} frozen={frozen}");
    }

    #[test]
    fn rewind_clamps_elapsed_at_zero() {
        let mut clock = PlaybackClock::started();
        sleep(Duration::from_millis(10));
        assert!(clock.elapsed_ms() > 0.0);
        clock.adjust_time_ms(-5000.0);
        let elapsed = clock.elapsed_ms();
        assert!(
            (0.0..5.0).contains(&elapsed),
            "elapsed after rewind: {elapsed}"
        );
    }

    #[test]
    fn rewind_while_stopped_clamps_at_zero() {
        let mut clock = PlaybackClock::started();
        sleep(Duration::from_millis(10));
        clock.stop();
        clock.adjust_time_ms(-5000.0);
        assert_eq!(clock.elapsed_ms(), 0.0);
    }

    #[test]
    fn fast_forward_moves_elapsed_forward() {
        let mut clock = PlaybackClock::new();
        sleep(Duration::from_millis(30));
        clock.start();
        clock.adjust_time_ms(20.0);
        let elapsed = clock.elapsed_ms();
        assert!(elapsed >= 20.0, "elapsed after seek: {elapsed}");
    }

    #[test]
    fn fast_forward_never_outruns_the_reference_epoch() {
        let mut clock = PlaybackClock::new();
        sleep(Duration::from_millis(10));
        clock.start();
        clock.adjust_time_ms(1_000_000.0);
        // start is clamped at the epoch, so elapsed can't exceed clock uptime.
        assert!(clock.elapsed_ms() <= clock.now_ms());
    }
}
