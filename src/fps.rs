//! Sliding-window frame-rate measurement.

const FRAMES: usize = 64;
const FRAME_MASK: usize = FRAMES - 1;

/// Averages frame times over the last 64 frames.
///
/// Feed it a timestamp once per frame; `ms_per_frame` and `frames_per_sec`
/// report the average over the window, which smooths out scheduler jitter
/// without lagging noticeably behind real changes.
pub struct FpsCounter {
    frames: [f64; FRAMES],
    index: usize,
}

impl FpsCounter {
    pub fn new(initial_time_ms: f64) -> Self {
        Self {
            frames: [initial_time_ms; FRAMES],
            index: 0,
        }
    }

    /// Records the timestamp of a newly started frame, in milliseconds.
    pub fn new_frame(&mut self, current_time_ms: f64) {
        self.index = self.next_frame();
        self.frames[self.index] = current_time_ms;
    }

    pub fn ms_per_frame(&self) -> f64 {
        // 64 timestamps bound 63 intervals.
        let total = self.frames[self.index] - self.frames[self.next_frame()];
        total / (FRAMES - 1) as f64
    }

    pub fn frames_per_sec(&self) -> f64 {
        let total = self.frames[self.index] - self.frames[self.next_frame()];
        (FRAMES - 1) as f64 * 1000.0 / total
    }

    fn next_frame(&self) -> usize {
        (self.index + 1) & FRAME_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_cadence_reports_exact_frame_time() {
        let mut fps = FpsCounter::new(0.0);
        for i in 1..=200 {
            fps.new_frame(i as f64 * 16.0);
        }
        assert!((fps.ms_per_frame() - 16.0).abs() < 1e-9);
        assert!((fps.frames_per_sec() - 1000.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn window_forgets_old_frames() {
        let mut fps = FpsCounter::new(0.0);
        let mut t = 0.0;
        for _ in 0..100 {
            t += 100.0;
            fps.new_frame(t);
        }
        // Switch to a faster cadence; once the window refills, the old
        // 100ms frames must no longer contribute.
        for _ in 0..FRAMES {
            t += 10.0;
            fps.new_frame(t);
        }
        assert!((fps.ms_per_frame() - 10.0).abs() < 1e-9);
    }
}
