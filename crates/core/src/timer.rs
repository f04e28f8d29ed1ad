//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures per-frame deltas and reports an averaged frame rate at a fixed interval.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    total_frames: u64,
    report_interval: Duration,
}

impl FrameTimer {
    /// Create a timer that reports once per `report_interval`.
    pub fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
            total_frames: 0,
            report_interval,
        }
    }

    /// Record a finished frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.window_frames += 1;
        self.total_frames += 1;
        delta
    }

    /// Frames per second over the current window, if the window has elapsed.
    ///
    /// Returning `Some` starts a new window.
    pub fn take_report(&mut self) -> Option<f64> {
        self.take_report_at(Instant::now())
    }

    fn take_report_at(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.report_interval || self.window_frames == 0 {
            return None;
        }

        let fps = f64::from(self.window_frames) / elapsed.as_secs_f64();
        self.window_start = now;
        self.window_frames = 0;
        Some(fps)
    }

    /// Total number of frames recorded.
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Time since the timer was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::default();
        let base = timer.last_tick;

        let delta = timer.tick_at(base + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));
        timer.tick_at(base + Duration::from_millis(32));

        assert_eq!(timer.total_frames(), 2);
    }

    #[test]
    fn test_report_only_after_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(1));
        let base = timer.window_start;

        for i in 1..=30 {
            timer.tick_at(base + Duration::from_millis(i * 10));
        }
        assert!(timer.take_report_at(base + Duration::from_millis(500)).is_none());

        let fps = timer
            .take_report_at(base + Duration::from_secs(2))
            .expect("interval elapsed");
        assert!((fps - 15.0).abs() < 1e-9);

        // The window restarts after a report
        assert!(timer.take_report_at(base + Duration::from_secs(2)).is_none());
    }
}
