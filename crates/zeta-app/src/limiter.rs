//! Frame pacing and FPS tracking.

use std::thread;
use std::time::{Duration, Instant};

/// Caps the loop rate by sleeping out the rest of each frame's budget.
///
/// Call [`FrameLimiter::begin`] at the top of a loop iteration and
/// [`FrameLimiter::end`] at the bottom.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    budget: Option<Duration>,
    frame_start: Instant,
    fps: f64,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    frames: u64,
}

impl FrameLimiter {
    /// Create a limiter; `None` or `Some(0)` means unlimited.
    pub fn new(target_fps: Option<u32>) -> Self {
        Self {
            budget: target_fps
                .filter(|&fps| fps > 0)
                .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps))),
            frame_start: Instant::now(),
            fps: 0.0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            frames: 0,
        }
    }

    /// Frame time budget, if limited.
    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Sleep until the frame budget is used up and return the frame rate.
    pub fn end(&mut self) -> f64 {
        let elapsed = self.frame_start.elapsed();
        if let Some(budget) = self.budget {
            if elapsed < budget {
                let _span = tracing::trace_span!("frame.pacing").entered();
                thread::sleep(budget - elapsed);
            }
        }
        self.record(elapsed)
    }

    /// Account for a frame that took `elapsed` of work.
    ///
    /// A frame under budget counts as running at the target rate.
    fn record(&mut self, elapsed: Duration) -> f64 {
        let fps = match self.budget {
            Some(budget) if elapsed < budget => 1.0 / budget.as_secs_f64(),
            _ if elapsed.is_zero() => return self.fps,
            _ => 1.0 / elapsed.as_secs_f64(),
        };

        self.fps = fps;
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.frames += 1;
        fps
    }

    /// Frame rate of the last frame.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// `(min, max, average)` over all recorded frames.
    pub fn stats(&self) -> Option<(f64, f64, f64)> {
        if self.frames == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.fps_sum / self.frames as f64;
        Some((self.min_fps, self.max_fps, avg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_has_no_budget() {
        assert_eq!(FrameLimiter::new(None).budget(), None);
        assert_eq!(FrameLimiter::new(Some(0)).budget(), None);
    }

    #[test]
    fn budget_from_target() {
        let limiter = FrameLimiter::new(Some(250));
        assert_eq!(limiter.budget(), Some(Duration::from_millis(4)));
    }

    #[test]
    fn frame_under_budget_reports_target_rate() {
        let mut limiter = FrameLimiter::new(Some(100));
        let fps = limiter.record(Duration::from_millis(2));
        assert!((fps - 100.0).abs() < 1e-6);
    }

    #[test]
    fn frame_over_budget_reports_measured_rate() {
        let mut limiter = FrameLimiter::new(Some(100));
        let fps = limiter.record(Duration::from_millis(20));
        assert!((fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn stats_track_min_max_avg() {
        let mut limiter = FrameLimiter::new(None);
        assert_eq!(limiter.stats(), None);

        limiter.record(Duration::from_millis(10));
        limiter.record(Duration::from_millis(20));

        let (min, max, avg) = limiter.stats().unwrap();
        assert!((min - 50.0).abs() < 1e-6);
        assert!((max - 100.0).abs() < 1e-6);
        assert!((avg - 75.0).abs() < 1e-6);
        assert_eq!(limiter.frames(), 2);
    }

    #[test]
    fn end_sleeps_out_the_budget() {
        let mut limiter = FrameLimiter::new(Some(100));
        let start = Instant::now();
        limiter.begin();
        limiter.end();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
