use std::time::{Duration, Instant};

/// Frames-per-second over a rolling one-second window.
#[derive(Debug, Clone)]
pub struct RateMonitor {
    window: Duration,
    window_start: Instant,
    count: u32,
    fps: f32,
}

impl RateMonitor {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Monitor whose first window opens at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            window: Duration::from_secs(1),
            window_start: now,
            count: 0,
            fps: 0.0,
        }
    }

    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Count one frame at `now`. Once more than a second has elapsed the rate
    /// is recomputed and the window restarts; otherwise the last rate stands.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed > self.window {
            self.fps = self.count as f32 / elapsed.as_secs_f32();
            self.count = 0;
            self.window_start = now;
        } else {
            self.count += 1;
        }
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for RateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_until_first_window_closes() {
        let t0 = Instant::now();
        let mut rate = RateMonitor::starting_at(t0);
        for i in 0..30 {
            let fps = rate.tick_at(t0 + Duration::from_millis(i * 33));
            assert_eq!(fps, 0.0);
        }
        assert_eq!(rate.tick_at(t0 + Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn first_tick_after_window_reports_rate() {
        let t0 = Instant::now();
        let mut rate = RateMonitor::starting_at(t0);
        let n = 25u64;
        for i in 1..=n {
            rate.tick_at(t0 + Duration::from_millis(i * 1000 / (n + 1)));
        }

        let closing = Duration::from_millis(1250);
        let fps = rate.tick_at(t0 + closing);
        let expected = n as f32 / closing.as_secs_f32();
        assert!((fps - expected).abs() < 1e-3, "{} vs {}", fps, expected);

        // rate holds until the next window closes
        assert_eq!(rate.tick_at(t0 + Duration::from_millis(1300)), fps);
    }

    #[test]
    fn windows_restart() {
        let t0 = Instant::now();
        let mut rate = RateMonitor::starting_at(t0);
        for i in 0..10 {
            rate.tick_at(t0 + Duration::from_millis(i * 100));
        }
        let first = rate.tick_at(t0 + Duration::from_millis(1001));
        assert!((first - 10.0 / 1.001).abs() < 1e-3);

        let t1 = t0 + Duration::from_millis(1001);
        for i in 1..=5 {
            rate.tick_at(t1 + Duration::from_millis(i * 150));
        }
        let second = rate.tick_at(t1 + Duration::from_secs(2));
        assert!((second - 2.5).abs() < 1e-3);
    }
}
