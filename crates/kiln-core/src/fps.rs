use std::collections::VecDeque;

/// Measures frames-per-second over a sliding window of frame timestamps.
///
/// Feed it [`FrameTime::absolute_seconds`](crate::clock::FrameTime) from a
/// tick callback; timestamps older than the window are dropped as new ones
/// arrive.
#[derive(Debug, Clone)]
pub struct TickCounter {
    timestamps: VecDeque<f64>,
    window_seconds: f64,
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TickCounter {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window_seconds,
        }
    }

    /// Record a frame at `now_seconds`.
    pub fn tick(&mut self, now_seconds: f64) {
        self.timestamps.push_back(now_seconds);
        let cutoff = now_seconds - self.window_seconds;
        while self.timestamps.front().is_some_and(|&t| t < cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Frames per second across the window; `0.0` until two frames are seen.
    pub fn rate(&self) -> f64 {
        if self.timestamps.len() < 2 {
            return 0.0;
        }
        self.timestamps.len() as f64 / self.window_seconds
    }

    pub fn samples(&self) -> usize {
        self.timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counter_returns_zero() {
        assert_eq!(TickCounter::default().rate(), 0.0);
    }

    #[test]
    fn single_tick_returns_zero() {
        let mut counter = TickCounter::default();
        counter.tick(3.0);
        assert_eq!(counter.rate(), 0.0);
    }

    #[test]
    fn steady_sixty_hz() {
        let mut counter = TickCounter::new(1.0);
        for i in 0..120 {
            counter.tick(i as f64 / 60.0);
        }
        let rate = counter.rate();
        assert!(rate > 59.0 && rate < 62.0, "rate was {rate}");
    }

    #[test]
    fn old_samples_are_pruned() {
        let mut counter = TickCounter::new(1.0);
        for i in 0..5 {
            counter.tick(i as f64 * 0.2);
        }
        counter.tick(10.0);
        assert_eq!(counter.samples(), 1);
    }
}
