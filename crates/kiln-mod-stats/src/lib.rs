//! Frame-rate and process statistics plugin.
//!
//! Registers a tick callback that feeds a sliding-window
//! [`TickCounter`](kiln_core::fps::TickCounter) and an interval-gated
//! [`ProcessSampler`]. The latest [`StatsSnapshot`] is kept under the
//! registry key [`STATS`], and each process refresh is announced on
//! [`SAMPLE`].

pub mod sampler;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use serde::Serialize;

use kiln_core::fps::TickCounter;
use kiln_core::{Context, Disposer, FrameTime, Key, Plugin, Topic};

pub use sampler::{ProcessMetrics, ProcessSampler};

/// Point-in-time runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub fps: f64,
    pub uptime_seconds: f64,
    pub mem_used: u64,
    pub mem_total: u64,
    pub process_rss: Option<u64>,
    pub process_cpu: Option<f32>,
}

pub const STATS: Key<Rc<RefCell<StatsSnapshot>>> = Key::new("stats");

pub const SAMPLE: Topic<StatsSnapshot> = Topic::new("stats.sample");

struct FrameTracker {
    counter: TickCounter,
    sampler: ProcessSampler,
    started_at: Option<f64>,
}

impl FrameTracker {
    /// Fold one frame into `snap`. Returns `true` if process metrics were
    /// refreshed.
    fn observe(&mut self, frame: FrameTime, snap: &mut StatsSnapshot) -> bool {
        let now = frame.absolute_seconds;
        let start = *self.started_at.get_or_insert(now);
        self.counter.tick(now);

        snap.frames = frame.frame_index + 1;
        snap.fps = self.counter.rate();
        snap.uptime_seconds = now - start;

        if !self.sampler.maybe_refresh(now) {
            return false;
        }
        let m = self.sampler.metrics();
        snap.mem_used = m.mem_used;
        snap.mem_total = m.mem_total;
        snap.process_rss = m.rss;
        snap.process_cpu = m.cpu;
        true
    }
}

pub struct StatsPlugin {
    sample_interval_seconds: f64,
}

impl Default for StatsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsPlugin {
    /// Sample process metrics once per second.
    pub fn new() -> Self {
        Self::with_interval(1.0)
    }

    pub fn with_interval(sample_interval_seconds: f64) -> Self {
        Self {
            sample_interval_seconds,
        }
    }
}

impl<S> Plugin<S> for StatsPlugin {
    fn name(&self) -> &str {
        "stats"
    }

    fn host_api(&self) -> Option<&str> {
        Some("^0.1")
    }

    fn init(&mut self, ctx: &Context<S>) -> Result<Option<Disposer>> {
        let snapshot = Rc::new(RefCell::new(StatsSnapshot::default()));
        ctx.registry().set(&STATS, snapshot.clone());

        let tracker = RefCell::new(FrameTracker {
            counter: TickCounter::default(),
            sampler: ProcessSampler::new(self.sample_interval_seconds),
            started_at: None,
        });
        let events = Rc::downgrade(ctx.events());

        let tick = ctx.clock().on_tick(move |frame| {
            let (refreshed, current) = {
                let mut snap = snapshot.borrow_mut();
                let refreshed = tracker.borrow_mut().observe(frame, &mut snap);
                (refreshed, snap.clone())
            };

            if refreshed {
                tracing::debug!(fps = current.fps, rss = ?current.process_rss, "stats sampled");
                if let Some(events) = events.upgrade() {
                    events.emit(&SAMPLE, &current);
                }
            }
        });

        Ok(Some(tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kiln_core::{ManualScheduler, Shell};

    fn running_shell(interval: f64) -> (Rc<ManualScheduler>, Shell<()>) {
        let sched = Rc::new(ManualScheduler::new());
        let mut shell = Shell::new((), sched.clone());
        shell.use_plugin(StatsPlugin::with_interval(interval)).unwrap();
        (sched, shell)
    }

    #[test]
    fn frames_and_uptime_follow_the_clock() {
        let (sched, shell) = running_shell(60.0);
        for i in 1..=10 {
            sched.fire(1000.0 + i as f64 * 100.0);
        }

        let stats = shell.context().registry().get(&STATS).unwrap();
        let snap = stats.borrow();
        assert_eq!(snap.frames, 10);
        assert!((snap.uptime_seconds - 0.9).abs() < 1e-9);
        assert!(snap.fps > 0.0);
    }

    #[test]
    fn sample_emitted_per_interval() {
        let (sched, shell) = running_shell(1.0);
        let samples = Rc::new(RefCell::new(Vec::new()));
        let s = samples.clone();
        let _sub = shell
            .context()
            .events()
            .on(&SAMPLE, move |snap| s.borrow_mut().push(snap.frames));

        // 0.0s refreshes, 0.5s does not, 1.0s does.
        sched.fire(0.0);
        sched.fire(500.0);
        sched.fire(1000.0);

        assert_eq!(samples.borrow().as_slice(), &[1, 3]);
        let stats = shell.context().registry().get(&STATS).unwrap();
        assert!(stats.borrow().mem_total > 0);
    }

    #[test]
    fn dispose_detaches_tick_callback() {
        let (sched, mut shell) = running_shell(1.0);
        sched.fire(0.0);
        shell.dispose();
        assert_eq!(shell.context().clock().callback_count(), 0);

        let stats = shell.context().registry().get(&STATS).unwrap();
        assert_eq!(stats.borrow().frames, 1);
    }

    #[test]
    fn tracker_counts_from_first_frame() {
        let mut tracker = FrameTracker {
            counter: TickCounter::default(),
            sampler: ProcessSampler::new(100.0),
            started_at: None,
        };
        let mut snap = StatsSnapshot::default();
        let frame = |i: u64, t: f64| FrameTime {
            delta_seconds: 0.0,
            absolute_seconds: t,
            frame_index: i,
        };

        assert!(tracker.observe(frame(0, 2.0), &mut snap));
        assert!(!tracker.observe(frame(1, 2.5), &mut snap));
        assert_eq!(snap.frames, 2);
        assert_eq!(snap.uptime_seconds, 0.5);
    }
}
