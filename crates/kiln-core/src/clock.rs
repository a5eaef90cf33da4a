use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use kiln_config::ClockConfig;

use crate::disposer::Disposer;
use crate::scheduler::{FrameRequest, RefreshScheduler};

/// Frame timing delivered to tick callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame, clamped to `[0, max_delta]`.
    pub delta_seconds: f64,
    /// Host monotonic timestamp of this frame, in seconds.
    pub absolute_seconds: f64,
    /// Number of frames delivered before this one.
    pub frame_index: u64,
}

/// A shared per-frame callback.
pub type TickCallback = Rc<dyn Fn(FrameTime)>;

struct ClockInner {
    scheduler: Rc<dyn RefreshScheduler>,
    max_delta: f64,
    isolate_faults: bool,
    last_ms: Cell<f64>,
    frame_index: Cell<u64>,
    running: Cell<bool>,
    pending: Cell<Option<FrameRequest>>,
    callbacks: RefCell<Vec<(u64, TickCallback)>>,
    next_id: Cell<u64>,
}

impl ClockInner {
    fn is_registered(&self, id: u64) -> bool {
        self.callbacks.borrow().iter().any(|(c, _)| *c == id)
    }

    fn invoke(&self, callback: &TickCallback, frame: FrameTime) {
        if !self.isolate_faults {
            callback(frame);
            return;
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(frame))) {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(
                frame = frame.frame_index,
                %reason,
                "tick callback panicked; continuing with remaining callbacks"
            );
        }
    }
}

/// Repeating per-refresh scheduler.
///
/// Once [`start`](FrameClock::start)ed, the clock asks its
/// [`RefreshScheduler`] for the next refresh, and on each one:
///
/// 1. computes `delta = clamp((now - last) / 1000, 0, max_delta)`,
/// 2. records `now` as `last`,
/// 3. calls every registered tick callback with the [`FrameTime`],
/// 4. requests the next refresh if it is still running.
///
/// The clamp (50 ms by default) keeps a stalled or backgrounded host from
/// handing one enormous step to physics or animation code on resume.
///
/// With fault isolation disabled, a panicking callback stops the clock
/// before the panic reaches the host; call `start` again to resume.
pub struct FrameClock {
    inner: Rc<ClockInner>,
}

impl FrameClock {
    /// Create a stopped clock with default settings.
    pub fn new(scheduler: Rc<dyn RefreshScheduler>) -> Self {
        Self::with_config(scheduler, &ClockConfig::default())
    }

    pub fn with_config(scheduler: Rc<dyn RefreshScheduler>, config: &ClockConfig) -> Self {
        let last_ms = scheduler.now_ms();
        Self {
            inner: Rc::new(ClockInner {
                scheduler,
                max_delta: config.max_delta_seconds,
                isolate_faults: config.isolate_faults,
                last_ms: Cell::new(last_ms),
                frame_index: Cell::new(0),
                running: Cell::new(false),
                pending: Cell::new(None),
                callbacks: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Begin the refresh loop. Calling this while running does nothing.
    pub fn start(&self) {
        if self.inner.running.replace(true) {
            tracing::debug!("frame clock already running");
            return;
        }
        tracing::debug!("frame clock started");
        schedule(&self.inner);
    }

    /// Cancel the pending refresh. Tick callbacks stay registered.
    pub fn stop(&self) {
        if !self.inner.running.replace(false) {
            return;
        }
        if let Some(request) = self.inner.pending.take() {
            self.inner.scheduler.cancel_frame(request);
        }
        tracing::debug!(frames = self.inner.frame_index.get(), "frame clock stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Register a closure to run every frame.
    pub fn on_tick(&self, callback: impl Fn(FrameTime) + 'static) -> Disposer {
        self.on_tick_handler(Rc::new(callback))
    }

    /// Register a shared callback to run every frame.
    ///
    /// Registering the same `Rc` twice keeps a single registration.
    pub fn on_tick_handler(&self, callback: TickCallback) -> Disposer {
        let id = {
            let mut callbacks = self.inner.callbacks.borrow_mut();
            let existing = callbacks
                .iter()
                .find(|(_, c)| Rc::ptr_eq(c, &callback))
                .map(|(id, _)| *id);
            match existing {
                Some(id) => id,
                None => {
                    let id = self.inner.next_id.get();
                    self.inner.next_id.set(id + 1);
                    callbacks.push((id, callback));
                    id
                }
            }
        };

        let weak: Weak<ClockInner> = Rc::downgrade(&self.inner);
        Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.callbacks.borrow_mut().retain(|(c, _)| *c != id);
            }
        })
    }

    /// Number of frames delivered so far.
    pub fn frame_index(&self) -> u64 {
        self.inner.frame_index.get()
    }

    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }
}

impl fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameClock")
            .field("running", &self.is_running())
            .field("frame_index", &self.frame_index())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

fn schedule(inner: &Rc<ClockInner>) {
    let weak = Rc::downgrade(inner);
    let request = inner.scheduler.request_frame(Box::new(move |timestamp_ms| {
        if let Some(inner) = weak.upgrade() {
            on_frame(&inner, timestamp_ms);
        }
    }));
    inner.pending.set(Some(request));
}

/// Stops the clock if a tick callback unwinds out of the frame.
struct UnwindGuard<'a> {
    inner: &'a ClockInner,
    frame_index: u64,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        self.inner.running.set(false);
        if let Some(request) = self.inner.pending.take() {
            self.inner.scheduler.cancel_frame(request);
        }
        tracing::error!(
            frame = self.frame_index,
            "tick callback panicked; frame clock stopped"
        );
    }
}

fn on_frame(inner: &Rc<ClockInner>, timestamp_ms: f64) {
    inner.pending.set(None);
    if !inner.running.get() {
        return;
    }

    let elapsed = (timestamp_ms - inner.last_ms.get()) / 1000.0;
    let frame = FrameTime {
        delta_seconds: elapsed.clamp(0.0, inner.max_delta),
        absolute_seconds: timestamp_ms / 1000.0,
        frame_index: inner.frame_index.get(),
    };
    inner.last_ms.set(timestamp_ms);
    inner.frame_index.set(frame.frame_index + 1);

    let guard = UnwindGuard {
        inner,
        frame_index: frame.frame_index,
    };
    let snapshot: Vec<(u64, TickCallback)> = inner.callbacks.borrow().clone();
    for (id, callback) in &snapshot {
        if inner.is_registered(*id) {
            inner.invoke(callback, frame);
        }
    }
    mem::forget(guard);

    // A callback may already have restarted the clock, which schedules.
    if inner.running.get() && inner.pending.get().is_none() {
        schedule(inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn clock_with(config: ClockConfig) -> (Rc<ManualScheduler>, FrameClock) {
        let scheduler = Rc::new(ManualScheduler::new());
        let clock = FrameClock::with_config(scheduler.clone(), &config);
        (scheduler, clock)
    }

    fn recording(clock: &FrameClock) -> (Rc<RefCell<Vec<FrameTime>>>, Disposer) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        let d = clock.on_tick(move |ft| sink.borrow_mut().push(ft));
        (frames, d)
    }

    #[test]
    fn long_gap_delta_is_clamped() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();

        sched.fire(0.0);
        sched.fire(1000.0);

        let frames = frames.borrow();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].delta_seconds, 0.05);
        assert_eq!(frames[1].absolute_seconds, 1.0);
    }

    #[test]
    fn normal_delta_passes_through() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();

        sched.fire(0.0);
        sched.fire(16.0);

        let dt = frames.borrow()[1].delta_seconds;
        assert!((dt - 0.016).abs() < 1e-9, "dt was {dt}");
    }

    #[test]
    fn first_frame_measures_from_construction() {
        let sched = Rc::new(ManualScheduler::starting_at(100.0));
        let clock = FrameClock::new(sched.clone());
        let (frames, _d) = recording(&clock);
        clock.start();

        sched.fire(110.0);
        let ft = frames.borrow()[0];
        assert!((ft.delta_seconds - 0.01).abs() < 1e-9);
        assert_eq!(ft.frame_index, 0);
    }

    #[test]
    fn timestamp_before_last_yields_zero_delta() {
        let sched = Rc::new(ManualScheduler::starting_at(50.0));
        let clock = FrameClock::new(sched.clone());
        let (frames, _d) = recording(&clock);
        clock.start();

        sched.fire(40.0);
        assert_eq!(frames.borrow()[0].delta_seconds, 0.0);
    }

    #[test]
    fn custom_max_delta_is_respected() {
        let (sched, clock) = clock_with(ClockConfig {
            max_delta_seconds: 0.1,
            isolate_faults: true,
        });
        let (frames, _d) = recording(&clock);
        clock.start();
        sched.fire(0.0);
        sched.fire(500.0);
        assert_eq!(frames.borrow()[1].delta_seconds, 0.1);
    }

    #[test]
    fn start_is_idempotent() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();
        clock.start();
        assert_eq!(sched.pending(), 1);

        sched.fire(16.0);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn stop_cancels_pending_and_keeps_callbacks() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();
        sched.fire(16.0);
        clock.stop();

        assert!(!clock.is_running());
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.fire(32.0), 0);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(clock.callback_count(), 1);
    }

    #[test]
    fn restart_after_stop_resumes_delivery() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();
        sched.fire(16.0);
        clock.stop();
        clock.start();
        sched.fire(32.0);
        assert_eq!(frames.borrow().len(), 2);
        assert_eq!(clock.frame_index(), 2);
    }

    #[test]
    fn stop_from_inside_tick_prevents_reschedule() {
        let sched = Rc::new(ManualScheduler::new());
        let clock = Rc::new(FrameClock::new(sched.clone()));
        let c = clock.clone();
        let _d = clock.on_tick(move |_| c.stop());
        clock.start();

        sched.fire(16.0);
        assert!(!clock.is_running());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn restart_inside_tick_keeps_one_loop() {
        let sched = Rc::new(ManualScheduler::new());
        let clock = Rc::new(FrameClock::new(sched.clone()));
        let hits = Rc::new(Cell::new(0));
        let (c, h) = (clock.clone(), hits.clone());
        let _d = clock.on_tick(move |_| {
            h.set(h.get() + 1);
            if h.get() == 1 {
                c.stop();
                c.start();
            }
        });
        clock.start();

        sched.fire(16.0);
        assert!(clock.is_running());
        assert_eq!(sched.pending(), 1);

        sched.fire(32.0);
        assert_eq!(hits.get(), 2);

        clock.stop();
        assert_eq!(sched.pending(), 0);
        assert_eq!(sched.fire(48.0), 0);
    }

    #[test]
    fn disposed_callback_stops_receiving() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, mut d) = recording(&clock);
        clock.start();
        sched.fire(16.0);
        d.dispose();
        d.dispose();
        sched.fire(32.0);
        assert_eq!(frames.borrow().len(), 1);
        assert_eq!(clock.callback_count(), 0);
    }

    #[test]
    fn same_callback_registered_once() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let cb: TickCallback = Rc::new(move |_| h.set(h.get() + 1));
        let _a = clock.on_tick_handler(cb.clone());
        let _b = clock.on_tick_handler(cb);
        clock.start();
        sched.fire(16.0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn isolated_fault_does_not_block_other_callbacks() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let _bad = clock.on_tick(|_| panic!("bad tick"));
        let (frames, _d) = recording(&clock);
        clock.start();

        sched.fire(16.0);
        sched.fire(32.0);
        assert_eq!(frames.borrow().len(), 2);
        assert!(clock.is_running());
    }

    #[test]
    fn unisolated_fault_propagates() {
        let (sched, clock) = clock_with(ClockConfig {
            isolate_faults: false,
            ..ClockConfig::default()
        });
        let mut bad = clock.on_tick(|_| panic!("bad tick"));
        clock.start();

        let result = panic::catch_unwind(AssertUnwindSafe(|| sched.fire(16.0)));
        assert!(result.is_err());
        assert!(!clock.is_running());
        assert_eq!(sched.pending(), 0);

        bad.dispose();
        clock.start();
        assert!(clock.is_running());
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn frame_index_counts_frames() {
        let (sched, clock) = clock_with(ClockConfig::default());
        let (frames, _d) = recording(&clock);
        clock.start();
        for i in 0..5 {
            sched.fire(i as f64 * 16.0);
        }
        let indices: Vec<u64> = frames.borrow().iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(clock.frame_index(), 5);
    }

    #[test]
    fn dropped_clock_ignores_late_refresh() {
        let (sched, clock) = clock_with(ClockConfig::default());
        clock.start();
        drop(clock);
        assert_eq!(sched.fire(16.0), 1);
        assert_eq!(sched.pending(), 0);
    }
}
