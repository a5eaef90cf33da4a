//! Host refresh scheduling.
//!
//! The frame clock never talks to a display directly. It asks a
//! [`RefreshScheduler`] for "call me on the next refresh" and receives the
//! host's monotonic timestamp when that happens. Browser hosts back this
//! with `requestAnimationFrame`; native hosts and tests use
//! [`ManualScheduler`] and feed timestamps themselves.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;

/// One-shot callback receiving the host timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Handle for a pending frame request, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// The host's display-refresh notification mechanism.
pub trait RefreshScheduler {
    /// Current host monotonic time in milliseconds.
    fn now_ms(&self) -> f64;

    /// Run `callback` once on the next refresh.
    fn request_frame(&self, callback: FrameCallback) -> FrameRequest;

    /// Cancel a pending request. Unknown or already-fired requests are ignored.
    fn cancel_frame(&self, request: FrameRequest);
}

/// A scheduler whose refreshes happen only when [`fire`](Self::fire) is called.
///
/// Requests made while a frame is firing are queued for the following
/// `fire`, matching how a real refresh loop reschedules itself.
#[derive(Default)]
pub struct ManualScheduler {
    now_ms: Cell<f64>,
    next_id: Cell<u64>,
    pending: RefCell<Vec<(FrameRequest, FrameCallback)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler whose clock reads `now_ms` until the first fire.
    pub fn starting_at(now_ms: f64) -> Self {
        let scheduler = Self::default();
        scheduler.now_ms.set(now_ms);
        scheduler
    }

    /// Deliver a refresh at `timestamp_ms` to every pending request.
    ///
    /// Returns the number of callbacks run.
    pub fn fire(&self, timestamp_ms: f64) -> usize {
        self.now_ms.set(timestamp_ms);
        let due = mem::take(&mut *self.pending.borrow_mut());
        let count = due.len();
        for (_, callback) in due {
            callback(timestamp_ms);
        }
        count
    }

    /// Number of requests waiting for the next refresh.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl RefreshScheduler for ManualScheduler {
    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }

    fn request_frame(&self, callback: FrameCallback) -> FrameRequest {
        let request = FrameRequest(self.next_id.get());
        self.next_id.set(request.0 + 1);
        self.pending.borrow_mut().push((request, callback));
        request
    }

    fn cancel_frame(&self, request: FrameRequest) {
        self.pending.borrow_mut().retain(|(r, _)| *r != request);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now_ms", &self.now_ms.get())
            .field("pending", &self.pending())
            .finish()
    }
}
