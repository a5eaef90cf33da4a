use std::fmt;

/// A run-at-most-once teardown callback.
///
/// Returned by [`EventBus::on`](crate::bus::EventBus::on),
/// [`FrameClock::on_tick`](crate::clock::FrameClock::on_tick) and plugin
/// `init` to undo a registration. Calling [`dispose`](Disposer::dispose) more
/// than once is a no-op. Dropping a disposer without calling it leaves the
/// registration in place.
pub struct Disposer {
    action: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    /// Wrap a teardown closure.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A disposer with nothing to undo.
    pub fn noop() -> Self {
        Self { action: None }
    }

    /// Combine several disposers into one that runs them in the given order.
    pub fn all(disposers: impl IntoIterator<Item = Disposer>) -> Self {
        let mut disposers: Vec<Disposer> = disposers.into_iter().collect();
        Self::new(move || {
            for d in &mut disposers {
                d.dispose();
            }
        })
    }

    /// Run the teardown if it has not run yet.
    pub fn dispose(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    /// Return `true` once the teardown has run (or if there never was one).
    pub fn is_disposed(&self) -> bool {
        self.action.is_none()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
