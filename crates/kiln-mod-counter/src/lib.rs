use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;

use kiln_core::{Context, Disposer, Key, Plugin, Topic};

/// Shared counter state, published under [`STATE`].
#[derive(Debug, Default)]
pub struct CounterState {
    count: Cell<u64>,
}

impl CounterState {
    pub fn count(&self) -> u64 {
        self.count.get()
    }

    fn increment(&self) -> u64 {
        let next = self.count.get() + 1;
        self.count.set(next);
        next
    }

    fn reset(&self) {
        self.count.set(0);
    }
}

pub const STATE: Key<Rc<CounterState>> = Key::new("state");

/// Increments the counter by one.
pub const INC: Topic<()> = Topic::new("inc");

/// Sets the counter back to zero.
pub const RESET: Topic<()> = Topic::new("counter.reset");

/// Emitted after every increment or reset with the new count.
pub const CHANGED: Topic<u64> = Topic::new("counter.changed");

/// A minimal reference plugin.
///
/// Publishes a [`CounterState`] in the registry, bumps it whenever [`INC`]
/// is emitted and clears it on [`RESET`]. Its disposer revokes both
/// subscriptions; the state itself stays readable afterwards.
#[derive(Debug, Default)]
pub struct CounterPlugin;

impl CounterPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Plugin<S> for CounterPlugin {
    fn name(&self) -> &str {
        "counter"
    }

    fn host_api(&self) -> Option<&str> {
        Some("^0.1")
    }

    fn init(&mut self, ctx: &Context<S>) -> Result<Option<Disposer>> {
        let state = Rc::new(CounterState::default());
        ctx.registry().set(&STATE, state.clone());

        // Weak, so handlers stored in the bus do not keep the bus alive.
        let announce = {
            let events = Rc::downgrade(ctx.events());
            move |count: u64| {
                if let Some(events) = events.upgrade() {
                    events.emit(&CHANGED, &count);
                }
            }
        };

        let inc = {
            let (state, announce) = (state.clone(), announce.clone());
            ctx.events().on(&INC, move |_| {
                let count = state.increment();
                tracing::trace!(count, "counter incremented");
                announce(count);
            })
        };
        let reset = ctx.events().on(&RESET, move |_| {
            state.reset();
            tracing::debug!("counter reset");
            announce(0);
        });

        Ok(Some(Disposer::all([inc, reset])))
    }
}
