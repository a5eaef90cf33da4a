use std::fmt;
use std::rc::Rc;

use crate::bus::EventBus;
use crate::clock::FrameClock;
use crate::registry::Registry;

/// The services shared by every plugin.
///
/// Built once by [`Shell`](crate::shell::Shell) and handed to each plugin's
/// `init`. Cloning is cheap and every clone refers to the same surface and
/// services, so plugins keep a clone (or clones of the individual `Rc`s)
/// for as long as their callbacks need them.
pub struct Context<S> {
    surface: Rc<S>,
    registry: Rc<Registry>,
    events: Rc<EventBus>,
    clock: Rc<FrameClock>,
}

impl<S> Context<S> {
    pub(crate) fn new(surface: S, clock: FrameClock) -> Self {
        Self {
            surface: Rc::new(surface),
            registry: Rc::new(Registry::new()),
            events: Rc::new(EventBus::new()),
            clock: Rc::new(clock),
        }
    }

    /// The display surface handle supplied by the embedding application.
    pub fn surface(&self) -> &Rc<S> {
        &self.surface
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    pub fn clock(&self) -> &Rc<FrameClock> {
        &self.clock
    }
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            surface: self.surface.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
