use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::disposer::Disposer;

/// A shared event handler for payload type `P`.
pub type Handler<P> = Rc<dyn Fn(&P)>;

/// A named event channel carrying payloads of type `P`.
///
/// Declare topics as constants shared by publishers and subscribers:
/// `pub const INC: Topic<()> = Topic::new("inc");`. Two topics with the same
/// name but different payload types are independent channels.
pub struct Topic<P> {
    name: &'static str,
    _payload: PhantomData<fn(&P)>,
}

impl<P> Topic<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Topic<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Topic<P> {}

impl<P> fmt::Debug for Topic<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic<{}>({:?})", type_name::<P>(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChannelId {
    name: &'static str,
    payload: TypeId,
}

impl ChannelId {
    fn of<P: 'static>(topic: &Topic<P>) -> Self {
        Self {
            name: topic.name,
            payload: TypeId::of::<P>(),
        }
    }
}

struct Channel<P> {
    subscribers: Vec<(u64, Handler<P>)>,
}

#[derive(Default)]
struct BusState {
    channels: HashMap<ChannelId, Box<dyn Any>>,
    next_id: u64,
}

impl BusState {
    fn channel<P: 'static>(&self, id: &ChannelId) -> Option<&Channel<P>> {
        self.channels.get(id)?.downcast_ref()
    }

    fn channel_mut<P: 'static>(&mut self, id: ChannelId) -> Option<&mut Channel<P>> {
        self.channels
            .entry(id)
            .or_insert_with(|| {
                Box::new(Channel::<P> {
                    subscribers: Vec::new(),
                })
            })
            .downcast_mut()
    }

    fn is_subscribed<P: 'static>(&self, id: &ChannelId, sub: u64) -> bool {
        self.channel::<P>(id)
            .is_some_and(|c| c.subscribers.iter().any(|(s, _)| *s == sub))
    }

    fn remove<P: 'static>(&mut self, id: &ChannelId, sub: u64) -> bool {
        let Some(channel) = self
            .channels
            .get_mut(id)
            .and_then(|c| c.downcast_mut::<Channel<P>>())
        else {
            return false;
        };
        let before = channel.subscribers.len();
        channel.subscribers.retain(|(s, _)| *s != sub);
        let removed = channel.subscribers.len() != before;
        if channel.subscribers.is_empty() {
            self.channels.remove(id);
        }
        removed
    }
}

/// Synchronous publish/subscribe channel keyed by topic.
///
/// Handlers run on the caller's stack during [`emit`](EventBus::emit). The
/// bus is not borrowed while handlers run, so a handler may subscribe,
/// unsubscribe or emit again; subscriptions added during an emit are not
/// delivered to until the next one, and a handler removed during an emit is
/// not called after its removal.
///
/// A panicking handler is not caught: the panic unwinds out of `emit` and
/// the handlers after it miss that event.
#[derive(Default)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a closure to `topic`.
    pub fn on<P: 'static>(&self, topic: &Topic<P>, handler: impl Fn(&P) + 'static) -> Disposer {
        self.on_handler(topic, Rc::new(handler))
    }

    /// Subscribe a shared handler to `topic`.
    ///
    /// A handler already subscribed to this topic (same `Rc`) is not added a
    /// second time; the returned disposer then revokes the existing
    /// subscription.
    pub fn on_handler<P: 'static>(&self, topic: &Topic<P>, handler: Handler<P>) -> Disposer {
        let id = ChannelId::of(topic);
        let sub = {
            let mut state = self.state.borrow_mut();
            let next = state.next_id;
            let Some(channel) = state.channel_mut::<P>(id) else {
                tracing::error!(topic = topic.name, "event channel payload mismatch");
                return Disposer::noop();
            };
            let existing = channel
                .subscribers
                .iter()
                .find(|(_, h)| Rc::ptr_eq(h, &handler))
                .map(|(s, _)| *s);
            match existing {
                Some(sub) => sub,
                None => {
                    channel.subscribers.push((next, handler));
                    state.next_id += 1;
                    tracing::debug!(topic = topic.name, subscription = next, "subscribed");
                    next
                }
            }
        };

        let weak: Weak<RefCell<BusState>> = Rc::downgrade(&self.state);
        let name = topic.name;
        Disposer::new(move || {
            if let Some(state) = weak.upgrade() {
                if state.borrow_mut().remove::<P>(&id, sub) {
                    tracing::debug!(topic = name, subscription = sub, "unsubscribed");
                }
            }
        })
    }

    /// Deliver `payload` to every handler currently subscribed to `topic`.
    ///
    /// Emitting on a topic without subscribers does nothing.
    pub fn emit<P: 'static>(&self, topic: &Topic<P>, payload: &P) {
        let id = ChannelId::of(topic);
        let snapshot: Vec<(u64, Handler<P>)> = match self.state.borrow().channel::<P>(&id) {
            Some(channel) => channel.subscribers.clone(),
            None => return,
        };

        tracing::trace!(topic = topic.name, handlers = snapshot.len(), "emit");
        for (sub, handler) in snapshot {
            if self.state.borrow().is_subscribed::<P>(&id, sub) {
                handler(payload);
            }
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count<P: 'static>(&self, topic: &Topic<P>) -> usize {
        self.state
            .borrow()
            .channel::<P>(&ChannelId::of(topic))
            .map_or(0, |c| c.subscribers.len())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut topics: Vec<_> = state.channels.keys().map(|id| id.name).collect();
        topics.sort_unstable();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}
