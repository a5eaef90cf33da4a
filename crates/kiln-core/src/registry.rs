use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// A typed name for a registry slot.
///
/// Keys are usually declared once as constants next to the service they
/// address, e.g. `pub const MEDIA: Key<MediaCatalog> = Key::new("media");`,
/// so every reader and writer agrees on the value type. Names should be
/// namespaced by convention; nothing stops two plugins from sharing one.
pub struct Key<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key<{}>({:?})", type_name::<T>(), self.name)
    }
}

struct Slot {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

/// Keyed store for cross-plugin singletons.
///
/// The last write to a name wins. Reads never fail: a name that was never
/// set, or that holds a value of a different type than the key asks for,
/// reads as `None`. There is no removal; entries live as long as the
/// registry.
#[derive(Default)]
pub struct Registry {
    slots: RefCell<HashMap<&'static str, Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Returns `true` if an earlier value was overwritten.
    pub fn set<T: 'static>(&self, key: &Key<T>, value: T) -> bool {
        let slot = Slot {
            value: Rc::new(value),
            type_name: type_name::<T>(),
        };
        let previous = self.slots.borrow_mut().insert(key.name, slot);
        match &previous {
            Some(old) => tracing::debug!(
                key = key.name,
                old_type = old.type_name,
                "registry entry overwritten"
            ),
            None => tracing::debug!(key = key.name, "registry entry set"),
        }
        previous.is_some()
    }

    /// Return a clone of the value under `key`, or `None` if absent.
    pub fn get<T: Clone + 'static>(&self, key: &Key<T>) -> Option<T> {
        self.with(key, T::clone)
    }

    /// Run `f` against the value under `key` without cloning it.
    ///
    /// The registry is not borrowed while `f` runs, so `f` may read or write
    /// other entries.
    pub fn with<T: 'static, R>(&self, key: &Key<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = {
            let slots = self.slots.borrow();
            let slot = slots.get(key.name)?;
            if !slot.value.is::<T>() {
                tracing::warn!(
                    key = key.name,
                    stored = slot.type_name,
                    requested = type_name::<T>(),
                    "registry type mismatch; treating entry as absent"
                );
                return None;
            }
            slot.value.clone()
        };
        value.downcast_ref::<T>().map(f)
    }

    /// Return `true` if any value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    /// Names of all stored entries, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.borrow().keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}
