//! Observable state containers.
//!
//! The engine holds its state behind the minimal [`StateStore`] contract:
//! read the current value, replace it through an updater, and subscribe to
//! changes. [`MemoryStore`] is the in-process implementation. Any reactive
//! runtime a host already uses can stand in for it.
//!
//! Subscriptions are RAII: dropping the [`Subscription`] unsubscribes.
//! [`subscribe_selected`] narrows a subscription to a projection of the
//! state and only fires when that projection changes.
//!
//! # Example
//!
//! ```rust
//! use formstate::app::store::{subscribe_selected, MemoryStore, StateStore};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let store = MemoryStore::new((0u32, 0u32));
//! let fired = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&fired);
//! let _sub = subscribe_selected(&store, |s: &(u32, u32)| s.0, move |_| counter.set(counter.get() + 1));
//!
//! store.update(|s| (s.0, 7));
//! assert_eq!(fired.get(), 0);
//! store.update(|s| (s.0 + 1, s.1));
//! assert_eq!(fired.get(), 1);
//! ```

use crate::domain::value::FormValue;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Replaces the state given the current one.
pub type Updater<T> = Box<dyn FnOnce(&T) -> T>;

/// Receives the state after every change.
pub type Listener<T> = Box<dyn Fn(&T)>;

/// Handle that keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.unsubscribe.is_some()).finish()
    }
}

/// Minimal observable store.
pub trait StateStore<T> {
    /// A snapshot of the current state.
    fn get(&self) -> T;

    /// Replaces the state and notifies subscribers.
    fn set(&self, updater: Updater<T>);

    /// Registers a listener, called after every `set`.
    fn subscribe(&self, listener: Listener<T>) -> Subscription;
}

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Rc<dyn Fn(&T)>)>,
}

struct Shared<T> {
    value: RefCell<T>,
    listeners: RefCell<Listeners<T>>,
}

/// In-memory [`StateStore`]. Clones share the same state.
///
/// Listeners run in registration order after the new value is stored, with
/// no borrow held, so they may read or update the store themselves. Each
/// listener receives the value current at the moment it is called.
pub struct MemoryStore<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + 'static> MemoryStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            shared: Rc::new(Shared {
                value: RefCell::new(initial),
                listeners: RefCell::new(Listeners {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Applies `f` to the current value and stores the result.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.shared.value.borrow());
        *self.shared.value.borrow_mut() = next;
        self.notify();
    }

    /// Reads through a borrow without cloning the state.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.value.borrow())
    }

    fn notify(&self) {
        let listeners: Vec<Rc<dyn Fn(&T)>> = self
            .shared
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            let current = self.shared.value.borrow().clone();
            listener(&current);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.borrow().entries.len()
    }
}

impl<T: Clone + 'static> StateStore<T> for MemoryStore<T> {
    fn get(&self) -> T {
        self.shared.value.borrow().clone()
    }

    fn set(&self, updater: Updater<T>) {
        self.update(updater);
    }

    fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut listeners = self.shared.listeners.borrow_mut();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners.entries.push((id, Rc::from(listener)));
            id
        };
        let weak: Weak<Shared<T>> = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.listeners.borrow_mut().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }
}

/// Subscribes to a projection of the state.
///
/// `callback` fires with the new projection whenever it differs (by
/// `PartialEq`) from the previous one. The projection of the state at
/// subscription time is the baseline; nothing fires immediately.
pub fn subscribe_selected<T, S>(
    store: &dyn StateStore<T>,
    selector: impl Fn(&T) -> S + 'static,
    callback: impl Fn(&S) + 'static,
) -> Subscription
where
    T: 'static,
    S: PartialEq + Clone + 'static,
{
    let last = RefCell::new(selector(&store.get()));
    store.subscribe(Box::new(move |state: &T| {
        let next = selector(state);
        {
            let mut last = last.borrow_mut();
            if *last == next {
                return;
            }
            *last = next.clone();
        }
        callback(&next);
    }))
}

/// A [`FormValue`] compared by reference identity instead of structure.
///
/// Two containers are equal only if they are the same allocation, which
/// under copy-on-write means "nothing was written".
#[derive(Debug, Clone)]
pub struct ByRef(pub FormValue);

impl PartialEq for ByRef {
    fn eq(&self, other: &Self) -> bool {
        FormValue::same_ref(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn listeners_run_in_registration_order() {
        let store = MemoryStore::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&log), Rc::clone(&log));
        let _first = store.subscribe(Box::new(move |v: &i32| a.borrow_mut().push(("first", *v))));
        let _second = store.subscribe(Box::new(move |v: &i32| b.borrow_mut().push(("second", *v))));
        store.update(|v| v + 1);
        assert_eq!(*log.borrow(), vec![("first", 1), ("second", 1)]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let store = MemoryStore::new(0);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let sub = store.subscribe(Box::new(move |_: &i32| counter.set(counter.get() + 1)));
        store.update(|v| v + 1);
        drop(sub);
        store.update(|v| v + 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn listener_may_update_store() {
        let store = MemoryStore::new(0);
        let inner = store.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _clamp = store.subscribe(Box::new(move |v: &i32| {
            if *v > 10 {
                inner.update(|_| 10);
            }
        }));
        let _watch = subscribe_selected(&store, |v: &i32| *v, move |v| sink.borrow_mut().push(*v));
        store.update(|_| 42);
        assert_eq!(store.get(), 10);
        assert_eq!(*seen.borrow(), vec![10]);
    }

    #[test]
    fn selected_only_fires_on_change() {
        let store = MemoryStore::new((1, 1));
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = subscribe_selected(&store, |s: &(i32, i32)| s.0, move |_| counter.set(counter.get() + 1));
        store.update(|s| (s.0, s.1 + 1));
        store.update(|s| (s.0 + 1, s.1));
        store.update(|s| *s);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn by_ref_compares_identity() {
        let a = FormValue::from(json!({ "x": 1 }));
        let same = a.clone();
        let equal_but_new = FormValue::from(json!({ "x": 1 }));
        assert_eq!(ByRef(a.clone()), ByRef(same));
        assert_ne!(ByRef(a), ByRef(equal_but_new));
    }
}
