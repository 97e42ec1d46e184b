//! Call-coalescing debounce.
//!
//! [`Debounced`] wraps a callback. With no delay every call is forwarded
//! synchronously. With a delay (zero included) each call schedules the
//! callback through the [`Runtime`] and cancels the previously scheduled,
//! not-yet-fired call, so only the most recent arguments are ever delivered.
//! Dropping the last handle cancels anything still pending.
//!
//! [`DebounceSlot`] keeps one debounced callable per consumer and hands back
//! the same instance for as long as the delay stays the same.
//!
//! # Example
//!
//! ```rust
//! use formstate::app::debounce::Debounced;
//! use formstate::app::runtime::ManualRuntime;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let runtime = Rc::new(ManualRuntime::new());
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let debounced = Debounced::new(runtime.clone(), Some(50), move |v: u32| sink.borrow_mut().push(v));
//!
//! debounced.call(1);
//! debounced.call(2);
//! runtime.advance(50);
//! assert_eq!(*seen.borrow(), vec![2]);
//! ```

use crate::app::runtime::{Runtime, TimerId};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Callback<A> = Rc<dyn Fn(A)>;

struct Inner<A> {
    runtime: Rc<dyn Runtime>,
    delay_ms: Option<u64>,
    callback: RefCell<Callback<A>>,
    pending: Cell<Option<TimerId>>,
}

impl<A> Inner<A> {
    fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.runtime.cancel(id);
        }
    }
}

impl<A> Drop for Inner<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A debounced callback. Clones share the same pending call.
pub struct Debounced<A> {
    inner: Rc<Inner<A>>,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: 'static> Debounced<A> {
    /// Wraps `callback`. `None` forwards calls synchronously.
    pub fn new(runtime: Rc<dyn Runtime>, delay_ms: Option<u64>, callback: impl Fn(A) + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                runtime,
                delay_ms,
                callback: RefCell::new(Rc::new(callback)),
                pending: Cell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn delay_ms(&self) -> Option<u64> {
        self.inner.delay_ms
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.get().is_some()
    }

    /// Replaces the callback. A pending call delivers to the new one.
    pub fn set_callback(&self, callback: impl Fn(A) + 'static) {
        *self.inner.callback.borrow_mut() = Rc::new(callback);
    }

    /// Invokes the callback now, or schedules it after the delay.
    pub fn call(&self, args: A) {
        let Some(delay_ms) = self.inner.delay_ms else {
            let callback = Rc::clone(&self.inner.callback.borrow());
            callback(args);
            return;
        };

        self.inner.cancel();
        let weak: Weak<Inner<A>> = Rc::downgrade(&self.inner);
        let id = self.inner.runtime.schedule(
            delay_ms,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else { return };
                inner.pending.set(None);
                let callback = Rc::clone(&inner.callback.borrow());
                callback(args);
            }),
        );
        self.inner.pending.set(Some(id));
    }

    /// Drops the pending call, if any.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

/// Holds one [`Debounced`] and reuses it while the delay is unchanged.
pub struct DebounceSlot<A> {
    current: Option<Rc<Debounced<A>>>,
}

impl<A> Default for DebounceSlot<A> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<A: 'static> DebounceSlot<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the debounced callable for `delay_ms`.
    ///
    /// The same instance comes back as long as `delay_ms` matches the previous
    /// request; its callback is refreshed to `callback`. A different delay
    /// cancels the old instance and creates a new one.
    pub fn get(
        &mut self,
        runtime: &Rc<dyn Runtime>,
        delay_ms: Option<u64>,
        callback: impl Fn(A) + 'static,
    ) -> Rc<Debounced<A>> {
        match &self.current {
            Some(existing) if existing.delay_ms() == delay_ms => {
                existing.set_callback(callback);
                Rc::clone(existing)
            }
            _ => {
                if let Some(old) = self.current.take() {
                    old.cancel();
                }
                let created = Rc::new(Debounced::new(Rc::clone(runtime), delay_ms, callback));
                self.current = Some(Rc::clone(&created));
                created
            }
        }
    }

    /// Cancels any pending call and forgets the instance.
    pub fn clear(&mut self) {
        if let Some(old) = self.current.take() {
            old.cancel();
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.current.as_ref().is_some_and(|d| d.is_pending())
    }
}
