//! Timer and task-spawning collaborator.
//!
//! The engine never sleeps or blocks. Delays (debounces) are scheduled through
//! [`Runtime::schedule`] and asynchronous work (live validation, submission)
//! is handed to [`Runtime::spawn`]. Hosts plug in their event loop here.
//!
//! [`ManualRuntime`] is a single-threaded implementation driven by a virtual
//! clock, for hosts that pump their own loop and for deterministic tests.
//!
//! # Example
//!
//! ```rust
//! use formstate::app::runtime::{ManualRuntime, Runtime};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let runtime = ManualRuntime::new();
//! let fired = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&fired);
//! runtime.schedule(50, Box::new(move || flag.set(true)));
//!
//! runtime.advance(49);
//! assert!(!fired.get());
//! runtime.advance(1);
//! assert!(fired.get());
//! ```

use chrono::{DateTime, Duration, Utc};
use futures_executor::{LocalPool, LocalSpawner};
use futures_util::future::LocalBoxFuture;
use futures_util::task::LocalSpawnExt;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A deferred callback.
pub type Task = Box<dyn FnOnce()>;

/// Scheduling services the engine depends on.
pub trait Runtime {
    /// Runs `task` once, `delay_ms` milliseconds from now.
    fn schedule(&self, delay_ms: u64, task: Task) -> TimerId;

    /// Cancels a scheduled task. Unknown or already fired ids are ignored.
    fn cancel(&self, id: TimerId);

    /// Drives `future` to completion in the background.
    fn spawn(&self, future: LocalBoxFuture<'static, ()>);

    /// Current wall-clock time, used to stamp submissions.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Default)]
struct Timers {
    now_ms: u64,
    next_id: u64,
    // Keyed by (deadline, id) so equal deadlines fire in scheduling order.
    pending: BTreeMap<(u64, u64), Task>,
}

/// Virtual-time runtime backed by a `LocalPool`.
///
/// Time only moves when [`ManualRuntime::advance`] is called. Spawned futures
/// run whenever the runtime is pumped ([`advance`](ManualRuntime::advance) or
/// [`run_until_stalled`](ManualRuntime::run_until_stalled)).
pub struct ManualRuntime {
    timers: RefCell<Timers>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    epoch: DateTime<Utc>,
    running: Cell<bool>,
}

impl Default for ManualRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualRuntime {
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            timers: RefCell::new(Timers::default()),
            pool: RefCell::new(pool),
            spawner,
            epoch: Utc::now(),
            running: Cell::new(false),
        }
    }

    /// Milliseconds elapsed on the virtual clock.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.timers.borrow().now_ms
    }

    /// Number of timers still waiting to fire.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().pending.len()
    }

    /// Polls spawned futures until none can make progress.
    ///
    /// Reentrant calls (from inside a spawned future or a timer) are ignored.
    pub fn run_until_stalled(&self) {
        if self.running.replace(true) {
            return;
        }
        if let Ok(mut pool) = self.pool.try_borrow_mut() {
            pool.run_until_stalled();
        }
        self.running.set(false);
    }

    /// Moves the clock forward by `ms`, firing due timers in deadline order.
    ///
    /// Spawned futures are pumped before the first timer and after each one,
    /// so work started by a timer settles before the next timer fires.
    pub fn advance(&self, ms: u64) {
        let _span = tracing::debug_span!("advance", ms).entered();

        let target = self.timers.borrow().now_ms + ms;
        self.run_until_stalled();

        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                let next = timers.pending.keys().next().copied().filter(|(deadline, _)| *deadline <= target);
                next.and_then(|key| {
                    timers.now_ms = key.0;
                    timers.pending.remove(&key)
                })
            };
            let Some(task) = due else { break };
            task();
            self.run_until_stalled();
        }

        self.timers.borrow_mut().now_ms = target;
        self.run_until_stalled();
    }
}

impl Runtime for ManualRuntime {
    fn schedule(&self, delay_ms: u64, task: Task) -> TimerId {
        let mut timers = self.timers.borrow_mut();
        timers.next_id += 1;
        let id = timers.next_id;
        let deadline = timers.now_ms + delay_ms;
        timers.pending.insert((deadline, id), task);
        tracing::trace!(id, deadline, "timer scheduled");
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        self.timers.borrow_mut().pending.retain(|(_, timer), _| *timer != id.0);
    }

    fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawner.spawn_local(future) {
            tracing::warn!(error = %err, "failed to spawn task");
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = i64::try_from(self.elapsed_ms()).unwrap_or(i64::MAX);
        self.epoch + Duration::milliseconds(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures_util::FutureExt;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = Rc::clone(&log);
        let make = move |name: &'static str| -> Task {
            let log = Rc::clone(&handle);
            Box::new(move || log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let runtime = ManualRuntime::new();
        let (log, task) = recorder();
        runtime.schedule(20, task("late"));
        runtime.schedule(10, task("first"));
        runtime.schedule(10, task("second"));
        runtime.advance(100);
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
        assert_eq!(runtime.elapsed_ms(), 100);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let runtime = ManualRuntime::new();
        let (log, task) = recorder();
        let id = runtime.schedule(10, task("cancelled"));
        runtime.cancel(id);
        runtime.advance(50);
        assert!(log.borrow().is_empty());
        assert_eq!(runtime.pending_timers(), 0);
    }

    #[test]
    fn spawned_futures_run_when_pumped() {
        let runtime = ManualRuntime::new();
        let (tx, rx) = oneshot::channel::<u32>();
        let got = Rc::new(Cell::new(0));
        let sink = Rc::clone(&got);
        runtime.spawn(
            async move {
                if let Ok(v) = rx.await {
                    sink.set(v);
                }
            }
            .boxed_local(),
        );
        runtime.run_until_stalled();
        assert_eq!(got.get(), 0);
        tx.send(7).unwrap();
        runtime.run_until_stalled();
        assert_eq!(got.get(), 7);
    }

    #[test]
    fn clock_tracks_virtual_time() {
        let runtime = ManualRuntime::new();
        let start = runtime.now();
        runtime.advance(1500);
        assert_eq!((runtime.now() - start).num_milliseconds(), 1500);
    }
}
