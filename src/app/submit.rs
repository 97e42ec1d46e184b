//! Submission lifecycle and auto-submit coordination.
//!
//! Each attempt walks one path through:
//!
//! ```text
//! Idle ─► Decoding ─┬─► DecodeFailed
//!                   └─► Submitting ─┬─► Success
//!                                   └─► SubmitFailed
//! ```
//!
//! An attempt is *in flight* while `Decoding` or `Submitting`. At most one
//! attempt is in flight per form.
//!
//! # Auto-submit
//!
//! Auto-submit is driven by two independent streams so that the bookkeeping
//! done when a submission completes (bumping the count, recording the
//! snapshot) can never be mistaken for a user edit:
//!
//! 1. the **values stream** calls [`SubmitCoordinator::request_auto_submit`]
//!    when the values tree changes identity; it fires a submit right away or,
//!    while one is in flight, raises the pending flag;
//! 2. the **completion stream** ([`SubmitCoordinator::watch_completion`])
//!    sees the in-flight → settled transition and, if the pending flag is
//!    raised, clears it and fires exactly one more submit.

use crate::app::store::{subscribe_selected, MemoryStore, StateStore, Subscription};
use crate::schema::router::ErrorMap;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Where the current (or last) submission attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubmissionPhase {
    #[default]
    Idle,
    Decoding,
    DecodeFailed,
    Submitting,
    Success,
    SubmitFailed,
}

impl SubmissionPhase {
    /// Whether an attempt is in flight.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::Decoding | Self::Submitting)
    }
}

impl fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Decoding => "decoding",
            Self::DecodeFailed => "decode-failed",
            Self::Submitting => "submitting",
            Self::Success => "success",
            Self::SubmitFailed => "submit-failed",
        };
        f.write_str(name)
    }
}

/// Result of one submit request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<A, E> {
    /// The submit operation returned a value.
    Success(A),

    /// The values did not decode; the submit operation was not called.
    DecodeFailed(ErrorMap),

    /// The submit operation returned its own error.
    Failed(E),

    /// The validator or submit operation panicked.
    Defect(String),

    /// Another attempt was in flight; this request was ignored.
    Busy,

    /// The form was unmounted before the attempt settled. Nothing was recorded.
    Cancelled,
}

impl<A, E> SubmitOutcome<A, E> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The phase this outcome leaves the coordinator in.
    #[must_use]
    pub const fn phase(&self) -> Option<SubmissionPhase> {
        match self {
            Self::Success(_) => Some(SubmissionPhase::Success),
            Self::DecodeFailed(_) => Some(SubmissionPhase::DecodeFailed),
            Self::Failed(_) | Self::Defect(_) => Some(SubmissionPhase::SubmitFailed),
            Self::Busy | Self::Cancelled => None,
        }
    }
}

/// Tracks the submission phase and the pending auto-submit flag.
#[derive(Clone)]
pub struct SubmitCoordinator {
    phase: MemoryStore<SubmissionPhase>,
    pending: Rc<Cell<bool>>,
}

impl Default for SubmitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmitCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: MemoryStore::new(SubmissionPhase::Idle),
            pending: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SubmissionPhase {
        self.phase.get()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.phase().is_waiting()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.get()
    }

    /// Starts an attempt. Returns `false` if one is already in flight.
    pub fn begin(&self) -> bool {
        if self.is_in_flight() {
            tracing::debug!(phase = %self.phase(), "submit ignored, attempt in flight");
            return false;
        }
        self.transition(SubmissionPhase::Decoding);
        true
    }

    /// Moves to `next`, notifying phase subscribers.
    pub fn transition(&self, next: SubmissionPhase) {
        tracing::debug!(from = %self.phase(), to = %next, "submission phase");
        self.phase.update(|_| next);
    }

    /// Values stream entry point: fire now, or remember for later.
    pub fn request_auto_submit(&self, fire: impl FnOnce()) {
        if self.is_in_flight() {
            tracing::debug!("auto-submit deferred, attempt in flight");
            self.pending.set(true);
        } else {
            fire();
        }
    }

    /// Completion stream: fires `fire` once per settled attempt that had
    /// changes queued behind it.
    pub fn watch_completion(&self, fire: impl Fn() + 'static) -> Subscription {
        let pending = Rc::clone(&self.pending);
        subscribe_selected(
            &self.phase,
            |phase: &SubmissionPhase| phase.is_waiting(),
            move |waiting: &bool| {
                if !*waiting && pending.replace(false) {
                    tracing::debug!("firing queued auto-submit");
                    fire();
                }
            },
        )
    }

    /// Subscribes to every phase change.
    pub fn subscribe(&self, listener: impl Fn(SubmissionPhase) + 'static) -> Subscription {
        self.phase.subscribe(Box::new(move |phase: &SubmissionPhase| listener(*phase)))
    }

    /// Drops any queued auto-submit and returns to `Idle`, abandoning an
    /// attempt still in flight.
    pub fn clear(&self) {
        self.pending.set(false);
        if self.phase() != SubmissionPhase::Idle {
            self.transition(SubmissionPhase::Idle);
        }
    }
}

impl fmt::Debug for SubmitCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitCoordinator")
            .field("phase", &self.phase())
            .field("pending", &self.pending.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_exclusive() {
        let coordinator = SubmitCoordinator::new();
        assert!(coordinator.begin());
        assert!(!coordinator.begin());
        coordinator.transition(SubmissionPhase::Submitting);
        assert!(!coordinator.begin());
        coordinator.transition(SubmissionPhase::Success);
        assert!(coordinator.begin());
    }

    #[test]
    fn change_during_flight_fires_once_after_completion() {
        let coordinator = SubmitCoordinator::new();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let _completion = coordinator.watch_completion(move || counter.set(counter.get() + 1));

        coordinator.begin();
        coordinator.request_auto_submit(|| panic!("must be deferred"));
        coordinator.request_auto_submit(|| panic!("must be deferred"));
        assert!(coordinator.has_pending());

        coordinator.transition(SubmissionPhase::Submitting);
        assert_eq!(fired.get(), 0);
        coordinator.transition(SubmissionPhase::Success);
        assert_eq!(fired.get(), 1);
        assert!(!coordinator.has_pending());

        coordinator.begin();
        coordinator.transition(SubmissionPhase::SubmitFailed);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn idle_request_fires_immediately() {
        let coordinator = SubmitCoordinator::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        coordinator.request_auto_submit(move || flag.set(true));
        assert!(fired.get());
        assert!(!coordinator.has_pending());
    }

    #[test]
    fn outcome_phases() {
        assert_eq!(SubmitOutcome::<(), ()>::Success(()).phase(), Some(SubmissionPhase::Success));
        assert_eq!(
            SubmitOutcome::<(), ()>::Defect("boom".into()).phase(),
            Some(SubmissionPhase::SubmitFailed)
        );
        assert_eq!(SubmitOutcome::<(), ()>::Busy.phase(), None);
        assert_eq!(SubmitOutcome::<(), ()>::Cancelled.phase(), None);
    }

    #[test]
    fn clear_abandons_in_flight_attempt_without_firing() {
        let coordinator = SubmitCoordinator::new();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let _completion = coordinator.watch_completion(move || counter.set(counter.get() + 1));

        coordinator.begin();
        coordinator.request_auto_submit(|| panic!("must be deferred"));
        coordinator.clear();
        assert_eq!(coordinator.phase(), SubmissionPhase::Idle);
        assert!(!coordinator.has_pending());
        assert_eq!(fired.get(), 0);
        assert!(coordinator.begin());
    }
}
