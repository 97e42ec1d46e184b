//! Field errors: live validation status and routed decode errors.
//!
//! Two sources feed a field's error:
//!
//! - **Live validation** of that single field, tracked per path as a
//!   [`FieldValidation`]. Only the most recent run for a path may land.
//! - **Routed errors** from the last full decode (a submit), each tagged with
//!   its [`ErrorSource`].
//!
//! [`ErrorStore::visible_error`] combines them:
//!
//! | Live status            | Shown                                   |
//! |------------------------|-----------------------------------------|
//! | `Invalid` / `Defect`   | the live message                        |
//! | `Validating` / `Valid` | a stored `Refinement` error, if any     |
//! | `Idle`                 | any stored error                        |

use crate::domain::path::FieldPath;
use crate::schema::router::{ErrorEntry, ErrorMap, ErrorSource};

/// Live validation status of one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValidation {
    /// Never validated live, or reset.
    #[default]
    Idle,

    /// A run is in flight; `generation` identifies it.
    Validating { generation: u64 },

    Valid,

    Invalid(String),

    /// The validator panicked.
    Defect(String),
}

impl FieldValidation {
    #[must_use]
    pub const fn is_validating(&self) -> bool {
        matches!(self, Self::Validating { .. })
    }
}

/// Per-field errors for one form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorStore {
    routed: im::OrdMap<String, ErrorEntry>,
    live: im::OrdMap<FieldPath, FieldValidation>,
}

impl ErrorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the routed errors with the result of a full decode.
    ///
    /// Settled live statuses go back to `Idle` so the fresh decode is what
    /// shows; in-flight runs keep their status and may still land.
    #[must_use]
    pub fn with_decode_result(&self, routed: &ErrorMap) -> Self {
        let live = self
            .live
            .iter()
            .filter(|(_, status)| status.is_validating())
            .map(|(path, status)| (path.clone(), status.clone()))
            .collect();
        Self {
            routed: routed.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            live,
        }
    }

    /// Drops field-sourced errors at or below `path`. Refinement errors stay.
    #[must_use]
    pub fn clear_field_errors(&self, path: &FieldPath) -> Self {
        let prefix = path.to_string();
        let routed = self
            .routed
            .iter()
            .filter(|(key, entry)| !(entry.source == ErrorSource::Field && is_at_or_below(key, &prefix)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            routed,
            live: self.live.clone(),
        }
    }

    #[must_use]
    pub fn with_status(&self, path: &FieldPath, status: FieldValidation) -> Self {
        let mut next = self.clone();
        if status == FieldValidation::Idle {
            next.live.remove(path);
        } else {
            next.live.insert(path.clone(), status);
        }
        next
    }

    #[must_use]
    pub fn status(&self, path: &FieldPath) -> FieldValidation {
        self.live.get(path).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_validating(&self, path: &FieldPath) -> bool {
        self.live.get(path).is_some_and(FieldValidation::is_validating)
    }

    #[must_use]
    pub fn any_validating(&self) -> bool {
        self.live.values().any(FieldValidation::is_validating)
    }

    /// The stored routed error at exactly `path`.
    #[must_use]
    pub fn routed(&self, path: &FieldPath) -> Option<&ErrorEntry> {
        self.routed.get(&path.to_string())
    }

    /// All stored routed errors.
    #[must_use]
    pub fn routed_errors(&self) -> ErrorMap {
        self.routed.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// The error to show for `path`, before the display policy is applied.
    #[must_use]
    pub fn visible_error(&self, path: &FieldPath) -> Option<String> {
        let stored = self.routed(path);
        match self.status(path) {
            FieldValidation::Invalid(message) | FieldValidation::Defect(message) => Some(message),
            FieldValidation::Validating { .. } | FieldValidation::Valid => stored
                .filter(|entry| entry.source == ErrorSource::Refinement)
                .map(|entry| entry.message.clone()),
            FieldValidation::Idle => stored.map(|entry| entry.message.clone()),
        }
    }
}

fn is_at_or_below(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() || key == prefix {
        return true;
    }
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
}
