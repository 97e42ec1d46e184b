//! Error types for the form-state engine.
//!
//! This module defines the centralized error type [`FormError`] and a type alias
//! [`Result`] for convenient error handling throughout the crate. All errors are
//! implemented using the `thiserror` crate for automatic `Error` trait implementation.
//!
//! Failures of the host's own submit operation are deliberately absent: they keep
//! their own type `E` and surface on
//! [`SubmitOutcome::Failed`](crate::app::submit::SubmitOutcome::Failed).

use crate::schema::router::ErrorMap;
use thiserror::Error;

/// The main error type for form-state operations.
///
/// # Examples
///
/// ```
/// use formstate::FormError;
///
/// fn check(len: usize, index: usize) -> Result<(), FormError> {
///     if index >= len {
///         return Err(FormError::InvalidIndex {
///             path: "items".to_string(),
///             index,
///             len,
///         });
///     }
///     Ok(())
/// }
///
/// assert!(check(2, 5).is_err());
/// ```
#[derive(Debug, Error)]
pub enum FormError {
    /// The structural validator rejected the encoded tree.
    ///
    /// Carries the issues already routed onto field paths. Never fatal: the
    /// form stays usable and the entries are displayed on their fields.
    #[error("Decode error: {} field(s) rejected", .0.len())]
    Decode(ErrorMap),

    /// An array operation was given an index outside the array.
    #[error("Invalid index {index} for array '{path}' of length {len}")]
    InvalidIndex {
        /// Canonical path of the array field.
        path: String,
        /// The offending index.
        index: usize,
        /// Length of the array at the time of the operation.
        len: usize,
    },

    /// A path string could not be parsed, or cannot address the value tree.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The path as given.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// An array operation targeted a value that is not an array.
    #[error("Value at '{0}' is not an array")]
    NotAnArray(String),

    /// No field definition exists for the given path.
    #[error("No field is defined at '{0}'")]
    UnknownField(String),

    /// Configuration is invalid or a builder composition is rejected.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A decoded snapshot does not fit the host type it was read into.
    #[error("Decoded value does not fit the requested type: {0}")]
    TypeMismatch(#[from] serde_json::Error),

    /// A validator or submit operation panicked.
    ///
    /// The attempt that hit the defect is abandoned, but the store stays intact.
    #[error("Defect: {0}")]
    Defect(String),
}

/// A specialized `Result` type for form-state operations.
pub type Result<T> = std::result::Result<T, FormError>;
