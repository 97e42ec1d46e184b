//! Formstate: a headless form-state engine.
//!
//! Formstate keeps the state of an editable form and decides when to validate
//! and submit it. It provides:
//! - Path-addressed encoded values with structural sharing
//! - Field, array-item and cross-field validation with routed error messages
//! - Array editing (append, remove, swap, move) at any nesting depth
//! - Dirty, touched and submission tracking
//! - Debounced live validation and coordinated auto-submission
//!
//! Rendering is left to the host: it reads [`view::FieldView`] snapshots and
//! drives the form through the [`Form`] handle.

#![allow(clippy::multiple_crate_versions)]

//!
//! # Architecture
//!
//! The crate follows a layered architecture pattern:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Host (rendering layer, event loop)                 │  ← Caller
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Application Layer (app/)                           │  ← Form handle
//! │  - Form state and transitions                       │  ← Coordination
//! │  - Live validation, debounce                        │
//! │  - Submission coordinator                           │
//! └─────────────────────────────────────────────────────┘
//!         │                                     │
//! ┌───────────────────────┐         ┌───────────────────────┐
//! │ Schema Layer          │         │ View Layer            │
//! │ (schema/)             │         │ (view.rs)             │
//! │ - Field definitions   │         │ - Field snapshots     │
//! │ - Validators, issues  │         │ - Array handles       │
//! │ - Error routing       │         │                       │
//! └───────────────────────┘         └───────────────────────┘
//!         │                                     │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain Layer (domain/)                             │
//! │  - Field paths                                      │
//! │  - Encoded value trees                              │
//! │  - Error types                                      │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Observability (observability/)                     │  ← Optional
//! │  - tracing subscriber setup                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`app`]: Form handle, state, errors, submission and scheduling
//! - [`domain`]: Core domain types (paths, values, errors)
//! - [`schema`]: Field definitions, validators and error routing
//! - [`view`]: Read-only snapshots for rendering
//! - [`observability`]: Tracing initialization
//!
//! # Configuration
//!
//! A form is configured with a [`FormConfig`], built in code or loaded from
//! TOML:
//!
//! ```toml
//! trace_level = "debug"
//!
//! [mode.onChange]
//! debounce = 300
//! autoSubmit = true
//! ```
//!
//! # Lifecycle
//!
//! 1. **Build** (`Form::build`):
//!    - Compile the builder into a combined schema
//!    - Seed values with encoded defaults
//!    - Install the values and completion streams used by auto-submit
//!
//! 2. **Initialize** (`Form::initialize`):
//!    - First call wins while the form is alive
//!
//! 3. **Edit** (`set_value`, `blur`, array operations):
//!    - Commit a new state snapshot
//!    - Clear the edited field's own stored error
//!    - Validate live and auto-submit according to the mode
//!
//! 4. **Submit** (`Form::submit`):
//!    - Decode through field validators and refinements
//!    - Route failures onto fields, or call the submit operation
//!    - Record the submission on success
//!
//! 5. **Unmount** (`Form::unmount`):
//!    - Cancel pending work and drop state, unless a `KeepAlive` lease is held
//!
//! # Examples
//!
//! ```rust
//! use formstate::schema::{make_array_field, make_field, FormBuilder, RefinementFailure, ValidatorExt};
//! use formstate::schema::validator::string;
//! use formstate::{FieldPath, Form, FormConfig, ManualRuntime, SubmitOutcome};
//! use futures_util::future::{self, FutureExt};
//! use std::rc::Rc;
//!
//! let builder = FormBuilder::empty()
//!     .add_field(make_field("password", string().min_length(8, "Password too short")))
//!     .add_field(make_field("confirm", string()))
//!     .add_array(make_array_field("tags", string().non_empty("Tag required")))
//!     .refine(|v| {
//!         (v["password"] != v["confirm"]).then(|| RefinementFailure::field("confirm", "Passwords must match"))
//!     });
//!
//! let form: Form<(), String> = Form::build(&builder, &FormConfig::default(), Rc::new(ManualRuntime::new()), |(), _, _| {
//!     future::ready(Ok(())).boxed_local()
//! });
//!
//! form.set_value(&FieldPath::parse("password")?, "correct horse")?;
//! form.set_value(&FieldPath::parse("confirm")?, "correct hose")?;
//!
//! let outcome = futures_executor::block_on(form.submit(()));
//! assert!(matches!(outcome, SubmitOutcome::DecodeFailed(_)));
//! assert_eq!(
//!     form.field(&FieldPath::parse("confirm")?).error.as_deref(),
//!     Some("Passwords must match")
//! );
//! # Ok::<(), formstate::FormError>(())
//! ```
//!
//! # Key Design Decisions
//!
//! ## Explicit Paths
//!
//! Every field operation takes the [`FieldPath`] it addresses. There is no
//! ambient "current field" or "current item" context:
//! - Array handles compute item and column paths up front
//! - The same handle serves any number of rendered fields
//!
//! ## Copy-on-Write Values
//!
//! Values are persistent trees:
//! - An edit copies only the ancestors of the edited leaf
//! - Unchanged subtrees keep their identity, which is what change detection
//!   compares
//!
//! ## Two-Stream Auto-Submit
//!
//! Value changes and submission completion are observed separately, so the
//! bookkeeping written when a submission completes never looks like an edit.
//!
//! # Platform Support
//!
//! - **Threading**: single-threaded (`Rc`, `RefCell`); one form per thread
//! - **Scheduling**: pluggable via [`app::runtime::Runtime`]

pub mod app;
pub mod domain;
pub mod schema;
pub mod view;

pub mod observability;

pub use app::{
    Form, KeepAlive, ManualRuntime, Runtime, SubmissionPhase, SubmitOutcome, Trigger, ValidationMode,
    ValidationModeConfig,
};
pub use domain::{FieldPath, FormError, FormValue, Result, Segment};
pub use schema::CancelToken;
pub use view::{ArrayFieldHandle, FieldView};

use app::mode::{OnBlurOptions, OnChangeOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Form configuration.
///
/// Built in code, deserialized with serde, parsed from TOML
/// ([`FormConfig::from_toml_str`]) or from a flat string map
/// ([`FormConfig::from_map`]).
///
/// # Example
///
/// ```toml
/// trace_level = "debug"
/// mode = { onBlur = { autoSubmit = true } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormConfig {
    /// When fields validate and whether that also submits.
    ///
    /// Default: `"onSubmit"`
    #[serde(default)]
    pub mode: ValidationModeConfig,

    /// Tracing filter directive for [`observability::init_tracing`].
    ///
    /// Options: `trace`, `debug`, `info`, `warn`, `error`, or any
    /// `EnvFilter` directive. Default: `"info"`
    #[serde(default)]
    pub trace_level: Option<String>,
}

impl FormConfig {
    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Config`] if the document is not valid TOML or
    /// does not describe a configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use formstate::{FormConfig, Trigger, ValidationMode};
    ///
    /// let config = FormConfig::from_toml_str(r#"
    ///     [mode.onChange]
    ///     debounce = 300
    ///     autoSubmit = true
    /// "#)?;
    ///
    /// let mode = ValidationMode::from(&config.mode);
    /// assert_eq!(mode.trigger, Trigger::OnChange);
    /// assert_eq!(mode.debounce_ms, Some(300));
    /// assert!(mode.auto_submit);
    /// # Ok::<(), formstate::FormError>(())
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| FormError::Config(e.to_string()))
    }

    /// Parses configuration from a flat string map.
    ///
    /// Meant for hosts that only carry string key/value settings. Values that
    /// fail to parse fall back to their defaults.
    ///
    /// # Parameters
    ///
    /// * `config` - Setting map
    ///
    /// # Parsing Rules
    ///
    /// - `mode`: `"onSubmit"` | `"onBlur"` | `"onChange"` (falls back to `"onSubmit"`)
    /// - `debounce`: String → `u64` milliseconds, only with `mode = "onChange"`
    /// - `auto_submit`: `"true"` enables auto-submit for `onChange` and
    ///   `onBlur`; an `onChange` mode without `debounce` then uses a delay of 0
    /// - `trace_level`: String → `Option<String>`
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use formstate::{FormConfig, ValidationMode};
    ///
    /// let mut map = BTreeMap::new();
    /// map.insert("mode".to_string(), "onChange".to_string());
    /// map.insert("debounce".to_string(), "250".to_string());
    ///
    /// let config = FormConfig::from_map(&map);
    /// assert_eq!(ValidationMode::from(&config.mode).debounce_ms, Some(250));
    /// ```
    #[must_use]
    pub fn from_map(config: &BTreeMap<String, String>) -> Self {
        let trigger = config
            .get("mode")
            .and_then(|s| serde_json::from_value::<Trigger>(serde_json::Value::String(s.trim().to_string())).ok())
            .unwrap_or_default();

        let debounce = config.get("debounce").and_then(|s| s.trim().parse::<u64>().ok());

        let auto_submit = config
            .get("auto_submit")
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("true"));

        let mode = match trigger {
            Trigger::OnChange if debounce.is_some() || auto_submit => ValidationModeConfig::OnChange {
                on_change: OnChangeOptions {
                    debounce: debounce.unwrap_or(0),
                    auto_submit,
                },
            },
            Trigger::OnBlur if auto_submit => ValidationModeConfig::OnBlur {
                on_blur: OnBlurOptions { auto_submit },
            },
            trigger => ValidationModeConfig::Trigger(trigger),
        };

        Self {
            mode,
            trace_level: config.get("trace_level").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn toml_accepts_every_mode_shape() {
        let cases = [
            (r#"mode = "onSubmit""#, Trigger::OnSubmit, None, false),
            (r#"mode = "onBlur""#, Trigger::OnBlur, None, false),
            (r#"mode = "onChange""#, Trigger::OnChange, None, false),
            ("mode = { onChange = { debounce = 300, autoSubmit = true } }", Trigger::OnChange, Some(300), true),
            ("mode = { onBlur = { autoSubmit = true } }", Trigger::OnBlur, None, true),
            ("", Trigger::OnSubmit, None, false),
        ];
        for (source, trigger, debounce_ms, auto_submit) in cases {
            let config = FormConfig::from_toml_str(source).unwrap();
            let mode = ValidationMode::from(&config.mode);
            assert_eq!(mode.trigger, trigger, "{source}");
            assert_eq!(mode.debounce_ms, debounce_ms, "{source}");
            assert_eq!(mode.auto_submit, auto_submit, "{source}");
        }
    }

    #[test]
    fn toml_rejects_unknown_shapes() {
        assert!(matches!(FormConfig::from_toml_str(r#"mode = "whenever""#), Err(FormError::Config(_))));
        assert!(matches!(
            FormConfig::from_toml_str("mode = { onChange = { delay = 3 } }"),
            Err(FormError::Config(_))
        ));
        assert!(matches!(FormConfig::from_toml_str("colour = 1"), Err(FormError::Config(_))));
    }

    #[test]
    fn from_map_parses_settings() {
        let config = FormConfig::from_map(&map(&[
            ("mode", "onChange"),
            ("debounce", "300"),
            ("auto_submit", "true"),
            ("trace_level", "debug"),
        ]));
        assert_eq!(
            config.mode,
            ValidationModeConfig::OnChange {
                on_change: OnChangeOptions {
                    debounce: 300,
                    auto_submit: true
                }
            }
        );
        assert_eq!(config.trace_level.as_deref(), Some("debug"));

        let blur = FormConfig::from_map(&map(&[("mode", "onBlur"), ("auto_submit", "true")]));
        assert_eq!(
            blur.mode,
            ValidationModeConfig::OnBlur {
                on_blur: OnBlurOptions { auto_submit: true }
            }
        );
    }

    #[test]
    fn from_map_falls_back_to_defaults() {
        let config = FormConfig::from_map(&map(&[("mode", "sometimes"), ("debounce", "soon")]));
        assert_eq!(config, FormConfig::default());

        let plain = FormConfig::from_map(&map(&[("mode", "onChange"), ("debounce", "-5")]));
        assert_eq!(plain.mode, ValidationModeConfig::Trigger(Trigger::OnChange));
    }
}
