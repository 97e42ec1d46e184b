//! Validation mode policy.
//!
//! A form is configured with one of five mode shapes, all of which normalize
//! to a [`ValidationMode`]:
//!
//! | Configured shape                                  | Trigger    | Debounce | Auto-submit |
//! |---------------------------------------------------|------------|----------|-------------|
//! | `"onSubmit"` (default)                            | `OnSubmit` | none     | no          |
//! | `"onBlur"`                                        | `OnBlur`   | none     | no          |
//! | `"onChange"`                                      | `OnChange` | none     | no          |
//! | `{ onChange = { debounce = 300, autoSubmit = b } }` | `OnChange` | 300 ms   | `b`         |
//! | `{ onBlur = { autoSubmit = b } }`                 | `OnBlur`   | none     | `b`         |
//!
//! The trigger also drives when errors become visible; see [`should_show_error`].
//!
//! # Example
//!
//! ```rust
//! use formstate::app::mode::{parse, Trigger, ValidationModeConfig};
//!
//! let config: ValidationModeConfig =
//!     serde_json::from_str(r#"{ "onChange": { "debounce": 300, "autoSubmit": true } }"#)?;
//! let mode = parse(&config);
//! assert_eq!(mode.trigger, Trigger::OnChange);
//! assert_eq!(mode.debounce_ms, Some(300));
//! assert!(mode.auto_submit);
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize, Serialize};

/// The event that starts live validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    /// Validate on every value change.
    OnChange,

    /// Validate when a field loses focus.
    OnBlur,

    /// Never validate live; only at submit.
    #[default]
    OnSubmit,
}

/// Options of the `{ onChange = {...} }` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OnChangeOptions {
    /// Delay in milliseconds.
    pub debounce: u64,

    #[serde(default)]
    pub auto_submit: bool,
}

/// Options of the `{ onBlur = {...} }` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OnBlurOptions {
    #[serde(default)]
    pub auto_submit: bool,
}

/// A validation mode as configured, in any of its accepted shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationModeConfig {
    Trigger(Trigger),
    OnChange {
        #[serde(rename = "onChange")]
        on_change: OnChangeOptions,
    },
    OnBlur {
        #[serde(rename = "onBlur")]
        on_blur: OnBlurOptions,
    },
}

impl Default for ValidationModeConfig {
    fn default() -> Self {
        Self::Trigger(Trigger::OnSubmit)
    }
}

impl From<Trigger> for ValidationModeConfig {
    fn from(trigger: Trigger) -> Self {
        Self::Trigger(trigger)
    }
}

/// Normalized validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationMode {
    pub trigger: Trigger,

    /// Debounce for change-triggered work; `None` runs it synchronously.
    pub debounce_ms: Option<u64>,

    /// Whether the trigger also submits the form.
    pub auto_submit: bool,
}

impl ValidationMode {
    #[must_use]
    pub fn validates_on_change(&self) -> bool {
        self.trigger == Trigger::OnChange
    }

    #[must_use]
    pub fn validates_on_blur(&self) -> bool {
        self.trigger == Trigger::OnBlur
    }
}

impl From<&ValidationModeConfig> for ValidationMode {
    fn from(config: &ValidationModeConfig) -> Self {
        parse(config)
    }
}

/// Normalizes a configured mode.
#[must_use]
pub fn parse(config: &ValidationModeConfig) -> ValidationMode {
    match *config {
        ValidationModeConfig::Trigger(trigger) => ValidationMode {
            trigger,
            debounce_ms: None,
            auto_submit: false,
        },
        ValidationModeConfig::OnChange { on_change } => ValidationMode {
            trigger: Trigger::OnChange,
            debounce_ms: Some(on_change.debounce),
            auto_submit: on_change.auto_submit,
        },
        ValidationModeConfig::OnBlur { on_blur } => ValidationMode {
            trigger: Trigger::OnBlur,
            debounce_ms: None,
            auto_submit: on_blur.auto_submit,
        },
    }
}

/// Display policy: whether a field's error may be shown yet.
///
/// - `OnChange`: once the field is dirty, or after a submit attempt
/// - `OnBlur`: once the field is touched, or after a submit attempt
/// - `OnSubmit`: only after a submit attempt
///
/// A submit attempt counts even when it failed to decode.
#[must_use]
pub const fn should_show_error(trigger: Trigger, is_dirty: bool, is_touched: bool, submit_attempted: bool) -> bool {
    match trigger {
        Trigger::OnChange => is_dirty || submit_attempted,
        Trigger::OnBlur => is_touched || submit_attempted,
        Trigger::OnSubmit => submit_attempted,
    }
}
