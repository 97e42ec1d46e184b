//! Structured logging through `tracing`.
//!
//! The engine emits `tracing` spans and events for every form operation
//! (`set_value`, `blur`, `submit`, array edits) and for submission phase
//! transitions. Nothing is printed unless the host installs a subscriber,
//! either its own or the one built by [`init_tracing`].
//!
//! # Configuration
//!
//! Trace level is controlled via:
//! 1. `trace_level` in [`FormConfig`](crate::FormConfig)
//! 2. Default: `"info"`
//!
//! Any `EnvFilter` directive works, e.g. `"formstate=debug"`.
//!
//! # Usage
//!
//! ```rust
//! use formstate::observability::init_tracing;
//! use formstate::FormConfig;
//!
//! let config = FormConfig::default();
//! init_tracing(&config);
//!
//! tracing::debug!("form engine ready");
//! ```

mod init;

pub use init::init_tracing;
