//! Application layer: the stateful machinery behind a form.
//!
//! This module sits between the schema layer (what values are valid) and a
//! rendering layer (what the user sees). It owns every piece of mutable state
//! and every scheduled piece of work.
//!
//! # Architecture
//!
//! Data flows in one direction:
//!
//! ```text
//! Form operation → FormState / ErrorStore update → store listeners
//!                        ↑                              ↓
//!                        └── debounced validation, auto-submit ──┘
//! ```
//!
//! # Modules
//!
//! - [`form`]: The [`Form`] handle, the public operation surface
//! - [`state`]: Immutable form state snapshots and their transitions
//! - [`errors`]: Live validation status and routed decode errors
//! - [`submit`]: Submission phases and auto-submit coordination
//! - [`store`]: Observable state cells with RAII subscriptions
//! - [`mode`]: Validation mode configuration and display policy
//! - [`debounce`]: Trailing-edge debounced callables
//! - [`runtime`]: Timer and task-spawning collaborator
//!
//! # Example
//!
//! ```rust
//! use formstate::app::{Form, ManualRuntime};
//! use formstate::schema::{make_field, FormBuilder};
//! use formstate::schema::validator::string;
//! use formstate::{FieldPath, FormConfig};
//! use futures_util::future::{self, FutureExt};
//! use std::rc::Rc;
//!
//! let builder = FormBuilder::empty().add_field(make_field("title", string()));
//! let form: Form<(), ()> = Form::build(&builder, &FormConfig::default(), Rc::new(ManualRuntime::new()), |(), _, _| {
//!     future::ready(Ok(())).boxed_local()
//! });
//!
//! form.set_value(&FieldPath::parse("title")?, "Draft")?;
//! assert!(form.is_dirty());
//! # Ok::<(), formstate::FormError>(())
//! ```

pub mod debounce;
pub mod errors;
pub mod form;
pub mod mode;
pub mod runtime;
pub mod state;
pub mod store;
pub mod submit;

pub use errors::{ErrorStore, FieldValidation};
pub use form::{Form, KeepAlive, SubmitFn};
pub use mode::{Trigger, ValidationMode, ValidationModeConfig};
pub use runtime::{ManualRuntime, Runtime};
pub use state::{FormState, LastSubmission};
pub use store::{MemoryStore, StateStore, Subscription};
pub use submit::{SubmissionPhase, SubmitOutcome};
