//! The form handle: public operation surface of the engine.
//!
//! A [`Form`] owns one form instance: its state store, its error store, the
//! submission coordinator and every pending debounce or validation run. It is
//! a cheap, clonable handle; clones address the same instance.
//!
//! Every field-level operation takes an explicit [`FieldPath`]. There is no
//! ambient context: a rendering layer passes the handle and the path it was
//! built for.
//!
//! # Flow
//!
//! ```text
//! set_value / blur / array op ─► FormState ─┬─► values stream ─► auto-submit
//!                                           └─► live validation (per path, debounced)
//! submit ─► Decoding ─► routed errors | submit operation ─► submit_count, last_submitted
//! ```
//!
//! # Example
//!
//! ```rust
//! use formstate::app::form::Form;
//! use formstate::app::runtime::ManualRuntime;
//! use formstate::schema::{make_field, FormBuilder, ValidatorExt};
//! use formstate::schema::validator::string;
//! use formstate::{FieldPath, FormConfig};
//! use futures_util::future::{self, FutureExt};
//! use std::rc::Rc;
//!
//! let builder = FormBuilder::empty().add_field(make_field("name", string().non_empty("Name required")));
//! let runtime = Rc::new(ManualRuntime::new());
//! let form: Form<String, ()> = Form::build(&builder, &FormConfig::default(), runtime.clone(), |(), decoded, _cancel| {
//!     future::ready(Ok(decoded["name"].as_str().unwrap_or_default().to_uppercase())).boxed_local()
//! });
//!
//! form.set_value(&FieldPath::parse("name")?, "ada")?;
//! let outcome = futures_executor::block_on(form.submit(()));
//! assert!(outcome.is_success());
//! assert_eq!(form.submit_count(), 1);
//! # Ok::<(), formstate::FormError>(())
//! ```

use crate::app::debounce::DebounceSlot;
use crate::app::errors::{ErrorStore, FieldValidation};
use crate::app::mode::{parse as parse_mode, should_show_error, ValidationMode, ValidationModeConfig};
use crate::app::runtime::Runtime;
use crate::app::state::{FormState, LastSubmission};
use crate::app::store::{subscribe_selected, ByRef, MemoryStore, StateStore, Subscription};
use crate::app::submit::{SubmissionPhase, SubmitCoordinator, SubmitOutcome};
use crate::domain::error::{FormError, Result};
use crate::domain::path::FieldPath;
use crate::domain::value::FormValue;
use crate::schema::builder::{build_schema, FormBuilder, FormSchema};
use crate::schema::field::get_default_encoded_values;
use crate::schema::router::{extract_first_error, route_errors_with_source, ErrorMap};
use crate::schema::validator::{CancelToken, DecodeResult, Validator};
use crate::view::{array_handles, ArrayFieldHandle, FieldView};
use crate::FormConfig;
use futures_util::future::{self, FutureExt, LocalBoxFuture};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// The host's submit operation: receives the submit arguments, the decoded
/// form and the attempt's cancel token, resolves to the host's own success or
/// error type.
///
/// The token is cancelled when the form is unmounted or the attempt's future
/// is dropped before it settles.
pub type SubmitFn<Args, A, E> =
    Rc<dyn Fn(Args, serde_json::Value, CancelToken) -> LocalBoxFuture<'static, std::result::Result<A, E>>>;

#[derive(Default)]
struct LiveRuns {
    next_generation: u64,
    running: BTreeMap<FieldPath, (u64, CancelToken)>,
}

struct Inner<A, E, Args> {
    schema: Rc<FormSchema>,
    arrays: BTreeMap<String, ArrayFieldHandle>,
    defaults: FormValue,
    mode: Cell<ValidationMode>,
    runtime: Rc<dyn Runtime>,
    submit_fn: SubmitFn<Args, A, E>,
    state: MemoryStore<FormState>,
    errors: MemoryStore<ErrorStore>,
    coordinator: SubmitCoordinator,
    live: RefCell<LiveRuns>,
    field_debounces: RefCell<BTreeMap<FieldPath, DebounceSlot<()>>>,
    auto_submit: RefCell<DebounceSlot<()>>,
    // Token of the latest submission attempt.
    attempt: RefCell<Option<CancelToken>>,
    streams: RefCell<Vec<Subscription>>,
    leases: Rc<Cell<usize>>,
    initialized: Cell<bool>,
    // Set while state is replaced wholesale (initialize, unmount).
    quiet: Cell<bool>,
}

/// Lease that keeps a form's state alive across [`Form::unmount`].
///
/// The state survives as long as at least one lease exists.
#[derive(Debug)]
#[must_use = "the form is only kept alive while the lease is held"]
pub struct KeepAlive {
    leases: Rc<Cell<usize>>,
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.leases.set(self.leases.get().saturating_sub(1));
    }
}

/// Settles the phase of an attempt whose future is dropped before it finishes.
struct AttemptGuard {
    coordinator: SubmitCoordinator,
    cancel: CancelToken,
    settled: bool,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.settled || self.cancel.is_cancelled() {
            return;
        }
        tracing::debug!(phase = %self.coordinator.phase(), "submission dropped before settling");
        self.cancel.cancel();
        self.coordinator.transition(SubmissionPhase::Idle);
    }
}

/// Handle to one form instance.
pub struct Form<A, E, Args = ()> {
    inner: Rc<Inner<A, E, Args>>,
}

impl<A, E, Args> Clone for Form<A, E, Args> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".to_string())
}

/// Runs a decode, turning a panic (while building or polling the future)
/// into `Err(message)`.
fn guarded_decode(
    validator: &dyn Validator,
    value: &FormValue,
    cancel: &CancelToken,
) -> LocalBoxFuture<'static, std::result::Result<DecodeResult, String>> {
    match panic::catch_unwind(AssertUnwindSafe(|| validator.decode(value, cancel))) {
        Ok(decode) => AssertUnwindSafe(decode)
            .catch_unwind()
            .map(|result| result.map_err(|payload| panic_message(payload.as_ref())))
            .boxed_local(),
        Err(payload) => future::ready(Err(panic_message(payload.as_ref()))).boxed_local(),
    }
}

impl<A, E, Args> Form<A, E, Args>
where
    A: 'static,
    E: 'static,
    Args: Default + 'static,
{
    /// Builds a form from its description.
    ///
    /// Values start at the encoded defaults (`""` per scalar field, `[]` per
    /// array field) until [`initialize`](Self::initialize) is called.
    pub fn build<F>(builder: &FormBuilder, config: &FormConfig, runtime: Rc<dyn Runtime>, submit: F) -> Self
    where
        F: Fn(Args, serde_json::Value, CancelToken) -> LocalBoxFuture<'static, std::result::Result<A, E>> + 'static,
    {
        let mode = parse_mode(&config.mode);
        let _span = tracing::debug_span!(
            "form_build",
            fields = builder.fields().len(),
            trigger = ?mode.trigger,
            debounce_ms = ?mode.debounce_ms,
            auto_submit = mode.auto_submit
        )
        .entered();

        let schema = Rc::new(build_schema(builder));
        let defaults = get_default_encoded_values(builder.fields());

        let form = Self {
            inner: Rc::new(Inner {
                arrays: array_handles(builder.fields()),
                schema,
                state: MemoryStore::new(FormState::new(defaults.clone())),
                defaults,
                mode: Cell::new(mode),
                runtime,
                submit_fn: Rc::new(submit),
                errors: MemoryStore::new(ErrorStore::new()),
                coordinator: SubmitCoordinator::new(),
                live: RefCell::new(LiveRuns::default()),
                field_debounces: RefCell::new(BTreeMap::new()),
                auto_submit: RefCell::new(DebounceSlot::new()),
                attempt: RefCell::new(None),
                streams: RefCell::new(Vec::new()),
                leases: Rc::new(Cell::new(0)),
                initialized: Cell::new(false),
                quiet: Cell::new(false),
            }),
        };
        form.install_streams();
        form
    }

    fn downgrade(&self) -> Weak<Inner<A, E, Args>> {
        Rc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner<A, E, Args>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn install_streams(&self) {
        let weak = self.downgrade();
        let values_stream = subscribe_selected(
            &self.inner.state,
            |state: &FormState| ByRef(state.values.clone()),
            move |_| {
                if let Some(form) = Self::upgrade(&weak) {
                    form.on_values_changed();
                }
            },
        );

        let weak = self.downgrade();
        let completion_stream = self.inner.coordinator.watch_completion(move || {
            if let Some(form) = Self::upgrade(&weak) {
                form.schedule_auto_submit();
            }
        });

        self.inner.streams.borrow_mut().extend([values_stream, completion_stream]);
    }

    fn matches_last_submission(&self) -> bool {
        self.inner.state.with(|state| {
            state
                .last_submitted
                .as_ref()
                .is_some_and(|last| last.encoded == state.values)
        })
    }

    fn on_values_changed(&self) {
        if self.inner.quiet.get() {
            return;
        }
        let mode = self.inner.mode.get();
        if !(mode.auto_submit && mode.validates_on_change()) {
            return;
        }
        if self.matches_last_submission() {
            tracing::debug!("values match last submission, auto-submit skipped");
            return;
        }
        self.inner.coordinator.request_auto_submit(|| self.schedule_auto_submit());
    }

    fn schedule_auto_submit(&self) {
        let delay = self.inner.mode.get().debounce_ms;
        let weak = self.downgrade();
        let debounced = self.inner.auto_submit.borrow_mut().get(&self.inner.runtime, delay, move |()| {
            if let Some(form) = Self::upgrade(&weak) {
                form.fire_auto_submit();
            }
        });
        debounced.call(());
    }

    fn fire_auto_submit(&self) {
        let _span = tracing::debug_span!("auto_submit").entered();
        if self.matches_last_submission() {
            tracing::debug!("values already submitted, auto-submit dropped");
            return;
        }
        match self.start_submit(Args::default()) {
            Some(attempt) => self.inner.runtime.spawn(attempt.map(|_| ()).boxed_local()),
            None => self.inner.coordinator.request_auto_submit(|| {}),
        }
    }

    /// Seeds the form with its initial values.
    ///
    /// Only the first call while the form is alive takes effect; later calls
    /// return `false` and change nothing.
    pub fn initialize(&self, values: FormValue) -> bool {
        if self.inner.initialized.replace(true) {
            tracing::debug!("form already initialized, ignoring");
            return false;
        }
        self.replace_state(FormState::new(values));
        true
    }

    fn replace_state(&self, state: FormState) {
        self.inner.quiet.set(true);
        self.inner.state.update(|_| state);
        self.inner.quiet.set(false);
    }

    /// Switches the validation mode.
    ///
    /// Debounced work already scheduled under the old delay is cancelled the
    /// next time it would be rescheduled.
    pub fn set_mode(&self, config: &ValidationModeConfig) {
        let mode = parse_mode(config);
        tracing::debug!(trigger = ?mode.trigger, debounce_ms = ?mode.debounce_ms, "validation mode changed");
        self.inner.mode.set(mode);
    }

    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.inner.mode.get()
    }

    /// Sets the value at `path`.
    ///
    /// Clears field-sourced errors at and below `path`, and starts live
    /// validation when the mode validates on change.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidPath`] if `path` cannot address the values.
    pub fn set_value(&self, path: &FieldPath, value: impl Into<FormValue>) -> Result<()> {
        let _span = tracing::debug_span!("set_value", path = %path).entered();

        let next = self.inner.state.with(|state| state.set_value(path, value.into()))?;
        let unchanged = self
            .inner
            .state
            .with(|state| FormValue::same_ref(&state.values, &next.values));
        if unchanged {
            tracing::debug!("value unchanged");
            return Ok(());
        }

        self.inner.errors.update(|errors| errors.clear_field_errors(path));
        self.inner.state.update(|_| next);

        if self.inner.mode.get().validates_on_change() {
            self.schedule_field_validation(path);
        }
        Ok(())
    }

    /// Sets the value at `path` from the current one.
    ///
    /// `f` receives `Null` when nothing is stored there.
    ///
    /// # Errors
    ///
    /// Same conditions as [`set_value`](Self::set_value).
    pub fn update_value(&self, path: &FieldPath, f: impl FnOnce(&FormValue) -> FormValue) -> Result<()> {
        let current = self.value(path);
        self.set_value(path, f(&current))
    }

    /// Replaces every value at once. No live validation runs.
    pub fn set_values(&self, values: FormValue) {
        let _span = tracing::debug_span!("set_values").entered();
        self.inner
            .errors
            .update(|errors| errors.clear_field_errors(&FieldPath::root()));
        self.inner.state.update(|state| state.set_values(values));
    }

    /// The value at `path`, or `Null`.
    #[must_use]
    pub fn value(&self, path: &FieldPath) -> FormValue {
        self.inner
            .state
            .with(|state| state.values.get(path).cloned().unwrap_or_default())
    }

    #[must_use]
    pub fn values(&self) -> FormValue {
        self.inner.state.with(|state| state.values.clone())
    }

    /// Marks `path` touched; validates and possibly auto-submits in blur modes.
    pub fn blur(&self, path: &FieldPath) {
        let _span = tracing::debug_span!("blur", path = %path).entered();

        self.inner.state.update(|state| state.set_touched(path, true));

        let mode = self.inner.mode.get();
        if !mode.validates_on_blur() {
            return;
        }
        self.validate_field(path);

        if mode.auto_submit && !self.matches_last_submission() {
            self.inner.coordinator.request_auto_submit(|| self.schedule_auto_submit());
        }
    }

    pub fn set_touched(&self, path: &FieldPath, touched: bool) {
        self.inner.state.update(|state| state.set_touched(path, touched));
    }

    fn array_op(&self, path: &FieldPath, op: impl FnOnce(&FormState) -> Result<FormState>) -> Result<()> {
        let next = self.inner.state.with(op)?;
        self.inner.errors.update(|errors| errors.clear_field_errors(path));
        self.inner.state.update(|_| next);
        self.drop_vanished_items(path);
        if self.inner.mode.get().validates_on_change() {
            self.schedule_field_validation(path);
        }
        Ok(())
    }

    /// Forgets debounces and live runs for item paths under `array` that no
    /// longer address a value.
    fn drop_vanished_items(&self, array: &FieldPath) {
        let values = self.values();
        let vanished = |p: &FieldPath| p.len() > array.len() && p.starts_with(array) && values.get(p).is_none();

        let stale: Vec<DebounceSlot<()>> = {
            let mut slots = self.inner.field_debounces.borrow_mut();
            let keys: Vec<FieldPath> = slots.keys().filter(|p| vanished(*p)).cloned().collect();
            keys.iter().filter_map(|key| slots.remove(key)).collect()
        };
        for mut slot in stale {
            slot.clear();
        }

        let mut live = self.inner.live.borrow_mut();
        live.running.retain(|p, (_, cancel)| {
            let keep = !vanished(p);
            if !keep {
                cancel.cancel();
            }
            keep
        });
    }

    /// Appends `item`, or the item schema's default when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::UnknownField`] if `item` is `None` and `path` is
    /// not an array field, or [`FormError::NotAnArray`] if a non-list value
    /// is stored at `path`.
    pub fn append(&self, path: &FieldPath, item: Option<FormValue>) -> Result<()> {
        let _span = tracing::debug_span!("append", path = %path).entered();
        let item = match item {
            Some(item) => item,
            None => self
                .inner
                .schema
                .item_schema_at(path)
                .map(|schema| schema.default_item())
                .ok_or_else(|| FormError::UnknownField(path.to_string()))?,
        };
        self.array_op(path, |state| state.append_array_item(path, item))
    }

    /// Removes the item at `index`. Out-of-range indices are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::NotAnArray`] if a non-list value is stored at `path`.
    pub fn remove(&self, path: &FieldPath, index: usize) -> Result<()> {
        let _span = tracing::debug_span!("remove", path = %path, index).entered();
        self.array_op(path, |state| state.remove_array_item(path, index))
    }

    /// Exchanges the items at `i` and `j`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidIndex`] if either index is out of range.
    pub fn swap(&self, path: &FieldPath, i: usize, j: usize) -> Result<()> {
        let _span = tracing::debug_span!("swap", path = %path, i, j).entered();
        self.array_op(path, |state| state.swap_array_items(path, i, j))
    }

    /// Moves the item at `from` to index `to`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidIndex`] if either index is out of range.
    pub fn move_item(&self, path: &FieldPath, from: usize, to: usize) -> Result<()> {
        let _span = tracing::debug_span!("move_item", path = %path, from, to).entered();
        self.array_op(path, |state| state.move_array_item(path, from, to))
    }

    /// Back to the initial values: nothing touched, no errors.
    ///
    /// `submit_count` and `last_submitted` are kept.
    pub fn reset(&self) {
        let _span = tracing::debug_span!("reset").entered();
        self.cancel_live_work();
        self.inner.errors.update(|_| ErrorStore::new());
        self.inner.state.update(FormState::reset);
    }

    /// Restores the last successfully submitted values. No-op before the
    /// first successful submission.
    pub fn revert_to_last_submit(&self) {
        let _span = tracing::debug_span!("revert_to_last_submit").entered();
        if self.inner.state.with(|state| state.last_submitted.is_none()) {
            return;
        }
        self.inner
            .errors
            .update(|errors| errors.clear_field_errors(&FieldPath::root()));
        self.inner.state.update(FormState::revert_to_last_submit);
    }

    fn schedule_field_validation(&self, path: &FieldPath) {
        let delay = self.inner.mode.get().debounce_ms;
        let weak = self.downgrade();
        let target = path.clone();
        let debounced = {
            let mut slots = self.inner.field_debounces.borrow_mut();
            slots.entry(path.clone()).or_default().get(&self.inner.runtime, delay, move |()| {
                if let Some(form) = Self::upgrade(&weak) {
                    form.validate_field(&target);
                }
            })
        };
        debounced.call(());
    }

    /// Runs live validation for the field at `path` now.
    ///
    /// A run supersedes any earlier run for the same path: the earlier run's
    /// token is cancelled and its result discarded.
    pub fn validate_field(&self, path: &FieldPath) {
        let Some(validator) = self.inner.schema.validator_at(path) else {
            tracing::debug!(path = %path, "no validator at path");
            return;
        };
        let value = self.value(path);

        let (generation, cancel) = {
            let mut live = self.inner.live.borrow_mut();
            live.next_generation += 1;
            let generation = live.next_generation;
            let cancel = CancelToken::new();
            if let Some((_, previous)) = live.running.insert(path.clone(), (generation, cancel.clone())) {
                previous.cancel();
            }
            (generation, cancel)
        };
        tracing::debug!(path = %path, generation, "live validation started");

        self.inner
            .errors
            .update(|errors| errors.with_status(path, FieldValidation::Validating { generation }));

        let decode = guarded_decode(validator.as_ref(), &value, &cancel);
        let form = self.clone();
        let path = path.clone();
        self.inner.runtime.spawn(
            async move {
                let result = decode.await;
                form.finish_validation(&path, generation, &cancel, result);
            }
            .boxed_local(),
        );
    }

    fn finish_validation(
        &self,
        path: &FieldPath,
        generation: u64,
        cancel: &CancelToken,
        result: std::result::Result<DecodeResult, String>,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        {
            let mut live = self.inner.live.borrow_mut();
            let latest = live.running.get(path).map(|(latest, _)| *latest);
            if latest != Some(generation) {
                tracing::debug!(path = %path, generation, "stale validation result dropped");
                return;
            }
            live.running.remove(path);
        }

        let status = match result {
            Ok(Ok(_)) => FieldValidation::Valid,
            Ok(Err(issue)) => {
                FieldValidation::Invalid(extract_first_error(&issue).unwrap_or_else(|| "Invalid value".to_string()))
            }
            Err(message) => {
                tracing::warn!(path = %path, error = %message, "validator defect");
                FieldValidation::Defect(message)
            }
        };
        tracing::debug!(path = %path, generation, ?status, "live validation finished");
        self.inner.errors.update(|errors| errors.with_status(path, status));
    }

    fn cancel_live_work(&self) {
        let slots = std::mem::take(&mut *self.inner.field_debounces.borrow_mut());
        for (_, mut slot) in slots {
            slot.clear();
        }
        let mut live = self.inner.live.borrow_mut();
        for (_, (_, cancel)) in std::mem::take(&mut live.running) {
            cancel.cancel();
        }
    }

    /// Submits the form.
    ///
    /// The attempt starts when this is called, not when the future is first
    /// polled. While another attempt is in flight the request is ignored and
    /// resolves to [`SubmitOutcome::Busy`]. A pending debounced auto-submit is
    /// dropped, since this attempt already carries the current values.
    ///
    /// Dropping the returned future before it resolves abandons the attempt:
    /// its cancel token fires, the phase returns to `Idle` and nothing is
    /// recorded.
    pub fn submit(&self, args: Args) -> LocalBoxFuture<'static, SubmitOutcome<A, E>> {
        match self.start_submit(args) {
            Some(attempt) => {
                self.inner.auto_submit.borrow_mut().clear();
                attempt
            }
            None => future::ready(SubmitOutcome::Busy).boxed_local(),
        }
    }

    fn start_submit(&self, args: Args) -> Option<LocalBoxFuture<'static, SubmitOutcome<A, E>>> {
        let _span = tracing::debug_span!("submit").entered();

        if !self.inner.coordinator.begin() {
            return None;
        }

        let keys: Vec<String> = self.inner.schema.fields().iter().map(|f| f.key().to_string()).collect();
        self.inner
            .state
            .update(|state| state.begin_submit(keys.iter().map(String::as_str)));

        let cancel = CancelToken::new();
        *self.inner.attempt.borrow_mut() = Some(cancel.clone());
        let guard = AttemptGuard {
            coordinator: self.inner.coordinator.clone(),
            cancel,
            settled: false,
        };

        let encoded = self.values();
        let form = self.clone();
        Some(async move { form.run_submission(args, encoded, guard).await }.boxed_local())
    }

    async fn run_submission(self, args: Args, encoded: FormValue, mut guard: AttemptGuard) -> SubmitOutcome<A, E> {
        let cancel = guard.cancel.clone();
        let outcome = self.decode_and_submit(args, encoded, &cancel).await;
        guard.settled = true;
        outcome
    }

    async fn decode_and_submit(&self, args: Args, encoded: FormValue, cancel: &CancelToken) -> SubmitOutcome<A, E> {
        let decoded = guarded_decode(self.inner.schema.as_ref(), &encoded, cancel).await;
        if cancel.is_cancelled() {
            tracing::debug!("submission cancelled while decoding");
            return SubmitOutcome::Cancelled;
        }
        let decoded = match decoded {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(issue)) => {
                let routed = route_errors_with_source(&issue);
                tracing::debug!(errors = routed.len(), "submit decode failed");
                self.inner.errors.update(|errors| errors.with_decode_result(&routed));
                self.inner.coordinator.transition(SubmissionPhase::DecodeFailed);
                return SubmitOutcome::DecodeFailed(routed);
            }
            Err(message) => {
                tracing::warn!(error = %message, "validator defect during submit");
                self.inner.coordinator.transition(SubmissionPhase::SubmitFailed);
                return SubmitOutcome::Defect(message);
            }
        };

        self.inner
            .errors
            .update(|errors| errors.with_decode_result(&ErrorMap::new()));
        self.inner.coordinator.transition(SubmissionPhase::Submitting);

        let submit_fn = Rc::clone(&self.inner.submit_fn);
        let input = decoded.clone();
        let token = cancel.clone();
        let call = panic::catch_unwind(AssertUnwindSafe(move || submit_fn(args, input, token)));
        let result = match call {
            Ok(pending) => AssertUnwindSafe(pending)
                .catch_unwind()
                .await
                .map_err(|payload| panic_message(payload.as_ref())),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        if cancel.is_cancelled() {
            tracing::debug!("submission cancelled while submitting, result discarded");
            return SubmitOutcome::Cancelled;
        }

        let outcome = match result {
            Ok(Ok(value)) => {
                let last = LastSubmission {
                    encoded,
                    decoded,
                    submitted_at: self.inner.runtime.now(),
                };
                self.inner.state.update(|state| state.complete_submit(Some(last)));
                SubmitOutcome::Success(value)
            }
            Ok(Err(err)) => {
                self.inner.state.update(|state| state.complete_submit(None));
                SubmitOutcome::Failed(err)
            }
            Err(message) => {
                tracing::warn!(error = %message, "submit operation defect");
                self.inner.state.update(|state| state.complete_submit(None));
                SubmitOutcome::Defect(message)
            }
        };

        let phase = outcome.phase().unwrap_or(SubmissionPhase::Idle);
        tracing::debug!(%phase, "submission settled");
        self.inner.coordinator.transition(phase);
        outcome
    }

    /// Everything a component needs to render the field at `path`.
    #[must_use]
    pub fn field(&self, path: &FieldPath) -> FieldView {
        let trigger = self.inner.mode.get().trigger;
        self.inner.state.with(|state| {
            let is_touched = state.is_touched(path);
            let is_dirty = state.is_path_dirty(path);
            let (error, is_validating) = self.inner.errors.with(|errors| {
                let error = errors
                    .visible_error(path)
                    .filter(|_| should_show_error(trigger, is_dirty, is_touched, state.submit_attempted));
                (error, errors.is_validating(path))
            });
            FieldView {
                path: path.clone(),
                value: state.values.get(path).cloned().unwrap_or_default(),
                error,
                is_touched,
                is_validating,
                is_dirty,
            }
        })
    }

    /// The static handle of the top-level array field `key`.
    #[must_use]
    pub fn array(&self, key: &str) -> Option<ArrayFieldHandle> {
        self.inner.arrays.get(key).cloned()
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        self.inner.state.get()
    }

    /// Routed errors from the last full decode.
    #[must_use]
    pub fn errors(&self) -> ErrorMap {
        self.inner.errors.with(ErrorStore::routed_errors)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.state.with(FormState::is_dirty)
    }

    #[must_use]
    pub fn has_changed_since_submit(&self) -> bool {
        self.inner.state.with(FormState::has_changed_since_submit)
    }

    #[must_use]
    pub fn submit_count(&self) -> u32 {
        self.inner.state.with(|state| state.submit_count)
    }

    #[must_use]
    pub fn last_submitted(&self) -> Option<LastSubmission> {
        self.inner.state.with(|state| state.last_submitted.clone())
    }

    #[must_use]
    pub fn phase(&self) -> SubmissionPhase {
        self.inner.coordinator.phase()
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.inner.coordinator.is_in_flight()
    }

    /// Subscribes to every state change.
    pub fn subscribe(&self, listener: impl Fn(&FormState) + 'static) -> Subscription {
        self.inner.state.subscribe(Box::new(listener))
    }

    /// Subscribes to error and live validation changes.
    pub fn subscribe_errors(&self, listener: impl Fn(&ErrorStore) + 'static) -> Subscription {
        self.inner.errors.subscribe(Box::new(listener))
    }

    /// Subscribes to submission phase changes.
    pub fn subscribe_phase(&self, listener: impl Fn(SubmissionPhase) + 'static) -> Subscription {
        self.inner.coordinator.subscribe(listener)
    }

    /// Takes a lease keeping state alive across [`unmount`](Self::unmount).
    pub fn keep_alive(&self) -> KeepAlive {
        self.inner.leases.set(self.inner.leases.get() + 1);
        KeepAlive {
            leases: Rc::clone(&self.inner.leases),
        }
    }

    /// Tears the form down when no [`KeepAlive`] lease is held.
    ///
    /// Pending debounces, in-flight live validations and any in-flight
    /// submission are cancelled, errors are dropped and state returns to the
    /// encoded defaults. A cancelled submission resolves to
    /// [`SubmitOutcome::Cancelled`] and records nothing. The form can be
    /// initialized again afterwards. Returns `false` if a lease kept it alive.
    pub fn unmount(&self) -> bool {
        let _span = tracing::debug_span!("unmount", leases = self.inner.leases.get()).entered();
        if self.inner.leases.get() > 0 {
            tracing::debug!("form kept alive");
            return false;
        }

        self.cancel_live_work();
        self.inner.auto_submit.borrow_mut().clear();
        if let Some(attempt) = self.inner.attempt.borrow_mut().take() {
            attempt.cancel();
        }
        self.inner.coordinator.clear();
        self.inner.errors.update(|_| ErrorStore::new());
        self.replace_state(FormState::new(self.inner.defaults.clone()));
        self.inner.initialized.set(false);
        true
    }
}

impl<A, E, Args> std::fmt::Debug for Form<A, E, Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Form")
            .field("mode", &self.inner.mode.get())
            .field("coordinator", &self.inner.coordinator)
            .field("initialized", &self.inner.initialized.get())
            .finish_non_exhaustive()
    }
}
