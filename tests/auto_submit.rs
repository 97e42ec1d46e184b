use formstate::app::mode::{OnBlurOptions, OnChangeOptions};
use formstate::schema::validator::string;
use formstate::schema::{make_field, FormBuilder, ValidatorExt};
use formstate::{
    CancelToken, FieldPath, Form, FormConfig, FormValue, ManualRuntime, Runtime, SubmissionPhase, SubmitOutcome,
    ValidationModeConfig,
};
use futures::channel::oneshot;
use futures_util::future::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

type Calls = Rc<RefCell<Vec<String>>>;
type Gates = Rc<RefCell<VecDeque<oneshot::Receiver<()>>>>;

struct Harness {
    runtime: Rc<ManualRuntime>,
    form: Form<(), String>,
    calls: Calls,
    gates: Gates,
    tokens: Rc<RefCell<Vec<CancelToken>>>,
}

impl Harness {
    fn new(mode: ValidationModeConfig) -> Self {
        let runtime = Rc::new(ManualRuntime::new());
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let gates: Gates = Rc::new(RefCell::new(VecDeque::new()));
        let builder = FormBuilder::empty().add_field(make_field("query", string().non_empty("Type something")));
        let config = FormConfig {
            mode,
            ..FormConfig::default()
        };
        let tokens = Rc::new(RefCell::new(Vec::new()));
        let (log, queue, seen) = (Rc::clone(&calls), Rc::clone(&gates), Rc::clone(&tokens));
        let form = Form::build(&builder, &config, runtime.clone(), move |(), decoded, cancel| {
            seen.borrow_mut().push(cancel);
            log.borrow_mut()
                .push(decoded["query"].as_str().unwrap_or_default().to_string());
            let gate = queue.borrow_mut().pop_front();
            async move {
                if let Some(gate) = gate {
                    gate.await.map_err(|_| "cancelled".to_string())?;
                }
                Ok::<(), String>(())
            }
            .boxed_local()
        });
        Self {
            runtime,
            form,
            calls,
            gates,
            tokens,
        }
    }

    fn on_change(debounce: u64) -> Self {
        Self::new(ValidationModeConfig::OnChange {
            on_change: OnChangeOptions {
                debounce,
                auto_submit: true,
            },
        })
    }

    /// Makes the next submit wait until the returned sender fires.
    fn hold_next_submit(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().push_back(rx);
        tx
    }

    fn type_query(&self, text: &str) {
        self.form.set_value(&query(), text).unwrap();
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

fn query() -> FieldPath {
    FieldPath::parse("query").unwrap()
}

#[test]
fn debounced_change_submits_once() {
    let h = Harness::on_change(300);
    h.type_query("r");
    h.runtime.advance(100);
    h.type_query("ru");
    h.runtime.advance(100);
    h.type_query("rust");

    h.runtime.advance(299);
    assert!(h.calls().is_empty());
    h.runtime.advance(1);
    assert_eq!(h.calls(), vec!["rust"]);
    assert_eq!(h.form.submit_count(), 1);

    // Recording the submission must not look like an edit.
    h.runtime.advance(10_000);
    assert_eq!(h.calls(), vec!["rust"]);
    assert_eq!(h.runtime.pending_timers(), 0);
    assert_eq!(h.form.phase(), SubmissionPhase::Success);
}

#[test]
fn change_during_flight_submits_exactly_once_more() {
    let h = Harness::on_change(300);
    let release = h.hold_next_submit();

    h.type_query("a");
    h.runtime.advance(300);
    assert_eq!(h.calls(), vec!["a"]);
    assert!(h.form.is_submitting());

    h.type_query("ab");
    h.type_query("abc");
    h.runtime.advance(1_000);
    assert_eq!(h.calls(), vec!["a"]);

    release.send(()).unwrap();
    h.runtime.run_until_stalled();
    assert_eq!(h.form.submit_count(), 1);
    assert!(!h.form.is_submitting());

    h.runtime.advance(300);
    assert_eq!(h.calls(), vec!["a", "abc"]);
    assert_eq!(h.form.submit_count(), 2);

    h.runtime.advance(10_000);
    assert_eq!(h.calls().len(), 2);
}

#[test]
fn manual_submit_during_auto_submit_is_busy() {
    let h = Harness::on_change(0);
    let release = h.hold_next_submit();

    h.type_query("x");
    h.runtime.advance(0);
    assert!(h.form.is_submitting());

    let outcome = futures_executor::block_on(h.form.submit(()));
    assert_eq!(outcome, SubmitOutcome::Busy);

    release.send(()).unwrap();
    h.runtime.run_until_stalled();
    assert_eq!(h.calls(), vec!["x"]);
    assert_eq!(h.form.submit_count(), 1);
}

#[test]
fn invalid_values_do_not_reach_the_submit_operation() {
    let h = Harness::on_change(50);
    h.type_query("x");
    h.type_query("");
    h.runtime.advance(50);
    assert!(h.calls().is_empty());
    assert_eq!(h.form.phase(), SubmissionPhase::DecodeFailed);
    assert_eq!(h.form.field(&query()).error.as_deref(), Some("Type something"));

    h.type_query("y");
    h.runtime.advance(50);
    assert_eq!(h.calls(), vec!["y"]);
}

#[test]
fn blur_auto_submit_skips_unchanged_values() {
    let h = Harness::new(ValidationModeConfig::OnBlur {
        on_blur: OnBlurOptions { auto_submit: true },
    });

    h.type_query("hello");
    assert!(h.calls().is_empty());
    h.form.blur(&query());
    h.runtime.run_until_stalled();
    assert_eq!(h.calls(), vec!["hello"]);

    h.form.blur(&query());
    h.runtime.run_until_stalled();
    assert_eq!(h.calls(), vec!["hello"]);

    h.type_query("hello there");
    h.form.blur(&query());
    h.runtime.run_until_stalled();
    assert_eq!(h.calls(), vec!["hello", "hello there"]);
}

#[test]
fn unmount_drops_scheduled_auto_submit() {
    let h = Harness::on_change(300);
    h.type_query("draft");
    assert!(h.runtime.pending_timers() > 0);

    assert!(h.form.unmount());
    h.runtime.advance(1_000);
    assert!(h.calls().is_empty());
    assert_eq!(h.form.submit_count(), 0);
}

#[test]
fn submissions_are_stamped_by_the_runtime_clock() {
    let h = Harness::on_change(300);
    let start = h.runtime.now();
    h.type_query("t");
    h.runtime.advance(300);
    let last = h.form.last_submitted().unwrap();
    assert_eq!((last.submitted_at - start).num_milliseconds(), 300);
}

#[test]
fn kept_alive_form_keeps_auto_submitting() {
    let h = Harness::on_change(10);
    let fired = Rc::new(Cell::new(0));
    let counter = Rc::clone(&fired);
    let _sub = h.form.subscribe_phase(move |phase| {
        if phase == SubmissionPhase::Success {
            counter.set(counter.get() + 1);
        }
    });

    let lease = h.form.keep_alive();
    assert!(!h.form.unmount());
    h.type_query("still here");
    h.runtime.advance(10);
    assert_eq!(fired.get(), 1);
    drop(lease);
}

#[test]
fn manual_submit_inside_debounce_window_is_not_repeated() {
    let h = Harness::on_change(300);
    h.type_query("hello");
    h.runtime.advance(100);

    assert!(futures_executor::block_on(h.form.submit(())).is_success());
    h.runtime.advance(500);
    assert_eq!(h.calls(), vec!["hello"]);
    assert_eq!(h.form.submit_count(), 1);
    assert_eq!(h.runtime.pending_timers(), 0);

    h.type_query("hello again");
    h.runtime.advance(300);
    assert_eq!(h.calls(), vec!["hello", "hello again"]);
}

#[test]
fn unmount_discards_in_flight_submission() {
    let h = Harness::on_change(0);
    let release = h.hold_next_submit();
    h.type_query("before-unmount");
    h.runtime.advance(0);
    assert!(h.form.is_submitting());

    assert!(h.form.unmount());
    assert_eq!(h.form.phase(), SubmissionPhase::Idle);
    assert!(h.tokens.borrow()[0].is_cancelled());

    release.send(()).unwrap();
    h.runtime.run_until_stalled();
    assert_eq!(h.form.submit_count(), 0);
    assert!(h.form.last_submitted().is_none());
    assert_eq!(h.form.phase(), SubmissionPhase::Idle);
    assert_eq!(h.form.value(&query()), FormValue::from(""));

    h.type_query("after");
    h.runtime.advance(0);
    assert_eq!(h.calls(), vec!["before-unmount", "after"]);
    assert_eq!(h.form.submit_count(), 1);
    assert!(!h.tokens.borrow()[1].is_cancelled());
}

#[test]
fn dropped_manual_submit_does_not_wedge_auto_submit() {
    let h = Harness::new(ValidationModeConfig::OnBlur {
        on_blur: OnBlurOptions { auto_submit: true },
    });
    h.type_query("draft");
    drop(h.form.submit(()));
    assert!(!h.form.is_submitting());

    h.form.blur(&query());
    h.runtime.run_until_stalled();
    assert_eq!(h.calls(), vec!["draft"]);
    assert_eq!(h.form.submit_count(), 1);
}
