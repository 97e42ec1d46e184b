//! Form state and its copy-on-write operations.
//!
//! [`FormState`] is the single source of truth for one form instance: the
//! current and initial encoded values, which fields were touched, and the
//! submission history. Every operation takes `&self` and returns a new state;
//! value trees share every subtree the operation did not touch.
//!
//! Dirtiness is never stored. A path is dirty when its value differs
//! structurally from the same path in the initial values, which makes a
//! container dirty exactly when one of its descendants is.
//!
//! # Example
//!
//! ```rust
//! use formstate::app::state::FormState;
//! use formstate::FormValue;
//! use serde_json::json;
//!
//! let state = FormState::new(FormValue::from(json!({ "items": ["a", "b", "c"] })));
//! let items = "items".parse()?;
//!
//! let state = state.remove_array_item(&items, 1)?;
//! assert_eq!(state.values.get(&items).unwrap().to_json(), json!(["a", "c"]));
//! assert!(state.is_dirty());
//! # Ok::<(), formstate::FormError>(())
//! ```

use crate::domain::error::{FormError, Result};
use crate::domain::path::FieldPath;
use crate::domain::value::FormValue;
use crate::schema::field::{create_touched_record, FieldKind};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Snapshot recorded by the last successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSubmission {
    /// Values as they were when decoding started.
    pub encoded: FormValue,

    /// What the validator produced from them.
    pub decoded: serde_json::Value,

    pub submitted_at: DateTime<Utc>,
}

impl LastSubmission {
    /// Deserializes the decoded snapshot into a host type.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::TypeMismatch`] if `T` does not match the decoded shape.
    pub fn decoded_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.decoded.clone())?)
    }
}

/// State of one form instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    /// Current encoded values.
    pub values: FormValue,

    /// Values at initialization; the baseline for dirtiness and `reset`.
    pub initial_values: FormValue,

    /// Paths the user has blurred. Touching a path touches its descendants.
    pub touched: im::OrdSet<FieldPath>,

    /// Completed submissions: successes, submit failures and defects.
    pub submit_count: u32,

    /// Set by the first submit request, even one that fails to decode.
    pub submit_attempted: bool,

    pub last_submitted: Option<LastSubmission>,
}

impl FormState {
    /// A fresh state whose initial values are `values`.
    #[must_use]
    pub fn new(values: FormValue) -> Self {
        Self {
            initial_values: values.clone(),
            values,
            touched: im::OrdSet::new(),
            submit_count: 0,
            submit_attempted: false,
            last_submitted: None,
        }
    }

    /// Sets the value at `path`. Touched flags are left alone.
    ///
    /// Setting a value equal to the current one returns an identical state,
    /// so the values tree keeps its identity.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidPath`] if `path` cannot address the tree.
    pub fn set_value(&self, path: &FieldPath, value: FormValue) -> Result<Self> {
        if self.values.get(path) == Some(&value) {
            return Ok(self.clone());
        }
        Ok(Self {
            values: self.values.set(path, value)?,
            ..self.clone()
        })
    }

    /// Replaces the whole values tree.
    #[must_use]
    pub fn set_values(&self, values: FormValue) -> Self {
        if self.values == values {
            return self.clone();
        }
        Self {
            values,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn set_touched(&self, path: &FieldPath, touched: bool) -> Self {
        let mut next = self.clone();
        if touched {
            next.touched.insert(path.clone());
        } else {
            next.touched.remove(path);
        }
        next
    }

    /// Whether `path`, or one of its ancestors, was touched.
    #[must_use]
    pub fn is_touched(&self, path: &FieldPath) -> bool {
        path.prefixes().any(|prefix| self.touched.contains(&prefix))
    }

    /// Touched flags shaped like the top level of the form.
    #[must_use]
    pub fn touched_record(&self, fields: &[FieldKind]) -> FormValue {
        let mut record = create_touched_record(fields, false);
        for field in fields {
            let path = FieldPath::root().key(field.key());
            if self.is_touched(&path) {
                record = record.set(&path, FormValue::Bool(true)).unwrap_or(record);
            }
        }
        record
    }

    fn array_at(&self, path: &FieldPath) -> Result<im::Vector<FormValue>> {
        match self.values.get(path) {
            Some(FormValue::List(items)) => Ok(items.clone()),
            None | Some(FormValue::Null) => Ok(im::Vector::new()),
            Some(_) => Err(FormError::NotAnArray(path.to_string())),
        }
    }

    fn with_array(&self, path: &FieldPath, items: im::Vector<FormValue>) -> Result<Self> {
        Ok(Self {
            values: self.values.set(path, FormValue::List(items))?,
            ..self.clone()
        })
    }

    fn check_index(path: &FieldPath, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(FormError::InvalidIndex {
                path: path.to_string(),
                index,
                len,
            })
        }
    }

    /// Appends `item` to the array at `path`. A missing array is created.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::NotAnArray`] if a non-list value is stored there.
    pub fn append_array_item(&self, path: &FieldPath, item: FormValue) -> Result<Self> {
        let mut items = self.array_at(path)?;
        items.push_back(item);
        self.with_array(path, items)
    }

    /// Removes the item at `index`; later items shift down by one.
    ///
    /// An out-of-range index leaves the state unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::NotAnArray`] if a non-list value is stored there.
    pub fn remove_array_item(&self, path: &FieldPath, index: usize) -> Result<Self> {
        let mut items = self.array_at(path)?;
        if index >= items.len() {
            tracing::debug!(path = %path, index, len = items.len(), "remove out of range, ignored");
            return Ok(self.clone());
        }
        items.remove(index);
        self.with_array(path, items)
    }

    /// Exchanges the items at `i` and `j`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidIndex`] if either index is out of range.
    pub fn swap_array_items(&self, path: &FieldPath, i: usize, j: usize) -> Result<Self> {
        let mut items = self.array_at(path)?;
        Self::check_index(path, i, items.len())?;
        Self::check_index(path, j, items.len())?;
        items.swap(i, j);
        self.with_array(path, items)
    }

    /// Moves the item at `from` so that it ends up at index `to`.
    ///
    /// The item is removed first and reinserted into the shortened list; the
    /// other items keep their relative order.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidIndex`] if either index is out of range.
    pub fn move_array_item(&self, path: &FieldPath, from: usize, to: usize) -> Result<Self> {
        let mut items = self.array_at(path)?;
        Self::check_index(path, from, items.len())?;
        Self::check_index(path, to, items.len())?;
        let item = items.remove(from);
        items.insert(to, item);
        self.with_array(path, items)
    }

    /// Back to the initial values with nothing touched.
    ///
    /// Submission history is kept.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self {
            values: self.initial_values.clone(),
            touched: im::OrdSet::new(),
            ..self.clone()
        }
    }

    /// Restores the values of the last successful submission, if any.
    #[must_use]
    pub fn revert_to_last_submit(&self) -> Self {
        match &self.last_submitted {
            Some(last) => self.set_values(last.encoded.clone()),
            None => self.clone(),
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.values != self.initial_values
    }

    /// Whether the value at `path` differs from its initial value.
    #[must_use]
    pub fn is_path_dirty(&self, path: &FieldPath) -> bool {
        self.values.get(path) != self.initial_values.get(path)
    }

    /// The minimal set of paths at which values and initial values differ.
    #[must_use]
    pub fn dirty_paths(&self) -> BTreeSet<FieldPath> {
        self.values.diff_paths(&self.initial_values)
    }

    /// Whether values differ from the last submitted snapshot.
    ///
    /// `false` when nothing was submitted yet.
    #[must_use]
    pub fn has_changed_since_submit(&self) -> bool {
        self.last_submitted
            .as_ref()
            .is_some_and(|last| last.encoded != self.values)
    }

    /// Marks a submit request and touches every top-level field.
    #[must_use]
    pub fn begin_submit<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut next = Self {
            submit_attempted: true,
            ..self.clone()
        };
        for key in keys {
            next.touched.insert(FieldPath::root().key(key));
        }
        next
    }

    /// Counts a completed submission and records its snapshot on success.
    #[must_use]
    pub fn complete_submit(&self, success: Option<LastSubmission>) -> Self {
        Self {
            submit_count: self.submit_count + 1,
            last_submitted: success.or_else(|| self.last_submitted.clone()),
            ..self.clone()
        }
    }
}

impl Default for FormState {
    fn default() -> Self {
        Self::new(FormValue::record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn path(p: &str) -> FieldPath {
        p.parse().unwrap()
    }

    fn abc() -> FormState {
        FormState::new(FormValue::from(json!({ "items": ["a", "b", "c"] })))
    }

    fn items(state: &FormState) -> serde_json::Value {
        state.values.get(&path("items")).unwrap().to_json()
    }

    #[test]
    fn array_algebra() {
        let state = abc();
        assert_eq!(items(&state.remove_array_item(&path("items"), 1).unwrap()), json!(["a", "c"]));
        assert_eq!(items(&state.swap_array_items(&path("items"), 0, 2).unwrap()), json!(["c", "b", "a"]));
        assert_eq!(items(&state.move_array_item(&path("items"), 0, 2).unwrap()), json!(["b", "c", "a"]));
        assert_eq!(items(&state.move_array_item(&path("items"), 2, 0).unwrap()), json!(["c", "a", "b"]));
        assert_eq!(
            items(&state.append_array_item(&path("items"), "d".into()).unwrap()),
            json!(["a", "b", "c", "d"])
        );
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let state = abc();
        assert_eq!(state.remove_array_item(&path("items"), 7).unwrap(), state);
    }

    #[test]
    fn swap_and_move_reject_bad_indices() {
        let state = abc();
        assert!(matches!(
            state.swap_array_items(&path("items"), 0, 3),
            Err(FormError::InvalidIndex { index: 3, len: 3, .. })
        ));
        assert!(matches!(
            state.move_array_item(&path("items"), 5, 0),
            Err(FormError::InvalidIndex { index: 5, .. })
        ));
    }

    #[test]
    fn array_ops_on_scalar_fail() {
        let state = FormState::new(FormValue::from(json!({ "name": "x" })));
        assert!(matches!(
            state.append_array_item(&path("name"), "y".into()),
            Err(FormError::NotAnArray(_))
        ));
    }

    #[test]
    fn equal_set_keeps_identity() {
        let state = abc();
        let next = state.set_value(&path("items[0]"), "a".into()).unwrap();
        assert!(FormValue::same_ref(&state.values, &next.values));
        let changed = state.set_value(&path("items[0]"), "z".into()).unwrap();
        assert!(!FormValue::same_ref(&state.values, &changed.values));
    }

    #[test]
    fn dirty_tracks_initial_values() {
        let state = abc();
        assert!(!state.is_dirty());
        let edited = state.set_value(&path("items[1]"), "x".into()).unwrap();
        assert!(edited.is_dirty());
        assert!(edited.is_path_dirty(&path("items")));
        assert!(edited.is_path_dirty(&path("items[1]")));
        assert!(!edited.is_path_dirty(&path("items[0]")));
        assert_eq!(edited.dirty_paths().into_iter().collect::<Vec<_>>(), vec![path("items[1]")]);

        let restored = edited.set_value(&path("items[1]"), "b".into()).unwrap();
        assert!(!restored.is_dirty());
    }

    #[test]
    fn reset_keeps_history() {
        let state = abc()
            .set_value(&path("items[0]"), "z".into())
            .unwrap()
            .set_touched(&path("items"), true)
            .complete_submit(None);
        let reset = state.reset();
        assert_eq!(reset.values, reset.initial_values);
        assert!(reset.touched.is_empty());
        assert_eq!(reset.submit_count, 1);
    }

    #[test]
    fn revert_restores_last_submission() {
        let submitted = abc().set_value(&path("items[0]"), "v".into()).unwrap();
        let snapshot = LastSubmission {
            encoded: submitted.values.clone(),
            decoded: json!({ "items": ["v", "b", "c"] }),
            submitted_at: Utc::now(),
        };
        let state = submitted
            .complete_submit(Some(snapshot.clone()))
            .set_value(&path("items[1]"), "edited".into())
            .unwrap();
        assert!(state.has_changed_since_submit());

        let reverted = state.revert_to_last_submit();
        assert_eq!(reverted.values, snapshot.encoded);
        assert_eq!(reverted.submit_count, 1);
        assert_eq!(reverted.last_submitted, Some(snapshot));
        assert!(!reverted.has_changed_since_submit());
    }

    #[test]
    fn revert_without_submission_is_noop() {
        let state = abc().set_value(&path("items[0]"), "z".into()).unwrap();
        assert_eq!(state.revert_to_last_submit(), state);
        assert!(!state.has_changed_since_submit());
    }

    #[test]
    fn touched_covers_descendants() {
        let state = abc().begin_submit(["items"]);
        assert!(state.submit_attempted);
        assert!(state.is_touched(&path("items[2]")));
        assert!(!state.is_touched(&path("other")));
    }

    #[test]
    fn decoded_as_deserializes() {
        #[derive(Deserialize)]
        struct Items {
            items: Vec<String>,
        }
        let last = LastSubmission {
            encoded: FormValue::Null,
            decoded: json!({ "items": ["a"] }),
            submitted_at: Utc::now(),
        };
        assert_eq!(last.decoded_as::<Items>().unwrap().items, vec!["a".to_string()]);
        assert!(matches!(last.decoded_as::<u32>(), Err(FormError::TypeMismatch(_))));
    }

    fn leaf() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(json!("")),
            "[a-c]{1,3}".prop_map(serde_json::Value::String),
            any::<bool>().prop_map(serde_json::Value::Bool),
        ]
    }

    proptest! {
        #[test]
        fn path_dirty_iff_values_differ(
            a in proptest::collection::vec(leaf(), 3),
            b in proptest::collection::vec(leaf(), 3),
            index in 0usize..3,
        ) {
            let initial = FormValue::from(json!({ "list": a.clone(), "name": a[0].clone() }));
            let state = FormState::new(initial)
                .set_value(&path(&format!("list[{index}]")), FormValue::from(b[index].clone()))
                .unwrap();

            let leaf_path = path(&format!("list[{index}]"));
            let differs = a[index] != b[index];
            prop_assert_eq!(state.is_path_dirty(&leaf_path), differs);
            prop_assert_eq!(state.is_path_dirty(&path("list")), differs);
            prop_assert_eq!(state.is_dirty(), differs);
            prop_assert!(!state.is_path_dirty(&path("name")));
            prop_assert_eq!(state.dirty_paths().contains(&leaf_path), differs);
        }
    }
}
