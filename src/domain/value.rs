//! Encoded value trees with structural sharing.
//!
//! [`FormValue`] is the raw, JSON-shaped representation a form holds before
//! decoding. Lists and records are persistent collections from the `im` crate,
//! so cloning a tree is O(1) and [`FormValue::set`] copies only the chain of
//! ancestors leading to the target; every sibling subtree stays shared with the
//! previous version.
//!
//! Conversions to and from `serde_json::Value` are lossless apart from record
//! key order, which is always sorted.

use crate::domain::error::{FormError, Result};
use crate::domain::path::{FieldPath, Segment};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// An encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(im::Vector<FormValue>),
    Record(im::OrdMap<String, FormValue>),
}

impl FormValue {
    /// An empty record.
    #[must_use]
    pub fn record() -> Self {
        Self::Record(im::OrdMap::new())
    }

    /// An empty list.
    #[must_use]
    pub fn list() -> Self {
        Self::List(im::Vector::new())
    }

    /// Builds a record from `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, FormValue)>) -> Self {
        Self::Record(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&im::Vector<FormValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&im::OrdMap<String, FormValue>> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in validation messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "array",
            Self::Record(_) => "object",
        }
    }

    /// Reference identity: true only when both values are the same container
    /// allocation. Scalars are never identical.
    #[must_use]
    pub fn same_ref(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Self::List(x), Self::List(y)) => x.ptr_eq(y),
            (Self::Record(x), Self::Record(y)) => x.ptr_eq(y),
            _ => false,
        }
    }

    /// Looks up the value at `path`.
    ///
    /// Walking through `Null`, a missing key, an out-of-range index, or a
    /// container of the wrong kind yields `None` rather than an error.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&FormValue> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (Segment::Key(key), Self::Record(fields)) => fields.get(key)?,
                (Segment::Index(index), Self::List(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns a new tree with `value` stored at `path`.
    ///
    /// Missing record keys are created along the way, and `Null` placeholders
    /// are promoted to the container the next segment needs. An index may
    /// address an existing element or the slot one past the end (append).
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidPath`] if an index lies beyond the end of a
    /// list, or if a segment would descend into a scalar.
    pub fn set(&self, path: &FieldPath, value: FormValue) -> Result<FormValue> {
        set_at(self, path.segments(), value).map_err(|reason| FormError::InvalidPath {
            path: path.to_string(),
            reason,
        })
    }

    /// Returns a new tree with `f` applied to the value at `path`.
    ///
    /// `f` receives `None` when nothing is stored there yet.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FormValue::set`].
    pub fn update(&self, path: &FieldPath, f: impl FnOnce(Option<&FormValue>) -> FormValue) -> Result<FormValue> {
        let next = f(self.get(path));
        self.set(path, next)
    }

    /// Collects the paths at which `self` and `other` differ.
    ///
    /// Recurses through matching containers. A path whose containers differ in
    /// kind, or lists that differ in length, are reported at the container
    /// itself; otherwise differing leaves are reported. Shared subtrees are
    /// skipped in O(1).
    #[must_use]
    pub fn diff_paths(&self, other: &FormValue) -> BTreeSet<FieldPath> {
        let mut out = BTreeSet::new();
        diff_into(self, other, &FieldPath::root(), &mut out);
        out
    }

    /// Converts to a `serde_json::Value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Record(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn set_at(current: &FormValue, segments: &[Segment], value: FormValue) -> std::result::Result<FormValue, String> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(value);
    };

    match head {
        Segment::Key(key) => {
            let mut fields = match current {
                FormValue::Record(fields) => fields.clone(),
                FormValue::Null => im::OrdMap::new(),
                other => return Err(format!("cannot set key '{key}' on {}", other.kind())),
            };
            let child = fields.get(key).cloned().unwrap_or(FormValue::Null);
            let next = set_at(&child, rest, value)?;
            fields.insert(key.clone(), next);
            Ok(FormValue::Record(fields))
        }
        Segment::Index(index) => {
            let mut items = match current {
                FormValue::List(items) => items.clone(),
                FormValue::Null => im::Vector::new(),
                other => return Err(format!("cannot set index {index} on {}", other.kind())),
            };
            let len = items.len();
            if *index > len {
                return Err(format!("index {index} is beyond the end of a list of length {len}"));
            }
            let child = items.get(*index).cloned().unwrap_or(FormValue::Null);
            let next = set_at(&child, rest, value)?;
            if *index == len {
                items.push_back(next);
            } else {
                items.set(*index, next);
            }
            Ok(FormValue::List(items))
        }
    }
}

fn diff_into(a: &FormValue, b: &FormValue, at: &FieldPath, out: &mut BTreeSet<FieldPath>) {
    match (a, b) {
        (FormValue::Record(x), FormValue::Record(y)) => {
            if x.ptr_eq(y) {
                return;
            }
            let keys: BTreeSet<&String> = x.keys().chain(y.keys()).collect();
            for key in keys {
                let left = x.get(key).unwrap_or(&FormValue::Null);
                let right = y.get(key).unwrap_or(&FormValue::Null);
                diff_into(left, right, &at.key(key.clone()), out);
            }
        }
        (FormValue::List(x), FormValue::List(y)) => {
            if x.ptr_eq(y) {
                return;
            }
            if x.len() != y.len() {
                out.insert(at.clone());
                return;
            }
            for (index, (left, right)) in x.iter().zip(y.iter()).enumerate() {
                diff_into(left, right, &at.index(index), out);
            }
        }
        _ => {
            if a != b {
                out.insert(at.clone());
            }
        }
    }
}

impl fmt::Display for FormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for FormValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(fields) => {
                Self::Record(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl Serialize for FormValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> FieldPath {
        p.parse().unwrap()
    }

    #[test]
    fn get_through_missing_returns_none() {
        let tree = FormValue::from(json!({ "a": null, "b": [1, 2] }));
        assert_eq!(tree.get(&path("a.x")), None);
        assert_eq!(tree.get(&path("b[5]")), None);
        assert_eq!(tree.get(&path("b.x")), None);
        assert_eq!(tree.get(&path("b[1]")), Some(&FormValue::from(2)));
        assert_eq!(tree.get(&FieldPath::root()), Some(&tree));
    }

    #[test]
    fn set_copies_only_ancestor_chain() {
        let tree = FormValue::from(json!({
            "left": { "deep": [1, 2, 3] },
            "right": { "name": "x" }
        }));
        let next = tree.set(&path("right.name"), "y".into()).unwrap();

        assert_eq!(next.get(&path("right.name")), Some(&FormValue::from("y")));
        assert_eq!(tree.get(&path("right.name")), Some(&FormValue::from("x")));
        // Untouched sibling subtree is the very same allocation.
        assert!(FormValue::same_ref(
            tree.get(&path("left")).unwrap(),
            next.get(&path("left")).unwrap()
        ));
        assert!(!FormValue::same_ref(&tree, &next));
    }

    #[test]
    fn set_creates_missing_keys_and_appends() {
        let tree = FormValue::record();
        let tree = tree.set(&path("a.b"), "v".into()).unwrap();
        let tree = tree.set(&path("list[0]"), 1.into()).unwrap();
        let tree = tree.set(&path("list[1]"), 2.into()).unwrap();
        assert_eq!(tree.to_json(), json!({ "a": { "b": "v" }, "list": [1, 2] }));
    }

    #[test]
    fn set_rejects_gaps_and_scalars() {
        let tree = FormValue::from(json!({ "list": [], "name": "x" }));
        assert!(tree.set(&path("list[3]"), 1.into()).is_err());
        assert!(tree.set(&path("name.inner"), 1.into()).is_err());
    }

    #[test]
    fn diff_reports_leaves_and_resized_lists() {
        let a = FormValue::from(json!({ "name": "a", "tags": ["x"], "items": [{ "q": 1 }] }));
        let b = FormValue::from(json!({ "name": "b", "tags": ["x", "y"], "items": [{ "q": 2 }] }));
        let diff: Vec<String> = a.diff_paths(&b).iter().map(ToString::to_string).collect();
        assert_eq!(diff, vec!["items[0].q", "name", "tags"]);
        assert!(a.diff_paths(&a.clone()).is_empty());
    }

    #[test]
    fn json_round_trip() {
        let raw = json!({ "n": 1.5, "s": "t", "b": true, "l": [null, { "k": [] }] });
        assert_eq!(FormValue::from(raw.clone()).to_json(), raw);
    }
}
