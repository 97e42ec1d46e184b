//! Read-only view types consumed by a rendering layer.
//!
//! View types are computed from form state on demand. They contain no
//! behavior beyond path arithmetic; every mutation goes through the
//! [`Form`](crate::app::form::Form) handle together with an explicit
//! [`FieldPath`].
//!
//! # Array handles
//!
//! An [`ArrayFieldHandle`] is built once, when the form is built, for every
//! array field. It exposes an [`ItemAccessor`] for whole items and a
//! [`Column`] per field of the item form. Nested arrays carry their own
//! handle on their column.
//!
//! ```rust
//! use formstate::schema::{make_array_field, make_field, FormBuilder};
//! use formstate::schema::validator::string;
//! use formstate::view::ArrayFieldHandle;
//! use formstate::FieldPath;
//!
//! let item = FormBuilder::empty().add_field(make_field("name", string()));
//! let handle = ArrayFieldHandle::from_def(&FieldPath::root(), &make_array_field("people", item));
//!
//! let name = handle.column("name").unwrap();
//! assert_eq!(name.path(&handle.path, 2).to_string(), "people[2].name");
//! assert_eq!(handle.item.path(&handle.path, 0).to_string(), "people[0]");
//! ```

use crate::domain::path::FieldPath;
use crate::domain::value::FormValue;
use crate::schema::field::{ArrayFieldDef, FieldKind, ItemSchema};
use std::collections::BTreeMap;

/// Everything a field component renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub path: FieldPath,

    /// Current encoded value; `Null` when nothing is stored there.
    pub value: FormValue,

    /// The error to display, already filtered by the display policy.
    pub error: Option<String>,

    pub is_touched: bool,

    /// Whether a live validation run for this field is in flight.
    pub is_validating: bool,

    pub is_dirty: bool,
}

/// Resolves whole-item paths of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemAccessor;

impl ItemAccessor {
    /// Path of item `index` of the array at `array`.
    #[must_use]
    pub fn path(&self, array: &FieldPath, index: usize) -> FieldPath {
        array.index(index)
    }
}

/// One field of an array's item form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub key: String,

    /// Set when the column is itself an array field.
    pub nested: Option<ArrayFieldHandle>,
}

impl Column {
    /// Path of this column inside item `index` of the array at `array`.
    #[must_use]
    pub fn path(&self, array: &FieldPath, index: usize) -> FieldPath {
        array.index(index).key(self.key.clone())
    }
}

/// Static accessors for an array field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayFieldHandle {
    pub key: String,

    /// Path of the array relative to the form (or enclosing item) root.
    pub path: FieldPath,

    pub item: ItemAccessor,

    /// One column per item field; empty for plain-value items.
    pub columns: BTreeMap<String, Column>,
}

impl ArrayFieldHandle {
    /// Builds the handle for `def`, located under `parent`.
    #[must_use]
    pub fn from_def(parent: &FieldPath, def: &ArrayFieldDef) -> Self {
        let path = parent.key(def.key.clone());
        let columns = match &def.item {
            ItemSchema::Value(_) => BTreeMap::new(),
            ItemSchema::Form(builder) => builder
                .fields()
                .iter()
                .map(|field| {
                    let nested = match field {
                        FieldKind::Array(nested) => Some(Self::from_def(&FieldPath::root(), nested)),
                        FieldKind::Field(_) => None,
                    };
                    (
                        field.key().to_string(),
                        Column {
                            key: field.key().to_string(),
                            nested,
                        },
                    )
                })
                .collect(),
        };
        Self {
            key: def.key.clone(),
            path,
            item: ItemAccessor,
            columns,
        }
    }

    #[must_use]
    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.get(key)
    }

    /// Re-roots the handle at a concrete location, e.g. a nested array
    /// inside item 3 of its parent.
    #[must_use]
    pub fn at(&self, path: FieldPath) -> Self {
        Self { path, ..self.clone() }
    }
}

/// Handles for every array field in `fields`, keyed by field key.
#[must_use]
pub fn array_handles(fields: &[FieldKind]) -> BTreeMap<String, ArrayFieldHandle> {
    fields
        .iter()
        .filter_map(|field| match field {
            FieldKind::Array(def) => Some((def.key.clone(), ArrayFieldHandle::from_def(&FieldPath::root(), def))),
            FieldKind::Field(_) => None,
        })
        .collect()
}
