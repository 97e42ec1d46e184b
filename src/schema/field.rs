//! Field definitions.
//!
//! A form is an ordered set of fields. A [`FieldDef`] holds a single encoded
//! value checked by one validator; an [`ArrayFieldDef`] holds an ordered list
//! of items, each either a plain value ([`ItemSchema::Value`]) or a nested
//! field set ([`ItemSchema::Form`]).
//!
//! # Example
//!
//! ```rust
//! use formstate::schema::field::{get_default_encoded_values, make_array_field, make_field, FieldKind};
//! use formstate::schema::validator::string;
//!
//! let fields = vec![
//!     FieldKind::Field(make_field("title", string())),
//!     FieldKind::Array(make_array_field("tags", string())),
//! ];
//! let defaults = get_default_encoded_values(&fields);
//! assert_eq!(defaults.to_string(), r#"{"tags":[],"title":""}"#);
//! ```

use crate::domain::value::FormValue;
use crate::schema::builder::FormBuilder;
use crate::schema::validator::SharedValidator;

/// A scalar field: one encoded value, no children.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub key: String,
    pub validator: SharedValidator,
}

/// What each element of an array field holds.
#[derive(Debug, Clone)]
pub enum ItemSchema {
    /// A single value checked by a validator.
    Value(SharedValidator),
    /// A nested field set, possibly with its own arrays and refinements.
    Form(FormBuilder),
}

impl ItemSchema {
    /// The encoded value a freshly appended item starts with.
    ///
    /// `""` for a plain value; the nested defaults for a sub-form.
    #[must_use]
    pub fn default_item(&self) -> FormValue {
        match self {
            Self::Value(_) => FormValue::String(String::new()),
            Self::Form(builder) => get_default_encoded_values(builder.fields()),
        }
    }
}

impl From<SharedValidator> for ItemSchema {
    fn from(validator: SharedValidator) -> Self {
        Self::Value(validator)
    }
}

impl From<FormBuilder> for ItemSchema {
    fn from(builder: FormBuilder) -> Self {
        Self::Form(builder)
    }
}

/// An array field: an ordered list of items sharing one item schema.
#[derive(Debug, Clone)]
pub struct ArrayFieldDef {
    pub key: String,
    pub item: ItemSchema,
}

/// Either kind of field, as stored in a builder.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Field(FieldDef),
    Array(ArrayFieldDef),
}

impl FieldKind {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Field(def) => &def.key,
            Self::Array(def) => &def.key,
        }
    }

    #[must_use]
    pub const fn is_field_def(&self) -> bool {
        matches!(self, Self::Field(_))
    }

    #[must_use]
    pub const fn is_array_field_def(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The encoded "empty" value for this field: `""` or `[]`.
    #[must_use]
    pub fn default_encoded(&self) -> FormValue {
        match self {
            Self::Field(_) => FormValue::String(String::new()),
            Self::Array(_) => FormValue::list(),
        }
    }
}

impl From<FieldDef> for FieldKind {
    fn from(def: FieldDef) -> Self {
        Self::Field(def)
    }
}

impl From<ArrayFieldDef> for FieldKind {
    fn from(def: ArrayFieldDef) -> Self {
        Self::Array(def)
    }
}

/// Creates a scalar field definition.
#[must_use]
pub fn make_field(key: impl Into<String>, validator: SharedValidator) -> FieldDef {
    FieldDef {
        key: key.into(),
        validator,
    }
}

/// Creates an array field definition from a validator or a nested builder.
#[must_use]
pub fn make_array_field(key: impl Into<String>, item: impl Into<ItemSchema>) -> ArrayFieldDef {
    ArrayFieldDef {
        key: key.into(),
        item: item.into(),
    }
}

/// Encoded defaults for a field set: `""` for scalar fields, `[]` for arrays.
#[must_use]
pub fn get_default_encoded_values(fields: &[FieldKind]) -> FormValue {
    FormValue::from_pairs(fields.iter().map(|field| (field.key(), field.default_encoded())))
}

/// A record mapping every field key to `value`.
#[must_use]
pub fn create_touched_record(fields: &[FieldKind], value: bool) -> FormValue {
    FormValue::from_pairs(fields.iter().map(|field| (field.key(), FormValue::Bool(value))))
}
