//! Form composition.
//!
//! [`FormBuilder`] is an immutable description of a form: an ordered list of
//! fields plus an ordered list of cross-field refinements. Every builder
//! operation consumes the builder and returns a new one.
//!
//! [`build_schema`] compiles a builder into a [`FormSchema`], the validator for
//! the whole form. Decoding runs the structural validator first and, only if
//! every field decodes, applies each refinement in registration order to the
//! decoded object, stopping at the first one that fails. Field errors therefore
//! always take priority over refinement errors within one decode.
//!
//! # Example
//!
//! ```rust
//! use formstate::schema::builder::{build_schema, FormBuilder, RefinementFailure};
//! use formstate::schema::field::make_field;
//! use formstate::schema::validator::{string, CancelToken, Validator};
//! use formstate::FormValue;
//! use futures_executor::block_on;
//!
//! let builder = FormBuilder::empty()
//!     .add_field(make_field("password", string()))
//!     .add_field(make_field("confirm", string()))
//!     .refine(|v| {
//!         (v["password"] != v["confirm"]).then(|| RefinementFailure::field("confirm", "Passwords must match"))
//!     });
//!
//! let schema = build_schema(&builder);
//! let input = FormValue::from(serde_json::json!({ "password": "a", "confirm": "b" }));
//! assert!(block_on(schema.decode(&input, &CancelToken::new())).is_err());
//! ```

use crate::domain::error::{FormError, Result};
use crate::domain::path::{FieldPath, Segment};
use crate::domain::value::FormValue;
use crate::schema::field::{ArrayFieldDef, FieldDef, FieldKind, ItemSchema};
use crate::schema::issue::{Ast, Issue, RefinementKind, TransformationKind};
use crate::schema::validator::{array_of, struct_of, CancelToken, DecodeFuture, SharedValidator, Validator};
use futures_util::future::{FutureExt, LocalBoxFuture};
use std::fmt;
use std::rc::Rc;

/// A refinement's report: the path it blames and the message to show there.
///
/// A root path makes the failure path-less; it is routed to the `""` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementFailure {
    pub path: FieldPath,
    pub message: String,
}

impl RefinementFailure {
    #[must_use]
    pub fn at(path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Blames a single top-level field.
    #[must_use]
    pub fn field(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(FieldPath::root().key(key), message)
    }

    /// A failure not tied to any field.
    #[must_use]
    pub fn root(message: impl Into<String>) -> Self {
        Self::at(FieldPath::root(), message)
    }
}

type SyncRefinement = Rc<dyn Fn(&serde_json::Value) -> Option<RefinementFailure>>;
type AsyncRefinement =
    Rc<dyn Fn(serde_json::Value, CancelToken) -> LocalBoxFuture<'static, Option<RefinementFailure>>>;

/// A cross-field rule over the decoded form.
#[derive(Clone)]
pub enum Refinement {
    Sync(SyncRefinement),
    Async(AsyncRefinement),
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Refinement::Sync"),
            Self::Async(_) => f.write_str("Refinement::Async"),
        }
    }
}

/// Ordered field definitions plus ordered refinements.
#[derive(Debug, Clone, Default)]
pub struct FormBuilder {
    fields: Vec<FieldKind>,
    refinements: Vec<Refinement>,
}

impl FormBuilder {
    /// A builder with no fields and no refinements.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a scalar field. A field with the same key is replaced in place.
    #[must_use]
    pub fn add_field(self, def: FieldDef) -> Self {
        self.insert(FieldKind::Field(def))
    }

    /// Adds an array field. A field with the same key is replaced in place.
    #[must_use]
    pub fn add_array(self, def: ArrayFieldDef) -> Self {
        self.insert(FieldKind::Array(def))
    }

    fn insert(mut self, field: FieldKind) -> Self {
        match self.fields.iter_mut().find(|existing| existing.key() == field.key()) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Concatenates `other`'s fields and refinements after this builder's.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Config`] if both builders define the same key.
    pub fn merge(mut self, other: FormBuilder) -> Result<Self> {
        let _span = tracing::debug_span!("merge", left = self.fields.len(), right = other.fields.len()).entered();

        if let Some(duplicate) = other.fields.iter().find(|field| self.field(field.key()).is_some()) {
            tracing::debug!(key = duplicate.key(), "duplicate field key in merge");
            return Err(FormError::Config(format!(
                "cannot merge forms: field '{}' is defined in both",
                duplicate.key()
            )));
        }

        self.fields.extend(other.fields);
        self.refinements.extend(other.refinements);
        Ok(self)
    }

    /// Adds a synchronous cross-field rule.
    ///
    /// The closure receives the decoded form and returns a failure, or `None`
    /// when the rule holds.
    #[must_use]
    pub fn refine(mut self, rule: impl Fn(&serde_json::Value) -> Option<RefinementFailure> + 'static) -> Self {
        self.refinements.push(Refinement::Sync(Rc::new(rule)));
        self
    }

    /// Adds an asynchronous cross-field rule.
    #[must_use]
    pub fn refine_async<F>(mut self, rule: F) -> Self
    where
        F: Fn(serde_json::Value, CancelToken) -> LocalBoxFuture<'static, Option<RefinementFailure>> + 'static,
    {
        self.refinements.push(Refinement::Async(Rc::new(rule)));
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldKind> {
        self.fields.iter().find(|field| field.key() == key)
    }

    #[must_use]
    pub fn refinements(&self) -> &[Refinement] {
        &self.refinements
    }
}

#[derive(Debug, Clone)]
enum CompiledItem {
    Value(SharedValidator),
    Form(Rc<FormSchema>),
}

impl CompiledItem {
    fn validator(&self) -> SharedValidator {
        match self {
            Self::Value(validator) => Rc::clone(validator),
            Self::Form(schema) => Rc::clone(schema) as SharedValidator,
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledField {
    Scalar(SharedValidator),
    Array {
        validator: SharedValidator,
        item: CompiledItem,
        schema: ItemSchema,
    },
}

/// The compiled validator for a whole form.
#[derive(Debug, Clone)]
pub struct FormSchema {
    fields: Rc<[FieldKind]>,
    compiled: Rc<[(String, CompiledField)]>,
    structural: SharedValidator,
    refinements: Rc<[Refinement]>,
}

/// Compiles a builder into its form validator.
#[must_use]
pub fn build_schema(builder: &FormBuilder) -> FormSchema {
    let _span = tracing::debug_span!(
        "build_schema",
        fields = builder.fields.len(),
        refinements = builder.refinements.len()
    )
    .entered();

    let compiled: Vec<(String, CompiledField)> = builder
        .fields
        .iter()
        .map(|field| {
            let compiled = match field {
                FieldKind::Field(def) => CompiledField::Scalar(Rc::clone(&def.validator)),
                FieldKind::Array(def) => {
                    let item = match &def.item {
                        ItemSchema::Value(validator) => CompiledItem::Value(Rc::clone(validator)),
                        ItemSchema::Form(nested) => CompiledItem::Form(Rc::new(build_schema(nested))),
                    };
                    CompiledField::Array {
                        validator: array_of(item.validator()),
                        item,
                        schema: def.item.clone(),
                    }
                }
            };
            (field.key().to_string(), compiled)
        })
        .collect();

    let structural = struct_of(compiled.iter().map(|(key, field)| {
        let validator = match field {
            CompiledField::Scalar(validator) | CompiledField::Array { validator, .. } => Rc::clone(validator),
        };
        (key.clone(), validator)
    }));

    FormSchema {
        fields: builder.fields.clone().into(),
        compiled: compiled.into(),
        structural,
        refinements: builder.refinements.clone().into(),
    }
}

impl FormSchema {
    #[must_use]
    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    fn compiled(&self, key: &str) -> Option<&CompiledField> {
        self.compiled.iter().find(|(k, _)| k == key).map(|(_, field)| field)
    }

    /// Resolves the validator responsible for the value at `path`.
    ///
    /// Paths may reach into array items (`items[0]`) and into nested forms
    /// (`items[0].name`). The root path resolves to the form itself.
    #[must_use]
    pub fn validator_at(self: &Rc<Self>, path: &FieldPath) -> Option<SharedValidator> {
        if path.is_root() {
            return Some(Rc::clone(self) as SharedValidator);
        }
        self.resolve(path.segments())
    }

    fn resolve(&self, segments: &[Segment]) -> Option<SharedValidator> {
        let (Segment::Key(key), rest) = segments.split_first()? else {
            return None;
        };
        match (self.compiled(key)?, rest) {
            (CompiledField::Scalar(validator), []) | (CompiledField::Array { validator, .. }, []) => {
                Some(Rc::clone(validator))
            }
            (CompiledField::Array { item, .. }, [Segment::Index(_), tail @ ..]) => match (item, tail) {
                (item, []) => Some(item.validator()),
                (CompiledItem::Form(nested), tail) => nested.resolve(tail),
                (CompiledItem::Value(_), _) => None,
            },
            _ => None,
        }
    }

    /// The item schema of the array field at `path`, if `path` addresses one.
    #[must_use]
    pub fn item_schema_at(&self, path: &FieldPath) -> Option<&ItemSchema> {
        self.resolve_item(path.segments())
    }

    fn resolve_item(&self, segments: &[Segment]) -> Option<&ItemSchema> {
        let (Segment::Key(key), rest) = segments.split_first()? else {
            return None;
        };
        let CompiledField::Array { item, schema, .. } = self.compiled(key)? else {
            return None;
        };
        match (rest, item) {
            ([], _) => Some(schema),
            ([Segment::Index(_), tail @ ..], CompiledItem::Form(nested)) if !tail.is_empty() => {
                nested.resolve_item(tail)
            }
            _ => None,
        }
    }
}

fn refinement_issue(failure: &RefinementFailure, input: &FormValue) -> Issue {
    Issue::at(&failure.path, Issue::invalid(Ast::Struct, input, failure.message.clone()))
}

impl Validator for FormSchema {
    fn ast(&self) -> Ast {
        Ast::Struct
    }

    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture {
        let structural = self.structural.decode(input, cancel);
        let refinements = Rc::clone(&self.refinements);
        let input = input.clone();
        let cancel = cancel.clone();

        async move {
            let decoded = structural.await?;

            for (index, refinement) in refinements.iter().enumerate() {
                match refinement {
                    Refinement::Sync(rule) => {
                        if let Some(failure) = rule(&decoded) {
                            tracing::debug!(index, path = %failure.path, "refinement failed");
                            return Err(Issue::Refinement {
                                from: Ast::Struct,
                                kind: RefinementKind::Predicate,
                                message: None,
                                issue: Box::new(refinement_issue(&failure, &input)),
                            });
                        }
                    }
                    Refinement::Async(rule) => {
                        if let Some(failure) = rule(decoded.clone(), cancel.clone()).await {
                            tracing::debug!(index, path = %failure.path, "async refinement failed");
                            return Err(Issue::Transformation {
                                from: Ast::Struct,
                                kind: TransformationKind::Transformation,
                                final_: true,
                                message: None,
                                issue: Box::new(refinement_issue(&failure, &input)),
                            });
                        }
                    }
                }
            }

            Ok(decoded)
        }
        .boxed_local()
    }
}
