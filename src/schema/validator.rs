//! The structural validator contract and a stock set of validators.
//!
//! A [`Validator`] turns an encoded [`FormValue`] into a decoded
//! `serde_json::Value`, or fails with an [`Issue`] tree. Decoding is always
//! expressed as a future so synchronous and asynchronous validators share one
//! contract; synchronous ones return an immediately ready future.
//!
//! Every decode receives a [`CancelToken`]. A superseded live validation has
//! its token cancelled, and long-running validators are expected to check it
//! and bail out early. The engine ignores results of cancelled decodes either
//! way.
//!
//! # Example
//!
//! ```rust
//! use formstate::schema::validator::{string, CancelToken, ValidatorExt};
//! use futures_executor::block_on;
//!
//! let email = string().non_empty("Email is required");
//! let result = block_on(email.decode(&"".into(), &CancelToken::new()));
//! assert!(result.is_err());
//! ```

use crate::domain::value::FormValue;
use crate::schema::issue::{Ast, Issue, RefinementKind, TransformationKind};
use futures_util::future::{self, FutureExt, LocalBoxFuture};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Outcome of a decode.
pub type DecodeResult = std::result::Result<serde_json::Value, Issue>;

/// Future returned by [`Validator::decode`].
pub type DecodeFuture = LocalBoxFuture<'static, DecodeResult>;

/// Shared, type-erased validator.
pub type SharedValidator = Rc<dyn Validator>;

/// Cooperative cancellation flag shared between the engine and a running
/// decode or submit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// A structural validator: decodes an encoded value or reports why not.
pub trait Validator {
    /// The schema shape this validator checks.
    fn ast(&self) -> Ast;

    /// Decodes `input`.
    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture;
}

impl fmt::Debug for dyn Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({})", self.ast().describe())
    }
}

struct Primitive {
    ast: Ast,
    decode: fn(&FormValue) -> Option<serde_json::Value>,
}

impl Validator for Primitive {
    fn ast(&self) -> Ast {
        self.ast.clone()
    }

    fn decode(&self, input: &FormValue, _cancel: &CancelToken) -> DecodeFuture {
        let result = (self.decode)(input).ok_or_else(|| Issue::type_mismatch(self.ast.clone(), input));
        future::ready(result).boxed_local()
    }
}

/// Accepts any string.
#[must_use]
pub fn string() -> SharedValidator {
    Rc::new(Primitive {
        ast: Ast::String,
        decode: |v| v.as_str().map(|s| serde_json::Value::String(s.to_string())),
    })
}

/// Accepts a JSON number.
#[must_use]
pub fn number() -> SharedValidator {
    Rc::new(Primitive {
        ast: Ast::Number,
        decode: |v| match v {
            FormValue::Number(n) => Some(serde_json::Value::Number(n.clone())),
            _ => None,
        },
    })
}

/// Accepts a boolean.
#[must_use]
pub fn boolean() -> SharedValidator {
    Rc::new(Primitive {
        ast: Ast::Boolean,
        decode: |v| match v {
            FormValue::Bool(b) => Some(serde_json::Value::Bool(*b)),
            _ => None,
        },
    })
}

struct NumberFromString;

impl Validator for NumberFromString {
    fn ast(&self) -> Ast {
        Ast::Transformation {
            from: Box::new(Ast::String),
            final_: false,
        }
    }

    fn decode(&self, input: &FormValue, _cancel: &CancelToken) -> DecodeFuture {
        let parsed = input
            .as_str()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number);
        let result = parsed.ok_or_else(|| Issue::Transformation {
            from: Ast::String,
            kind: TransformationKind::Transformation,
            final_: false,
            message: None,
            issue: Box::new(Issue::type_mismatch(Ast::Number, input)),
        });
        future::ready(result).boxed_local()
    }
}

/// Decodes a string holding a number, the usual encoding of numeric inputs.
#[must_use]
pub fn number_from_string() -> SharedValidator {
    Rc::new(NumberFromString)
}

struct StructOf {
    fields: Rc<[(String, SharedValidator)]>,
}

impl Validator for StructOf {
    fn ast(&self) -> Ast {
        Ast::Struct
    }

    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture {
        let fields = Rc::clone(&self.fields);
        let input = input.clone();
        let cancel = cancel.clone();
        async move {
            let FormValue::Record(record) = &input else {
                return Err(Issue::type_mismatch(Ast::Struct, &input));
            };
            let mut decoded = serde_json::Map::new();
            let mut issues = Vec::new();
            for (key, validator) in fields.iter() {
                let Some(value) = record.get(key) else {
                    issues.push(Issue::pointer(key.as_str(), Issue::missing()));
                    continue;
                };
                match validator.decode(value, &cancel).await {
                    Ok(v) => {
                        decoded.insert(key.clone(), v);
                    }
                    Err(issue) => issues.push(Issue::pointer(key.as_str(), issue)),
                }
            }
            if issues.is_empty() {
                Ok(serde_json::Value::Object(decoded))
            } else {
                Err(Issue::composite(issues))
            }
        }
        .boxed_local()
    }
}

/// A record validator. Every failing field is reported; keys not listed are
/// ignored.
#[must_use]
pub fn struct_of<K: Into<String>>(fields: impl IntoIterator<Item = (K, SharedValidator)>) -> SharedValidator {
    let fields: Vec<(String, SharedValidator)> = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Rc::new(StructOf { fields: fields.into() })
}

struct ArrayOf {
    item: SharedValidator,
}

impl Validator for ArrayOf {
    fn ast(&self) -> Ast {
        Ast::Array
    }

    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture {
        let item = Rc::clone(&self.item);
        let input = input.clone();
        let cancel = cancel.clone();
        async move {
            let FormValue::List(items) = &input else {
                return Err(Issue::type_mismatch(Ast::Array, &input));
            };
            let mut decoded = Vec::with_capacity(items.len());
            let mut issues = Vec::new();
            for (index, value) in items.iter().enumerate() {
                match item.decode(value, &cancel).await {
                    Ok(v) => decoded.push(v),
                    Err(issue) => issues.push(Issue::pointer(index, issue)),
                }
            }
            if issues.is_empty() {
                Ok(serde_json::Value::Array(decoded))
            } else {
                Err(Issue::composite(issues))
            }
        }
        .boxed_local()
    }
}

/// A list validator applying `item` to every element.
#[must_use]
pub fn array_of(item: SharedValidator) -> SharedValidator {
    Rc::new(ArrayOf { item })
}

type Predicate = Rc<dyn Fn(&serde_json::Value) -> bool>;

struct Refine {
    inner: SharedValidator,
    predicate: Predicate,
    message: String,
}

impl Validator for Refine {
    fn ast(&self) -> Ast {
        Ast::Refinement(Box::new(self.inner.ast()))
    }

    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture {
        let from = self.inner.ast();
        let inner = self.inner.decode(input, cancel);
        let predicate = Rc::clone(&self.predicate);
        let message = self.message.clone();
        let input = input.clone();
        async move {
            let decoded = inner.await.map_err(|issue| Issue::Refinement {
                from: from.clone(),
                kind: RefinementKind::From,
                message: None,
                issue: Box::new(issue),
            })?;
            if predicate(&decoded) {
                Ok(decoded)
            } else {
                Err(Issue::Refinement {
                    from: from.clone(),
                    kind: RefinementKind::Predicate,
                    message: Some(message),
                    issue: Box::new(Issue::type_mismatch(Ast::Refinement(Box::new(from)), &input)),
                })
            }
        }
        .boxed_local()
    }
}

/// Asynchronous check returning a failure message, or `None` when the value passes.
pub type AsyncCheck = Rc<dyn Fn(serde_json::Value, CancelToken) -> LocalBoxFuture<'static, Option<String>>>;

struct RefineAsync {
    inner: SharedValidator,
    check: AsyncCheck,
}

impl Validator for RefineAsync {
    fn ast(&self) -> Ast {
        Ast::Transformation {
            from: Box::new(self.inner.ast()),
            final_: true,
        }
    }

    fn decode(&self, input: &FormValue, cancel: &CancelToken) -> DecodeFuture {
        let from = self.inner.ast();
        let inner = self.inner.decode(input, cancel);
        let check = Rc::clone(&self.check);
        let cancel = cancel.clone();
        let input = input.clone();
        async move {
            let decoded = inner.await?;
            match check(decoded.clone(), cancel).await {
                None => Ok(decoded),
                Some(message) => Err(Issue::Transformation {
                    from: from.clone(),
                    kind: TransformationKind::Transformation,
                    final_: true,
                    message: Some(message),
                    issue: Box::new(Issue::type_mismatch(from, &input)),
                }),
            }
        }
        .boxed_local()
    }
}

fn text_len(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::String(s) => Some(s.chars().count()),
        serde_json::Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Chainable refinements on a [`SharedValidator`].
pub trait ValidatorExt {
    /// Adds a synchronous predicate over the decoded value.
    #[must_use]
    fn refine(self, predicate: impl Fn(&serde_json::Value) -> bool + 'static, message: impl Into<String>) -> SharedValidator;

    /// Adds an asynchronous check over the decoded value.
    #[must_use]
    fn refine_async<F>(self, check: F) -> SharedValidator
    where
        F: Fn(serde_json::Value, CancelToken) -> LocalBoxFuture<'static, Option<String>> + 'static;

    /// Requires a non-empty string or list.
    #[must_use]
    fn non_empty(self, message: impl Into<String>) -> SharedValidator;

    /// Requires at least `min` characters (strings) or elements (lists).
    #[must_use]
    fn min_length(self, min: usize, message: impl Into<String>) -> SharedValidator;

    /// Allows at most `max` characters (strings) or elements (lists).
    #[must_use]
    fn max_length(self, max: usize, message: impl Into<String>) -> SharedValidator;

    /// Requires a string containing `needle`.
    #[must_use]
    fn contains(self, needle: impl Into<String>, message: impl Into<String>) -> SharedValidator;
}

impl ValidatorExt for SharedValidator {
    fn refine(self, predicate: impl Fn(&serde_json::Value) -> bool + 'static, message: impl Into<String>) -> SharedValidator {
        Rc::new(Refine {
            inner: self,
            predicate: Rc::new(predicate),
            message: message.into(),
        })
    }

    fn refine_async<F>(self, check: F) -> SharedValidator
    where
        F: Fn(serde_json::Value, CancelToken) -> LocalBoxFuture<'static, Option<String>> + 'static,
    {
        Rc::new(RefineAsync {
            inner: self,
            check: Rc::new(check),
        })
    }

    fn non_empty(self, message: impl Into<String>) -> SharedValidator {
        self.min_length(1, message)
    }

    fn min_length(self, min: usize, message: impl Into<String>) -> SharedValidator {
        self.refine(move |v| text_len(v).is_some_and(|len| len >= min), message)
    }

    fn max_length(self, max: usize, message: impl Into<String>) -> SharedValidator {
        self.refine(move |v| text_len(v).is_some_and(|len| len <= max), message)
    }

    fn contains(self, needle: impl Into<String>, message: impl Into<String>) -> SharedValidator {
        let needle = needle.into();
        self.refine(move |v| v.as_str().is_some_and(|s| s.contains(needle.as_str())), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::router::{extract_first_error, route_errors, route_errors_with_source, ErrorSource};
    use futures_executor::block_on;
    use serde_json::json;

    fn decode(v: &SharedValidator, input: serde_json::Value) -> DecodeResult {
        block_on(v.decode(&FormValue::from(input), &CancelToken::new()))
    }

    #[test]
    fn primitives_accept_and_reject() {
        assert_eq!(decode(&string(), json!("x")).unwrap(), json!("x"));
        assert!(decode(&string(), json!(1)).is_err());
        assert_eq!(decode(&number(), json!(2)).unwrap(), json!(2));
        assert_eq!(decode(&boolean(), json!(true)).unwrap(), json!(true));
        assert_eq!(decode(&number_from_string(), json!(" 42 ")).unwrap(), json!(42.0));
        assert!(decode(&number_from_string(), json!("abc")).is_err());
    }

    #[test]
    fn refinement_message_is_reported() {
        let name = string().min_length(3, "Name too short");
        let issue = decode(&name, json!("AB")).unwrap_err();
        assert_eq!(extract_first_error(&issue).as_deref(), Some("Name too short"));
    }

    #[test]
    fn chained_refinements_stop_at_first_failure() {
        let password = string()
            .min_length(8, "Password too short")
            .refine(|v| v.as_str().is_some_and(|s| s.chars().any(char::is_uppercase)), "Must contain uppercase");
        let schema = struct_of([("password", password)]);
        let errors = route_errors(&decode(&schema, json!({ "password": "abc" })).unwrap_err());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["password"], "Password too short");
    }

    #[test]
    fn struct_reports_every_failing_field() {
        let schema = struct_of([
            ("name", string().non_empty("Name required")),
            ("email", string().contains("@", "Invalid email")),
        ]);
        let errors = route_errors(&decode(&schema, json!({ "name": "", "email": "nope" })).unwrap_err());
        assert_eq!(errors["name"], "Name required");
        assert_eq!(errors["email"], "Invalid email");
    }

    #[test]
    fn struct_reports_missing_keys() {
        let schema = struct_of([("name", string())]);
        let errors = route_errors(&decode(&schema, json!({})).unwrap_err());
        assert_eq!(errors["name"], "is missing");
    }

    #[test]
    fn array_items_route_with_indices() {
        let schema = struct_of([(
            "items",
            array_of(struct_of([("name", string().non_empty("Name required"))])),
        )]);
        let input = json!({ "items": [{ "name": "ok" }, { "name": "" }] });
        let errors = route_errors(&decode(&schema, input).unwrap_err());
        assert_eq!(errors["items[1].name"], "Name required");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn item_level_rule_is_field_sourced() {
        let range = struct_of([("start", number()), ("end", number())])
            .refine(|v| v["start"].as_f64() <= v["end"].as_f64(), "End before start");
        let schema = struct_of([("ranges", array_of(range))]);
        let input = json!({ "ranges": [{ "start": 5, "end": 1 }] });
        let errors = route_errors_with_source(&decode(&schema, input).unwrap_err());
        assert_eq!(errors["ranges[0]"].source, ErrorSource::Field);
        assert_eq!(errors["ranges[0]"].message, "End before start");
    }

    #[test]
    fn async_refinement_reports_message() {
        let username = string().refine_async(|v, _cancel| {
            let taken = v.as_str() == Some("taken");
            future::ready(taken.then(|| "Username is already taken".to_string())).boxed_local()
        });
        let issue = decode(&username, json!("taken")).unwrap_err();
        assert_eq!(extract_first_error(&issue).as_deref(), Some("Username is already taken"));
        assert!(decode(&username, json!("free")).is_ok());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
