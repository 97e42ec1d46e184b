//! Routing validator issues onto field paths.
//!
//! The router walks an [`Issue`] tree carrying the current path and the
//! current [`ErrorSource`]. Every terminal issue lands on the field addressed by
//! the accumulated path (`""` for the root). The first issue for a path wins;
//! later issues for the same path are discarded.
//!
//! # Source classification
//!
//! The walk starts with [`ErrorSource::Field`]. It switches to
//! [`ErrorSource::Refinement`] for the remainder of a branch when it meets,
//! while the path is still empty,
//!
//! - a `Refinement` issue of kind `Predicate` over a composite shape, or
//! - a final `Transformation` issue of kind `Transformation` over a composite
//!   shape (the form of an asynchronous refinement).
//!
//! A refinement over a nested composite (say, one array item) keeps the
//! `Field` source: it is local to that sub-object, not a rule over the form.
//!
//! Field-sourced errors can be cleared by editing their field; refinement
//! errors persist until the next full decode, because no single edit can be
//! proven to resolve a cross-field rule.

use crate::domain::path::FieldPath;
use crate::schema::issue::{Issue, RefinementKind, TransformationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a routed error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// A field's own validator.
    Field,
    /// A rule over the whole decoded form.
    Refinement,
}

/// A routed error message and its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub source: ErrorSource,
}

/// Errors keyed by canonical field path string; `""` holds root-level errors.
pub type ErrorMap = BTreeMap<String, ErrorEntry>;

/// One terminal issue with its location, resolved message and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedIssue {
    pub path: FieldPath,
    pub message: String,
    pub source: ErrorSource,
}

/// Flattens `issue` into routed terminals, in traversal order.
#[must_use]
pub fn walk(issue: &Issue) -> Vec<RoutedIssue> {
    let mut out = Vec::new();
    walk_into(issue, &FieldPath::root(), ErrorSource::Field, None, &mut out);
    out
}

fn walk_into(
    issue: &Issue,
    path: &FieldPath,
    source: ErrorSource,
    inherited: Option<&str>,
    out: &mut Vec<RoutedIssue>,
) {
    let message = issue.own_message().or(inherited);

    match issue {
        Issue::Pointer { path: sub, issue } => {
            let extended = path.join(&FieldPath::new(sub.clone()));
            walk_into(issue, &extended, source, message, out);
        }
        Issue::Composite { issues } => {
            for sub in issues {
                walk_into(sub, path, source, message, out);
            }
        }
        Issue::Refinement { from, kind, issue: inner, .. } => {
            let next = if *kind == RefinementKind::Predicate && from.is_composite() && path.is_root() {
                ErrorSource::Refinement
            } else {
                source
            };
            walk_into(inner, path, next, message, out);
        }
        Issue::Transformation {
            from,
            kind,
            final_,
            issue: inner,
            ..
        } => {
            let next = if *kind == TransformationKind::Transformation
                && *final_
                && from.is_composite()
                && path.is_root()
            {
                ErrorSource::Refinement
            } else {
                source
            };
            walk_into(inner, path, next, message, out);
        }
        Issue::Type { .. } | Issue::Missing { .. } | Issue::Unexpected { .. } | Issue::Forbidden { .. } => {
            out.push(RoutedIssue {
                path: path.clone(),
                message: message.map_or_else(|| issue.default_message(), str::to_string),
                source,
            });
        }
    }
}

/// Routes every terminal issue to its field path, tagging its source.
///
/// # Example
///
/// ```rust
/// use formstate::schema::issue::{Ast, Issue, RefinementKind};
/// use formstate::schema::router::{route_errors_with_source, ErrorSource};
///
/// let issue = Issue::Refinement {
///     from: Ast::Struct,
///     kind: RefinementKind::Predicate,
///     message: None,
///     issue: Box::new(Issue::pointer(
///         "confirm",
///         Issue::invalid(Ast::Struct, &formstate::FormValue::Null, "Passwords must match"),
///     )),
/// };
/// let routed = route_errors_with_source(&issue);
/// assert_eq!(routed["confirm"].source, ErrorSource::Refinement);
/// ```
#[must_use]
pub fn route_errors_with_source(issue: &Issue) -> ErrorMap {
    let _span = tracing::debug_span!("route_errors_with_source").entered();

    let mut result = ErrorMap::new();
    for routed in walk(issue) {
        result.entry(routed.path.to_string()).or_insert(ErrorEntry {
            message: routed.message,
            source: routed.source,
        });
    }

    tracing::debug!(routed = result.len(), "issues routed");
    result
}

/// Source-stripped variant of [`route_errors_with_source`].
#[must_use]
pub fn route_errors(issue: &Issue) -> BTreeMap<String, String> {
    route_errors_with_source(issue)
        .into_iter()
        .map(|(path, entry)| (path, entry.message))
        .collect()
}

/// The first formatted message anywhere in the tree.
///
/// Used for single-field live validation, where only one message is shown.
#[must_use]
pub fn extract_first_error(issue: &Issue) -> Option<String> {
    walk(issue).into_iter().next().map(|routed| routed.message)
}
