//! Issue trees produced by structural validators.
//!
//! A failed decode yields one [`Issue`]: a recursive structure of terminal
//! problems (`Type`, `Missing`, `Unexpected`, `Forbidden`) wrapped in
//! positional (`Pointer`), grouping (`Composite`) and provenance
//! (`Refinement`, `Transformation`) nodes. Provenance nodes record the [`Ast`]
//! shape of the value they guarded, which is what the error router uses to
//! tell a field's own constraint apart from a cross-field rule.
//!
//! Messages resolve innermost-first: a terminal's own message wins, then the
//! nearest enclosing wrapper that carries one, then a default derived from the
//! terminal kind.

use crate::domain::path::{FieldPath, Segment};
use crate::domain::value::FormValue;

/// Shape of the schema node that produced an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    String,
    Number,
    Boolean,
    Literal(String),
    /// A record with named fields.
    Struct,
    Tuple,
    /// A homogeneous list; treated as a rest-only tuple.
    Array,
    /// An opaque class-like declaration.
    Declaration,
    Union,
    /// A lazily referenced (recursive) schema.
    Suspend,
    /// A predicate layered over another shape.
    Refinement(Box<Ast>),
    /// A conversion layered over another shape.
    Transformation {
        from: Box<Ast>,
        /// Whether the conversion is the last step (an effectful filter).
        final_: bool,
    },
}

impl Ast {
    /// Unwraps refinement and transformation layers.
    #[must_use]
    pub fn base(&self) -> &Ast {
        match self {
            Self::Refinement(from) | Self::Transformation { from, .. } => from.base(),
            other => other,
        }
    }

    /// Whether the underlying shape groups several values, so that a
    /// predicate over it can relate one field to another.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(
            self.base(),
            Self::Struct | Self::Tuple | Self::Array | Self::Declaration | Self::Union | Self::Suspend
        )
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Literal(lit) => format!("\"{lit}\""),
            Self::Struct => "object".to_string(),
            Self::Tuple => "tuple".to_string(),
            Self::Array => "array".to_string(),
            Self::Declaration => "declaration".to_string(),
            Self::Union => "union".to_string(),
            Self::Suspend => "recursive".to_string(),
            Self::Refinement(from) => format!("refined {}", from.describe()),
            Self::Transformation { from, .. } => from.describe(),
        }
    }
}

/// Which part of a refinement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementKind {
    /// The value underneath did not decode.
    From,
    /// The value decoded but the predicate rejected it.
    Predicate,
}

/// Which step of a transformation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationKind {
    Encoded,
    Transformation,
    Type,
}

/// A structured validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    /// The value has the wrong shape, or a predicate rejected it.
    Type {
        expected: Ast,
        actual: Option<FormValue>,
        message: Option<String>,
    },
    /// A required key or element is absent.
    Missing { message: Option<String> },
    /// A key or element is present that the schema does not allow.
    Unexpected {
        actual: Option<FormValue>,
        message: Option<String>,
    },
    /// The value cannot be decoded in this context (e.g. an async check in a
    /// synchronous decode).
    Forbidden { message: Option<String> },
    /// A refinement over `from` failed.
    Refinement {
        from: Ast,
        kind: RefinementKind,
        message: Option<String>,
        issue: Box<Issue>,
    },
    /// The nested issue is located at `path` relative to this node.
    Pointer { path: Vec<Segment>, issue: Box<Issue> },
    /// Several independent issues.
    Composite { issues: Vec<Issue> },
    /// A transformation from `from` failed.
    Transformation {
        from: Ast,
        kind: TransformationKind,
        final_: bool,
        message: Option<String>,
        issue: Box<Issue>,
    },
}

impl Issue {
    /// A `Type` issue carrying an explicit message.
    #[must_use]
    pub fn invalid(expected: Ast, actual: &FormValue, message: impl Into<String>) -> Self {
        Self::Type {
            expected,
            actual: Some(actual.clone()),
            message: Some(message.into()),
        }
    }

    /// A `Type` issue with the default "Expected …, actual …" message.
    #[must_use]
    pub fn type_mismatch(expected: Ast, actual: &FormValue) -> Self {
        Self::Type {
            expected,
            actual: Some(actual.clone()),
            message: None,
        }
    }

    #[must_use]
    pub fn missing() -> Self {
        Self::Missing { message: None }
    }

    /// Places `issue` under `path`. An empty path returns `issue` unchanged.
    #[must_use]
    pub fn at(path: &FieldPath, issue: Issue) -> Self {
        if path.is_root() {
            issue
        } else {
            Self::Pointer {
                path: path.segments().to_vec(),
                issue: Box::new(issue),
            }
        }
    }

    /// Places `issue` under a single segment.
    #[must_use]
    pub fn pointer(segment: impl Into<Segment>, issue: Issue) -> Self {
        Self::Pointer {
            path: vec![segment.into()],
            issue: Box::new(issue),
        }
    }

    /// Groups issues. A single issue is returned unwrapped.
    #[must_use]
    pub fn composite(mut issues: Vec<Issue>) -> Self {
        if issues.len() == 1 {
            issues.remove(0)
        } else {
            Self::Composite { issues }
        }
    }

    /// The message attached directly to this node, if any.
    #[must_use]
    pub fn own_message(&self) -> Option<&str> {
        match self {
            Self::Type { message, .. }
            | Self::Missing { message }
            | Self::Unexpected { message, .. }
            | Self::Forbidden { message }
            | Self::Refinement { message, .. }
            | Self::Transformation { message, .. } => message.as_deref(),
            Self::Pointer { .. } | Self::Composite { .. } => None,
        }
    }

    /// The message a terminal issue reports when nothing overrides it.
    #[must_use]
    pub fn default_message(&self) -> String {
        match self {
            Self::Type { expected, actual, .. } => match actual {
                Some(actual) => format!("Expected {}, actual {actual}", expected.describe()),
                None => format!("Expected {}", expected.describe()),
            },
            Self::Missing { .. } => "is missing".to_string(),
            Self::Unexpected { .. } => "is unexpected".to_string(),
            Self::Forbidden { .. } => "is forbidden".to_string(),
            Self::Refinement { .. } => "Predicate refinement failure".to_string(),
            Self::Transformation { .. } => "Transformation failure".to_string(),
            Self::Pointer { issue, .. } => issue.default_message(),
            Self::Composite { issues } => issues
                .first()
                .map_or_else(|| "Invalid value".to_string(), Issue::default_message),
        }
    }
}

/// One terminal issue flattened to its location and final message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedIssue {
    pub path: FieldPath,
    pub message: String,
}

/// Flattens an issue tree into terminal issues, in traversal order.
#[must_use]
pub fn format_issues(issue: &Issue) -> Vec<FormattedIssue> {
    crate::schema::router::walk(issue)
        .into_iter()
        .map(|routed| FormattedIssue {
            path: routed.path,
            message: routed.message,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unwraps_wrappers() {
        let ast = Ast::Refinement(Box::new(Ast::Transformation {
            from: Box::new(Ast::Struct),
            final_: true,
        }));
        assert_eq!(ast.base(), &Ast::Struct);
        assert!(ast.is_composite());
        assert!(!Ast::Refinement(Box::new(Ast::String)).is_composite());
    }

    #[test]
    fn innermost_message_wins() {
        let issue = Issue::Refinement {
            from: Ast::String,
            kind: RefinementKind::Predicate,
            message: Some("outer".into()),
            issue: Box::new(Issue::Type {
                expected: Ast::String,
                actual: None,
                message: Some("inner".into()),
            }),
        };
        let formatted = format_issues(&issue);
        assert_eq!(formatted[0].message, "inner");
    }

    #[test]
    fn wrapper_message_applies_to_bare_terminal() {
        let issue = Issue::Refinement {
            from: Ast::String,
            kind: RefinementKind::Predicate,
            message: Some("Too short".into()),
            issue: Box::new(Issue::type_mismatch(Ast::String, &"ab".into())),
        };
        assert_eq!(format_issues(&issue)[0].message, "Too short");
    }

    #[test]
    fn default_messages() {
        assert_eq!(
            Issue::type_mismatch(Ast::String, &FormValue::from(5)).default_message(),
            "Expected string, actual 5"
        );
        assert_eq!(Issue::missing().default_message(), "is missing");
    }

    #[test]
    fn pointers_accumulate_paths() {
        let issue = Issue::pointer(
            "items",
            Issue::pointer(0usize, Issue::pointer("name", Issue::missing())),
        );
        let formatted = format_issues(&issue);
        assert_eq!(formatted.len(), 1);
        assert_eq!(formatted[0].path.to_string(), "items[0].name");
    }
}
