//! Field path addressing.
//!
//! A [`FieldPath`] is an ordered sequence of [`Segment`]s, each either a record
//! key or a list index. The canonical string form joins keys with `.` and
//! writes indices as `[n]`, so `users[0].addresses[2].city` addresses the
//! `city` key of the third address of the first user.
//!
//! Parsing and serialization round-trip losslessly for every path whose keys
//! are non-empty and free of the delimiter characters `.`, `[` and `]`.

use crate::domain::error::{FormError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// A named field inside a record.
    Key(String),
    /// A position inside a list.
    Index(usize),
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Address of a location inside a nested value tree.
///
/// The empty path addresses the root and serializes to `""`.
///
/// # Example
///
/// ```rust
/// use formstate::domain::path::{FieldPath, Segment};
///
/// let path: FieldPath = "items[1].name".parse()?;
/// assert_eq!(
///     path.segments(),
///     &[Segment::Key("items".into()), Segment::Index(1), Segment::Key("name".into())]
/// );
/// assert_eq!(path.to_string(), "items[1].name");
/// # Ok::<(), formstate::FormError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from segments.
    #[must_use]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Parses the canonical string form. See [`parse`].
    ///
    /// # Errors
    ///
    /// Returns [`FormError::InvalidPath`] for empty keys, unterminated or
    /// non-numeric brackets, and stray delimiters.
    pub fn parse(path: &str) -> Result<Self> {
        parse(path).map(Self)
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `key` appended.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Returns a new path with `index` appended.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    /// Returns a new path with every segment of `other` appended.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// The enclosing path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Whether `prefix` is this path or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Iterates this path's non-empty prefixes, shortest first, ending with the path itself.
    pub fn prefixes(&self) -> impl Iterator<Item = FieldPath> + '_ {
        (1..=self.0.len()).map(move |n| Self(self.0[..n].to_vec()))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(&self.0))
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Vec<Segment>> for FieldPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> FormError {
    FormError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Parses a canonical path string into segments.
///
/// `""` parses to the root (no segments). A path may start with an index
/// (`[0].name`) but never with a dot.
///
/// # Errors
///
/// Returns [`FormError::InvalidPath`] when the string is malformed.
pub fn parse(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = path.char_indices().peekable();
    let mut key = String::new();
    // Set after a `.`, where a key is mandatory.
    let mut expect_key = false;

    while let Some((pos, c)) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() {
                    if pos == 0 || expect_key {
                        return Err(invalid(path, format!("empty key at byte {pos}")));
                    }
                } else {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                expect_key = true;
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                } else if expect_key {
                    return Err(invalid(path, format!("empty key at byte {pos}")));
                }
                let mut digits = String::new();
                let mut closed = false;
                for (_, d) in chars.by_ref() {
                    if d == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(d);
                }
                if !closed {
                    return Err(invalid(path, "unterminated '['"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| invalid(path, format!("'{digits}' is not an index")))?;
                segments.push(Segment::Index(index));
                expect_key = false;
                if let Some(&(_, next)) = chars.peek() {
                    if next != '.' && next != '[' {
                        return Err(invalid(path, "expected '.' or '[' after ']'"));
                    }
                }
            }
            ']' => return Err(invalid(path, format!("unexpected ']' at byte {pos}"))),
            other => {
                key.push(other);
                expect_key = false;
            }
        }
    }

    if expect_key {
        return Err(invalid(path, "trailing '.'"));
    }
    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }
    Ok(segments)
}

/// Serializes segments into the canonical string form.
#[must_use]
pub fn serialize(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Returns true if `path` or any of its ancestors is in `dirty`.
///
/// Lets a container field show a dirty marker when it was replaced wholesale,
/// and lets leaf fields inherit it.
#[must_use]
pub fn is_path_or_parent_dirty(dirty: &BTreeSet<FieldPath>, path: &FieldPath) -> bool {
    path.prefixes().any(|prefix| dirty.contains(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_string())
    }

    #[test]
    fn parses_mixed_path() {
        let segments = parse("a.b[2].c").unwrap();
        assert_eq!(segments, vec![key("a"), key("b"), Segment::Index(2), key("c")]);
    }

    #[test]
    fn parses_root_and_leading_index() {
        assert!(parse("").unwrap().is_empty());
        assert_eq!(parse("[3].x").unwrap(), vec![Segment::Index(3), key("x")]);
        assert_eq!(parse("m[0][1]").unwrap(), vec![key("m"), Segment::Index(0), Segment::Index(1)]);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in [".a", "a.", "a..b", "a[", "a[x]", "a]", "a[0]b", "a.[0]"] {
            assert!(parse(bad).is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn serializes_canonically() {
        let segments = vec![key("users"), Segment::Index(0), key("email")];
        assert_eq!(serialize(&segments), "users[0].email");
        assert_eq!(serialize(&[Segment::Index(1)]), "[1]");
        assert_eq!(serialize(&[]), "");
    }

    #[test]
    fn dirty_prefix_lookup() {
        let mut dirty = BTreeSet::new();
        dirty.insert(FieldPath::parse("items[1]").unwrap());

        assert!(is_path_or_parent_dirty(&dirty, &"items[1].name".parse().unwrap()));
        assert!(is_path_or_parent_dirty(&dirty, &"items[1]".parse().unwrap()));
        assert!(!is_path_or_parent_dirty(&dirty, &"items[0].name".parse().unwrap()));
        assert!(!is_path_or_parent_dirty(&dirty, &"items".parse().unwrap()));
    }

    #[test]
    fn path_builders() {
        let path = FieldPath::root().key("items").index(2).key("name");
        assert_eq!(path.to_string(), "items[2].name");
        assert_eq!(path.parent().unwrap().to_string(), "items[2]");
        assert!(path.starts_with(&"items".parse().unwrap()));
        let prefixes: Vec<String> = path.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["items", "items[2]", "items[2].name"]);
    }

    fn segment_strategy() -> impl Strategy<Value = Segment> {
        prop_oneof![
            "[a-zA-Z_][a-zA-Z0-9_]{0,8}".prop_map(Segment::Key),
            (0usize..1000).prop_map(Segment::Index),
        ]
    }

    proptest! {
        #[test]
        fn round_trips(segments in proptest::collection::vec(segment_strategy(), 0..8)) {
            let text = serialize(&segments);
            prop_assert_eq!(parse(&text).unwrap(), segments);
        }
    }
}
