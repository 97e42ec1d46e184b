//! Domain layer for the form-state engine.
//!
//! This module contains the core value types the rest of the crate operates on,
//! independent of validation policy or any rendering layer.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases
//! - [`path`]: Field path parsing, serialization and dirty-prefix lookup
//! - [`value`]: Encoded value trees with structural sharing
//!
//! # Examples
//!
//! ```
//! use formstate::domain::{FieldPath, FormValue, Result};
//!
//! fn rename(tree: &FormValue) -> Result<FormValue> {
//!     tree.set(&FieldPath::parse("user.name")?, "Ada".into())
//! }
//!
//! let tree = rename(&FormValue::record())?;
//! assert_eq!(tree.get(&FieldPath::parse("user.name")?), Some(&FormValue::from("Ada")));
//! # Ok::<(), formstate::FormError>(())
//! ```

pub mod error;
pub mod path;
pub mod value;

pub use error::{FormError, Result};
pub use path::{FieldPath, Segment};
pub use value::FormValue;
