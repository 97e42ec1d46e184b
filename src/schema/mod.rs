//! Field definitions, validators and the error router.
//!
//! This layer describes what a form contains and how its encoded values are
//! checked. It knows nothing about runtime state: the `app` layer feeds it
//! values and consumes the routed errors.
//!
//! # Modules
//!
//! - [`issue`]: Issue trees and schema shapes
//! - [`validator`]: The validator contract and stock validators
//! - [`field`]: Scalar and array field definitions
//! - [`builder`]: Form composition and the compiled form schema
//! - [`router`]: Mapping issues onto field paths

pub mod builder;
pub mod field;
pub mod issue;
pub mod router;
pub mod validator;

pub use builder::{build_schema, FormBuilder, FormSchema, RefinementFailure};
pub use field::{make_array_field, make_field, ArrayFieldDef, FieldDef, FieldKind, ItemSchema};
pub use issue::{Ast, Issue};
pub use router::{route_errors, route_errors_with_source, ErrorEntry, ErrorMap, ErrorSource};
pub use validator::{CancelToken, SharedValidator, Validator, ValidatorExt};
