//! # Fieldstore Core
//!
//! Shared building blocks for the fieldstore attribute engine:
//!
//! - **Values**: the closed, dynamically typed [`Value`] every field stores
//! - **Type constraints**: [`TypeSpec`] and its recursive structural matcher
//! - **Errors**: [`FieldError`] for field/storage operations and
//!   [`SourceError`] for configuration source lookups
//!
//! ## Example
//!
//! ```rust
//! use fieldstore_core::{TypeSpec, Value};
//!
//! let spec = TypeSpec::list(TypeSpec::Int);
//! assert!(spec.matches(&Value::from(vec![1, 2, 3])));
//! assert!(!spec.matches(&Value::from(vec!["1"])));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod types;
pub mod value;

pub use error::{FieldError, FieldResult, SourceError, SourceResult};
pub use types::TypeSpec;
pub use value::{Value, REDACTED};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{FieldError, FieldResult, SourceError, SourceResult};
    pub use crate::types::TypeSpec;
    pub use crate::value::Value;
}
