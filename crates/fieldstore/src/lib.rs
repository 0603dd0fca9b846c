//! # Fieldstore
//!
//! Declarative attribute storage: a class declares named, typed, validated
//! fields, and every instance keeps their values in a concurrency-safe store.
//!
//! # Features
//!
//! - **Fields**: defaults or default factories, type constraints, conversion,
//!   validation predicates, read-only and secret flags, change actions
//! - **Conflict rules**: predicates across two fields, enforced atomically and
//!   (by default) symmetrically
//! - **Per-field locking**: one lock per field per instance, shared by fields
//!   connected through conflict rules
//! - **Inheritance**: subclasses extend the parent's ordered field list
//! - **External defaults**: optional [`SourcesCollection`] lookups at class
//!   definition time
//!
//! # Example
//!
//! ```rust
//! use fieldstore::{Field, Schema, Storage, TypeSpec, Value};
//!
//! let schema = Schema::builder("Config")
//!     .field(
//!         "port",
//!         &Field::builder()
//!             .default(8080)
//!             .typed(TypeSpec::Int)
//!             .validation(|v| v.as_int().is_some_and(|p| p > 0))
//!             .build()
//!             .unwrap(),
//!     )
//!     .field(
//!         "password",
//!         &Field::builder()
//!             .default("")
//!             .typed(TypeSpec::Str)
//!             .secret(true)
//!             .build()
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let config = Storage::with_overrides(&schema, [("port", 9000)]).unwrap();
//! assert_eq!(config.get("port").unwrap(), Value::Int(9000));
//! assert!(config.set("port", -1).is_err());
//! assert_eq!(config.to_string(), "Config(port=9000, password=***)");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod field;
mod lock;
mod schema;
mod storage;

pub use field::{
    ChangeAction, ConflictPredicate, Conversion, DefaultFactory, Field, FieldBuilder, Validator,
};
pub use lock::FieldLock;
pub use schema::{Schema, SchemaBuilder};
pub use storage::Storage;

pub use fieldstore_core::{FieldError, FieldResult, SourceError, SourceResult, TypeSpec, Value};
pub use fieldstore_sources as sources;
pub use fieldstore_sources::{Source, SourcesCollection};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::field::{Field, FieldBuilder};
    pub use crate::schema::{Schema, SchemaBuilder};
    pub use crate::storage::Storage;
    pub use fieldstore_core::{FieldError, FieldResult, TypeSpec, Value};
}
