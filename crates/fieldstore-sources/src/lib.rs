//! # Fieldstore Sources
//!
//! Read-only key/value sources that supply external defaults to fieldstore
//! schemas.
//!
//! A [`Source`] answers two questions: "is there a value for this key?"
//! ([`Source::get`]) and "is there a value for this key that has the type I
//! expect?" ([`Source::type_awared_get`]). A [`SourcesCollection`] chains
//! sources in order and the first one holding a key wins.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use fieldstore_core::{TypeSpec, Value};
//! use fieldstore_sources::{MemorySource, Source, SourcesCollection};
//!
//! let sources = SourcesCollection::new(vec![
//!     Arc::new(MemorySource::new([("port", Value::from(8080))])),
//!     Arc::new(MemorySource::new([("port", Value::from(9090)), ("host", Value::from("db"))])),
//! ]);
//!
//! assert_eq!(sources.get("port").unwrap(), Some(Value::from(8080)));
//! assert_eq!(
//!     sources.type_awared_get("host", &TypeSpec::Str, None).unwrap(),
//!     Value::from("db")
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod collection;
mod env;
mod file;
mod memory;

use std::fmt;

pub use collection::{for_tool, SourcesCollection};
pub use env::EnvSource;
pub use file::{JsonSource, TomlSource, YamlSource};
pub use memory::MemorySource;

use fieldstore_core::{SourceError, SourceResult, TypeSpec, Value};

/// A read-only key/value lookup.
pub trait Source: fmt::Debug + Send + Sync {
    /// Returns the raw value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> SourceResult<Option<Value>>;

    /// Adapts a raw value to `hint` before the type check.
    ///
    /// Sources holding untyped text (the environment) override this; the
    /// default leaves the value untouched.
    fn coerce(&self, raw: Value, _hint: &TypeSpec) -> Value {
        raw
    }

    /// Returns the value under `key` if it matches `hint`.
    ///
    /// A missing key yields `default` when one is given and
    /// [`SourceError::NotFound`] otherwise. A present value that does not
    /// satisfy `hint` is a [`SourceError::Type`].
    fn type_awared_get(
        &self,
        key: &str,
        hint: &TypeSpec,
        default: Option<Value>,
    ) -> SourceResult<Value> {
        let Some(raw) = self.get(key)? else {
            return default.ok_or_else(|| SourceError::NotFound {
                key: key.to_string(),
            });
        };

        let value = self.coerce(raw, hint);
        if hint.matches(&value) {
            Ok(value)
        } else {
            Err(SourceError::Type {
                key: key.to_string(),
            })
        }
    }
}

/// Returns true if `name` is a valid identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rejects library names that are not identifiers.
pub(crate) fn check_library_name(name: &str) -> SourceResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SourceError::InvalidName(
            "The library name can only be a valid identifier.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("tool"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier(":library"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_default_type_awared_get() {
        let source = MemorySource::new([("key", Value::from(123))]);

        assert_eq!(
            source.type_awared_get("key", &TypeSpec::Int, None).unwrap(),
            Value::from(123)
        );
        assert_eq!(
            source.type_awared_get("key", &TypeSpec::Str, None),
            Err(SourceError::Type { key: "key".into() })
        );
        assert_eq!(
            source
                .type_awared_get("missing", &TypeSpec::Str, Some(Value::from("lol")))
                .unwrap(),
            Value::from("lol")
        );
        assert!(matches!(
            source.type_awared_get("missing", &TypeSpec::Str, None),
            Err(SourceError::NotFound { .. })
        ));
    }
}
