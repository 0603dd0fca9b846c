//! Error types for fieldstore.
//!
//! Every failure is a programmer or configuration error raised synchronously
//! at the point of violation. Nothing here is retried.

use thiserror::Error;

/// Result type for field and storage operations.
pub type FieldResult<T> = Result<T, FieldError>;

/// Result type for configuration source lookups.
pub type SourceResult<T> = Result<T, SourceError>;

/// Field and storage errors.
///
/// Value texts carried by these variants are already redacted when the field
/// involved is secret.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// A field object was bound twice, or bound under an invalid name.
    #[error("{message}")]
    Binding {
        /// Description of the binding problem.
        message: String,
    },

    /// Field options contradict each other (e.g. both `default` and
    /// `default_factory`).
    #[error("{message}")]
    Configuration {
        /// Description of the option conflict.
        message: String,
    },

    /// A value does not satisfy the declared type.
    #[error("The value \"{value}\" ({value_type}) of the \"{field}\" field does not match the type {expected}.")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Text form of the offending value.
        value: String,
        /// Type name of the offending value.
        value_type: String,
        /// The declared type.
        expected: String,
    },

    /// A value failed a validation predicate.
    #[error("{message}")]
    Validation {
        /// Field name.
        field: String,
        /// Text form of the offending value.
        value: String,
        /// Either the rule's own message or a generated one.
        message: String,
    },

    /// A value conflicts with the current value of another field.
    #[error("The value \"{value}\" of the \"{field}\" field conflicts with the value \"{other_value}\" of the \"{other}\" field.")]
    Conflict {
        /// Field being written.
        field: String,
        /// Text form of the rejected value.
        value: String,
        /// Opposing field.
        other: String,
        /// Text form of the opposing field's value.
        other_value: String,
    },

    /// A conflict rule names a field the class does not have.
    #[error("The \"{field}\" field declares a conflict with \"{other}\", which is not a field of {class}.")]
    UndefinedConflictTarget {
        /// Class being defined.
        class: String,
        /// Field declaring the conflict.
        field: String,
        /// Missing opposing field.
        other: String,
    },

    /// Write attempt on a read-only field.
    #[error("Field \"{field}\" is read-only.")]
    ReadOnly {
        /// Field name.
        field: String,
    },

    /// Fields can never be deleted.
    #[error("You can't delete the \"{field}\" attribute.")]
    Deletion {
        /// Field name.
        field: String,
    },

    /// Name is not in the class's field list.
    #[error("Field \"{field}\" is not defined in {class}.")]
    UnknownField {
        /// Class name.
        class: String,
        /// Requested name.
        field: String,
    },

    /// A configuration source failed while supplying a default.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl FieldError {
    /// Creates a binding error.
    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the name of the field the error is about, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::TypeMismatch { field, .. }
            | Self::Validation { field, .. }
            | Self::Conflict { field, .. }
            | Self::UndefinedConflictTarget { field, .. }
            | Self::ReadOnly { field }
            | Self::Deletion { field }
            | Self::UnknownField { field, .. } => Some(field),
            Self::Binding { .. } | Self::Configuration { .. } | Self::Source(_) => None,
        }
    }
}

/// Configuration source errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// The key is not present and no default was supplied.
    #[error("Key not found: {key}")]
    NotFound {
        /// Requested key.
        key: String,
    },

    /// The stored value does not satisfy the expected type.
    #[error("The value of the \"{key}\" field did not pass the type check.")]
    Type {
        /// Requested key.
        key: String,
    },

    /// Two environment variables collide once upper-cased.
    #[error("There are 2 environment variables that are written the same way when capitalized: \"{first}\" and \"{second}\".")]
    Case {
        /// First variable name.
        first: String,
        /// Second variable name.
        second: String,
    },

    /// A library name or table segment is not an identifier.
    #[error("{0}")]
    InvalidName(String),

    /// The backing file could not be read.
    #[error("I/O error reading {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error text.
        message: String,
    },

    /// The backing document is malformed.
    #[error("Parse error in {path}: {message}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error text.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_message() {
        let err = FieldError::ReadOnly {
            field: "field".into(),
        };
        assert_eq!(err.to_string(), "Field \"field\" is read-only.");
        assert_eq!(err.field(), Some("field"));
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = FieldError::TypeMismatch {
            field: "field".into(),
            value: "x".into(),
            value_type: "str".into(),
            expected: "int".into(),
        };
        assert_eq!(
            err.to_string(),
            "The value \"x\" (str) of the \"field\" field does not match the type int."
        );
    }

    #[test]
    fn test_source_error_wraps() {
        let err: FieldError = SourceError::Type { key: "port".into() }.into();
        assert!(err.field().is_none());
        assert_eq!(
            err.to_string(),
            "Source error: The value of the \"port\" field did not pass the type check."
        );
    }
}
