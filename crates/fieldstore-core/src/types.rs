//! Structural type constraints.
//!
//! A [`TypeSpec`] is the declared type of a field. The supported constraint
//! kinds are deliberately closed:
//!
//! | constraint | accepts |
//! |---|---|
//! | `Any` | every value |
//! | `None` | `Value::None` |
//! | `Bool`, `Int`, `Float`, `Str` | exactly that variant |
//! | `Optional(T)` | `Value::None` or anything `T` accepts |
//! | `List(T)` | a list whose every item is accepted by `T` |
//! | `Map(K, V)` | a map whose keys match `K` and values match `V` |
//! | `Union([T..])` | anything accepted by at least one member |
//!
//! There is no numeric widening: `Bool` is not an `Int` and `Int` is not a
//! `Float`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TypeSpec {
    /// No constraint.
    #[default]
    Any,
    /// Only `Value::None`.
    None,
    /// Booleans.
    Bool,
    /// Integers (booleans excluded).
    Int,
    /// Floats (integers excluded).
    Float,
    /// Strings.
    Str,
    /// `None` or the inner constraint.
    Optional(Box<TypeSpec>),
    /// Homogeneous list.
    List(Box<TypeSpec>),
    /// Homogeneous mapping.
    Map(Box<TypeSpec>, Box<TypeSpec>),
    /// Any of the listed constraints.
    Union(Vec<TypeSpec>),
}

impl TypeSpec {
    /// `Optional[inner]`.
    pub fn optional(inner: TypeSpec) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// `list[item]`.
    pub fn list(item: TypeSpec) -> Self {
        Self::List(Box::new(item))
    }

    /// `dict[key, value]`.
    pub fn map(key: TypeSpec, value: TypeSpec) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// `Union[members..]`.
    pub fn union(members: impl IntoIterator<Item = TypeSpec>) -> Self {
        Self::Union(members.into_iter().collect())
    }

    /// Returns true if `value` satisfies this constraint.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::None, Value::None) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Str, Value::Str(_)) => true,
            (Self::Optional(_), Value::None) => true,
            (Self::Optional(inner), other) => inner.matches(other),
            (Self::List(item), Value::List(items)) => items.iter().all(|v| item.matches(v)),
            (Self::Map(key, val), Value::Map(entries)) => entries
                .iter()
                .all(|(k, v)| key.matches(k) && val.matches(v)),
            (Self::Union(members), other) => members.iter().any(|m| m.matches(other)),
            _ => false,
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::None => write!(f, "None"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "str"),
            Self::Optional(inner) => write!(f, "Optional[{}]", inner),
            Self::List(item) => write!(f, "list[{}]", item),
            Self::Map(key, val) => write!(f, "dict[{}, {}]", key, val),
            Self::Union(members) => {
                write!(f, "Union[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_matches() {
        assert!(TypeSpec::Int.matches(&Value::Int(1)));
        assert!(!TypeSpec::Int.matches(&Value::from("x")));
        assert!(TypeSpec::Str.matches(&Value::from("x")));
        assert!(TypeSpec::Float.matches(&Value::Float(0.5)));
        assert!(TypeSpec::None.matches(&Value::None));
        assert!(!TypeSpec::None.matches(&Value::Int(0)));
    }

    #[test]
    fn test_bool_is_not_an_int() {
        assert!(!TypeSpec::Int.matches(&Value::Bool(true)));
        assert!(!TypeSpec::Bool.matches(&Value::Int(1)));
    }

    #[test]
    fn test_int_is_not_a_float() {
        assert!(!TypeSpec::Float.matches(&Value::Int(1)));
        assert!(TypeSpec::union([TypeSpec::Int, TypeSpec::Float]).matches(&Value::Int(1)));
    }

    #[test]
    fn test_optional() {
        let spec = TypeSpec::optional(TypeSpec::Int);
        assert!(spec.matches(&Value::None));
        assert!(spec.matches(&Value::Int(3)));
        assert!(!spec.matches(&Value::from("3")));
    }

    #[test]
    fn test_nested_containers() {
        let spec = TypeSpec::map(TypeSpec::Str, TypeSpec::list(TypeSpec::Int));
        let good = Value::Map(vec![
            (Value::from("a"), Value::from(vec![1, 2])),
            (Value::from("b"), Value::List(vec![])),
        ]);
        let bad = Value::Map(vec![(Value::from("a"), Value::from(vec!["1"]))]);
        assert!(spec.matches(&good));
        assert!(!spec.matches(&bad));
        assert!(!spec.matches(&Value::from(vec![1])));
    }

    #[test]
    fn test_any_accepts_everything() {
        assert!(TypeSpec::Any.matches(&Value::None));
        assert!(TypeSpec::list(TypeSpec::Any).matches(&Value::List(vec![
            Value::Int(1),
            Value::from("x"),
        ])));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeSpec::Int.to_string(), "int");
        assert_eq!(TypeSpec::optional(TypeSpec::Str).to_string(), "Optional[str]");
        assert_eq!(
            TypeSpec::map(TypeSpec::Str, TypeSpec::list(TypeSpec::Float)).to_string(),
            "dict[str, list[float]]"
        );
        assert_eq!(
            TypeSpec::union([TypeSpec::Int, TypeSpec::Str]).to_string(),
            "Union[int, str]"
        );
    }
}
