//! Environment variable source.

use std::collections::HashMap;

use once_cell::sync::OnceCell;

use fieldstore_core::{SourceError, SourceResult, TypeSpec, Value};

use crate::{check_library_name, Source};

/// A source reading `prefix + key + postfix` from the process environment.
///
/// The environment is snapshotted on first lookup. Unless `case_sensitive` is
/// set, names are compared upper-cased, and two variables that differ only
/// in case but hold different values are rejected with
/// [`SourceError::Case`].
#[derive(Debug, Default)]
pub struct EnvSource {
    prefix: String,
    postfix: String,
    case_sensitive: bool,
    vars: Option<Vec<(String, String)>>,
    data: OnceCell<HashMap<String, String>>,
}

impl EnvSource {
    /// Creates a case-insensitive source with no prefix or postfix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix prepended to every key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the postfix appended to every key.
    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into();
        self
    }

    /// Sets case sensitivity.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Reads from the given variables instead of the process environment.
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Standard environment source for a library: prefix `NAME_`.
    pub fn for_library(library_name: &str) -> SourceResult<Vec<Self>> {
        check_library_name(library_name)?;
        Ok(vec![
            Self::new().with_prefix(format!("{}_", library_name.to_uppercase()))
        ])
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The key postfix.
    pub fn postfix(&self) -> &str {
        &self.postfix
    }

    /// Whether lookups are case sensitive.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn data(&self) -> SourceResult<&HashMap<String, String>> {
        self.data.get_or_try_init(|| {
            let vars = match &self.vars {
                Some(vars) => vars.clone(),
                None => std::env::vars().collect(),
            };
            self.normalize(vars)
        })
    }

    fn normalize(&self, vars: Vec<(String, String)>) -> SourceResult<HashMap<String, String>> {
        if self.case_sensitive {
            return Ok(vars.into_iter().collect());
        }

        let mut seen: HashMap<String, (String, String)> = HashMap::with_capacity(vars.len());
        for (name, value) in vars {
            let upper = name.to_uppercase();
            if let Some((other_name, other_value)) = seen.get(&upper) {
                if *other_value != value {
                    let (first, second) = if *other_name < name {
                        (other_name.clone(), name)
                    } else {
                        (name, other_name.clone())
                    };
                    return Err(SourceError::Case { first, second });
                }
                continue;
            }
            seen.insert(upper, (name, value));
        }

        Ok(seen
            .into_iter()
            .map(|(upper, (_, value))| (upper, value))
            .collect())
    }

    fn full_name(&self, key: &str) -> String {
        let name = format!("{}{}{}", self.prefix, key, self.postfix);
        if self.case_sensitive {
            name
        } else {
            name.to_uppercase()
        }
    }
}

impl Source for EnvSource {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        let name = self.full_name(key);
        Ok(self.data()?.get(&name).cloned().map(Value::Str))
    }

    fn coerce(&self, raw: Value, hint: &TypeSpec) -> Value {
        match raw {
            Value::Str(text) => parse_text(&text, hint).unwrap_or(Value::Str(text)),
            other => other,
        }
    }
}

/// Interprets environment text according to the expected type.
fn parse_text(text: &str, hint: &TypeSpec) -> Option<Value> {
    match hint {
        TypeSpec::Any | TypeSpec::Str => Some(Value::Str(text.to_string())),
        TypeSpec::Int => text.trim().parse().ok().map(Value::Int),
        TypeSpec::Float => text.trim().parse().ok().map(Value::Float),
        TypeSpec::Bool => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeSpec::None => match text.trim().to_lowercase().as_str() {
            "" | "none" | "null" => Some(Value::None),
            _ => None,
        },
        TypeSpec::Optional(inner) => {
            parse_text(text, &TypeSpec::None).or_else(|| parse_text(text, inner))
        }
        TypeSpec::List(_) | TypeSpec::Map(..) => serde_json::from_str::<Value>(text).ok(),
        TypeSpec::Union(members) => members
            .iter()
            .find_map(|m| parse_text(text, m).filter(|v| m.matches(v))),
    }
}
