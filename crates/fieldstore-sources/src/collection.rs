//! Ordered source chains.

use std::sync::Arc;

use fieldstore_core::{SourceError, SourceResult, TypeSpec, Value};

use crate::{EnvSource, JsonSource, Source, TomlSource, YamlSource};

/// An ordered list of sources; the first source holding a key wins.
#[derive(Debug, Clone, Default)]
pub struct SourcesCollection {
    sources: Vec<Arc<dyn Source>>,
}

impl SourcesCollection {
    /// Creates a collection from sources in priority order.
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }

    /// Appends a source with the lowest priority so far.
    pub fn push(&mut self, source: impl Source + 'static) {
        self.sources.push(Arc::new(source));
    }

    /// Builder variant of [`push`](Self::push).
    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.push(source);
        self
    }

    /// The sources, highest priority first.
    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if there are no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns the value under `key`, or `default` if no source has it.
    pub fn get_or(&self, key: &str, default: Value) -> SourceResult<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

impl Source for SourcesCollection {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        for source in &self.sources {
            if let Some(value) = source.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Delegates to the first source holding `key`, so that source's own
    /// coercion rules apply.
    fn type_awared_get(
        &self,
        key: &str,
        hint: &TypeSpec,
        default: Option<Value>,
    ) -> SourceResult<Value> {
        for source in &self.sources {
            if source.get(key)?.is_some() {
                return source.type_awared_get(key, hint, default);
            }
        }
        default.ok_or_else(|| SourceError::NotFound {
            key: key.to_string(),
        })
    }
}

/// The standard source chain for a tool: environment (`NAME_` prefix), then
/// `name.toml`, `.name.toml`, `pyproject.toml [tool.name]`, then `name.yaml`,
/// `.name.yaml`, then `name.json` and `.name.json`.
pub fn for_tool(tool_name: &str) -> SourceResult<SourcesCollection> {
    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    for source in EnvSource::for_library(tool_name)? {
        sources.push(Arc::new(source));
    }
    for source in TomlSource::for_library(tool_name)? {
        sources.push(Arc::new(source));
    }
    for source in YamlSource::for_library(tool_name)? {
        sources.push(Arc::new(source));
    }
    for source in JsonSource::for_library(tool_name)? {
        sources.push(Arc::new(source));
    }
    Ok(SourcesCollection::new(sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    fn collection(sources: Vec<MemorySource>) -> SourcesCollection {
        SourcesCollection::new(
            sources
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn Source>)
                .collect(),
        )
    }

    fn empty() -> MemorySource {
        MemorySource::default()
    }

    fn with_key(value: &str) -> MemorySource {
        MemorySource::new([("key", value)])
    }

    #[test]
    fn test_there_is_no_that_key() {
        let sources = collection(vec![empty(), empty(), empty()]);
        assert_eq!(sources.get("key").unwrap(), None);
        assert_eq!(
            sources.get_or("key", Value::from("value")).unwrap(),
            Value::from("value")
        );
    }

    #[test]
    fn test_key_in_any_single_source() {
        for position in 0..3 {
            let mut layers = vec![empty(), empty(), empty()];
            layers[position] = with_key("value");
            let sources = collection(layers);
            assert_eq!(sources.get("key").unwrap(), Some(Value::from("value")));
            assert_eq!(
                sources.get_or("key", Value::from("another_value")).unwrap(),
                Value::from("value")
            );
        }
    }

    #[test]
    fn test_shading_sources() {
        for position in 0..3 {
            let mut layers = vec![empty(), empty(), empty(), with_key("second_value")];
            layers[position] = with_key("value");
            let sources = collection(layers);
            assert_eq!(sources.get("key").unwrap(), Some(Value::from("value")));
        }
    }

    #[test]
    fn test_type_awared_get() {
        let sources = collection(vec![empty(), with_key("kek"), empty()]);
        assert_eq!(
            sources.type_awared_get("key", &TypeSpec::Str, None).unwrap(),
            Value::from("kek")
        );
        assert_eq!(
            sources
                .type_awared_get("key2", &TypeSpec::Str, Some(Value::from("lol")))
                .unwrap(),
            Value::from("lol")
        );
        assert_eq!(
            sources.type_awared_get("key", &TypeSpec::Int, None),
            Err(SourceError::Type { key: "key".into() })
        );
    }

    #[test]
    fn test_type_awared_get_uses_owning_source_coercion() {
        let sources = SourcesCollection::default()
            .with_source(empty())
            .with_source(EnvSource::new().with_vars([("KEY", "42")]));
        assert_eq!(
            sources.type_awared_get("key", &TypeSpec::Int, None).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn test_for_tool_order() {
        let sources = for_tool("kek").unwrap();
        let described: Vec<String> = sources
            .sources()
            .iter()
            .map(|source| format!("{:?}", source))
            .collect();

        assert_eq!(described.len(), 8);
        assert!(described[0].starts_with("EnvSource") && described[0].contains("\"KEK_\""));
        let expected = [
            (1, "TomlSource", "\"kek.toml\""),
            (2, "TomlSource", "\".kek.toml\""),
            (3, "TomlSource", "\"pyproject.toml\""),
            (4, "YamlSource", "\"kek.yaml\""),
            (5, "YamlSource", "\".kek.yaml\""),
            (6, "JsonSource", "\"kek.json\""),
            (7, "JsonSource", "\".kek.json\""),
        ];
        for (index, kind, path) in expected {
            assert!(described[index].starts_with(kind), "{}", described[index]);
            assert!(described[index].contains(path), "{}", described[index]);
        }
        assert!(described[3].contains("\"tool\", \"kek\""));
        assert!(for_tool("not a name").is_err());
    }
}
