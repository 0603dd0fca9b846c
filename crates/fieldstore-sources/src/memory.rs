//! In-memory source.

use std::collections::HashMap;

use fieldstore_core::{SourceResult, Value};

use crate::Source;

/// A source backed by an in-memory map.
///
/// Useful for tests and for defaults computed by the host program.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: HashMap<String, Value>,
}

impl MemorySource {
    /// Creates a source from key/value pairs.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            data: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the source holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Source for MemorySource {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        Ok(self.data.get(key).cloned())
    }
}
