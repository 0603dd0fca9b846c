//! File-backed sources (TOML, YAML and JSON).
//!
//! All formats load their document lazily on first lookup and keep it for
//! the lifetime of the source. A missing file reads as an empty document
//! unless `allow_non_existent_files` is turned off.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use fieldstore_core::{SourceError, SourceResult, Value};

use crate::{check_library_name, is_identifier, Source};

/// Reads a file, mapping "not found" to `None` when allowed.
fn read_document(path: &Path, allow_missing: bool) -> SourceResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound && allow_missing => {
            tracing::debug!(path = %path.display(), "Source file not found, using empty document");
            Ok(None)
        }
        Err(e) => Err(SourceError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

// =============================================================================
// TOML SOURCE
// =============================================================================

/// A source reading keys from a TOML document, optionally from a nested table.
#[derive(Debug)]
pub struct TomlSource {
    path: PathBuf,
    table: Vec<String>,
    allow_non_existent_files: bool,
    data: OnceCell<Value>,
}

impl TomlSource {
    /// Creates a source reading top-level keys of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Vec::new(),
            allow_non_existent_files: true,
            data: OnceCell::new(),
        }
    }

    /// Reads keys from a nested table given as a dotted path (`tool.name`).
    ///
    /// Every segment must be an identifier.
    pub fn with_table(mut self, table: &str) -> SourceResult<Self> {
        let mut segments = Vec::new();
        for segment in table.split('.') {
            if !is_identifier(segment) {
                return Err(SourceError::InvalidName(format!(
                    "You can only use a subset of all valid TOML format identifiers that can be used as an identifier. You used \"{}\".",
                    segment
                )));
            }
            segments.push(segment.to_string());
        }
        self.table = segments;
        Ok(self)
    }

    /// Sets whether a missing file is an error.
    pub fn with_allow_non_existent_files(mut self, allow: bool) -> Self {
        self.allow_non_existent_files = allow;
        self
    }

    /// Standard TOML sources for a library: `name.toml`, `.name.toml` and
    /// the `tool.name` table of `pyproject.toml`.
    pub fn for_library(library_name: &str) -> SourceResult<Vec<Self>> {
        check_library_name(library_name)?;
        Ok(vec![
            Self::new(format!("{}.toml", library_name)),
            Self::new(format!(".{}.toml", library_name)),
            Self::new("pyproject.toml").with_table(&format!("tool.{}", library_name))?,
        ])
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table segments, outermost first.
    pub fn table(&self) -> &[String] {
        &self.table
    }

    /// Whether a missing file reads as empty.
    pub fn allow_non_existent_files(&self) -> bool {
        self.allow_non_existent_files
    }

    fn data(&self) -> SourceResult<&Value> {
        self.data.get_or_try_init(|| {
            let Some(text) = read_document(&self.path, self.allow_non_existent_files)? else {
                return Ok(Value::Map(Vec::new()));
            };
            let doc: toml::Value = toml::from_str(&text).map_err(|e| SourceError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
            tracing::debug!(path = %self.path.display(), "Loaded TOML source");
            Ok(Value::from(doc))
        })
    }
}

impl Source for TomlSource {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        let mut node = self.data()?;
        for segment in &self.table {
            match node.get(segment) {
                Some(next) => node = next,
                None => return Ok(None),
            }
        }
        Ok(node.get(key).cloned())
    }
}

// =============================================================================
// YAML SOURCE
// =============================================================================

/// A source reading top-level keys of a YAML mapping.
#[derive(Debug)]
pub struct YamlSource {
    path: PathBuf,
    allow_non_existent_files: bool,
    data: OnceCell<Value>,
}

impl YamlSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            allow_non_existent_files: true,
            data: OnceCell::new(),
        }
    }

    /// Sets whether a missing file is an error.
    pub fn with_allow_non_existent_files(mut self, allow: bool) -> Self {
        self.allow_non_existent_files = allow;
        self
    }

    /// Standard YAML sources for a library: `name.yaml` and `.name.yaml`.
    pub fn for_library(library_name: &str) -> SourceResult<Vec<Self>> {
        check_library_name(library_name)?;
        Ok(vec![
            Self::new(format!("{}.yaml", library_name)),
            Self::new(format!(".{}.yaml", library_name)),
        ])
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a missing file reads as empty.
    pub fn allow_non_existent_files(&self) -> bool {
        self.allow_non_existent_files
    }

    fn data(&self) -> SourceResult<&Value> {
        self.data.get_or_try_init(|| {
            let Some(text) = read_document(&self.path, self.allow_non_existent_files)? else {
                return Ok(Value::Map(Vec::new()));
            };
            // An empty document is null.
            let doc: Value = serde_yaml::from_str(&text).map_err(|e| SourceError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
            tracing::debug!(path = %self.path.display(), "Loaded YAML source");
            Ok(doc)
        })
    }
}

impl Source for YamlSource {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        Ok(self.data()?.get(key).cloned())
    }
}

// =============================================================================
// JSON SOURCE
// =============================================================================

/// A source reading top-level keys of a JSON object.
#[derive(Debug)]
pub struct JsonSource {
    path: PathBuf,
    allow_non_existent_files: bool,
    data: OnceCell<Value>,
}

impl JsonSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            allow_non_existent_files: true,
            data: OnceCell::new(),
        }
    }

    /// Sets whether a missing file is an error.
    pub fn with_allow_non_existent_files(mut self, allow: bool) -> Self {
        self.allow_non_existent_files = allow;
        self
    }

    /// Standard JSON sources for a library: `name.json` and `.name.json`.
    pub fn for_library(library_name: &str) -> SourceResult<Vec<Self>> {
        check_library_name(library_name)?;
        Ok(vec![
            Self::new(format!("{}.json", library_name)),
            Self::new(format!(".{}.json", library_name)),
        ])
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a missing file reads as empty.
    pub fn allow_non_existent_files(&self) -> bool {
        self.allow_non_existent_files
    }

    fn data(&self) -> SourceResult<&Value> {
        self.data.get_or_try_init(|| {
            let Some(text) = read_document(&self.path, self.allow_non_existent_files)? else {
                return Ok(Value::Map(Vec::new()));
            };
            let doc: Value = serde_json::from_str(&text).map_err(|e| SourceError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
            tracing::debug!(path = %self.path.display(), "Loaded JSON source");
            Ok(doc)
        })
    }
}

impl Source for JsonSource {
    fn get(&self, key: &str) -> SourceResult<Option<Value>> {
        Ok(self.data()?.get(key).cloned())
    }
}
