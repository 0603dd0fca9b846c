//! Storage instances.
//!
//! A [`Storage`] holds the per-instance state of one object of a
//! [`Schema`]: a value map and one [`FieldLock`] per field, with fields that
//! are connected by conflict rules sharing a lock. All reads and writes go
//! through the field descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use fieldstore_core::{FieldError, FieldResult, Value};

use crate::field::Field;
use crate::lock::FieldLock;
use crate::schema::Schema;

/// One instance of a declarative class.
pub struct Storage {
    schema: Arc<Schema>,
    values: DashMap<String, Value>,
    locks: HashMap<String, Arc<FieldLock>>,
}

impl Storage {
    /// Creates an instance holding only defaults.
    pub fn new(schema: &Arc<Schema>) -> FieldResult<Self> {
        Self::with_overrides(schema, std::iter::empty::<(String, Value)>())
    }

    /// Creates an instance and applies `overrides` in order through the
    /// normal write path. Read-only fields accept their constructor value.
    pub fn with_overrides<K, V>(
        schema: &Arc<Schema>,
        overrides: impl IntoIterator<Item = (K, V)>,
    ) -> FieldResult<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let storage = Self {
            schema: Arc::clone(schema),
            values: DashMap::new(),
            locks: allocate_locks(schema),
        };

        for name in schema.field_names() {
            let field = schema.require_field(name)?;
            if let Some(value) = field.instance_default()? {
                storage.values.insert(name.clone(), value);
            }
        }

        for (name, value) in overrides {
            let name = name.into();
            let field = schema.field(&name).ok_or_else(|| FieldError::UnknownField {
                class: schema.name().to_string(),
                field: name.clone(),
            })?;
            field.write(&storage, value.into(), true)?;
        }

        Ok(storage)
    }

    /// The class of this instance.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Ordered field names of the class.
    pub fn field_names(&self) -> &[String] {
        self.schema.field_names()
    }

    /// Reads field `name`.
    pub fn get(&self, name: &str) -> FieldResult<Value> {
        self.schema.require_field(name)?.get(self)
    }

    /// Writes field `name`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> FieldResult<()> {
        self.schema.require_field(name)?.set(self, value)
    }

    /// Always fails: fields cannot be removed.
    pub fn delete(&self, name: &str) -> FieldResult<()> {
        self.schema.require_field(name)?.delete(self)
    }

    /// The lock guarding field `name`, for instrumentation.
    pub fn field_lock(&self, name: &str) -> Option<&Arc<FieldLock>> {
        self.locks.get(name)
    }

    pub(crate) fn lock_for(&self, name: &str) -> FieldResult<&Arc<FieldLock>> {
        self.locks.get(name).ok_or_else(|| FieldError::UnknownField {
            class: self.schema.name().to_string(),
            field: name.to_string(),
        })
    }

    pub(crate) fn values(&self) -> &DashMap<String, Value> {
        &self.values
    }

    /// Ordered `(name, value)` pairs, read through the normal get path.
    pub fn to_pairs(&self) -> FieldResult<Vec<(String, Value)>> {
        self.schema
            .field_names()
            .iter()
            .map(|name| Ok((name.clone(), self.get(name)?)))
            .collect()
    }

    fn fields(&self) -> impl Iterator<Item = (&str, &Arc<Field>)> {
        self.schema
            .field_names()
            .iter()
            .filter_map(|name| self.schema.field(name).map(|f| (name.as_str(), f)))
    }
}

/// One lock per lock group, mapped by field name.
fn allocate_locks(schema: &Schema) -> HashMap<String, Arc<FieldLock>> {
    let (groups, count) = schema.lock_plan();
    let shared: Vec<Arc<FieldLock>> = (0..count).map(|_| Arc::new(FieldLock::new())).collect();
    schema
        .field_names()
        .iter()
        .zip(groups)
        .map(|(name, &group)| (name.clone(), Arc::clone(&shared[group])))
        .collect()
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.schema.name())?;
        for (i, (name, field)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let value = field.get(self).map_err(|_| fmt::Error)?;
            write!(f, "{}={}", name, field.text_repr(&value))?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
