//! Class definitions.
//!
//! A [`Schema`] is the immutable, per-class metadata every [`Storage`]
//! instance shares: the ordered field list, the field registry, the
//! reverse-conflict table and the lock grouping plan. It is produced once by
//! [`SchemaBuilder::build`], which binds the declared fields, resolves
//! inheritance and validates conflict rules. After that nothing in a schema
//! changes, so it is read without synchronization.
//!
//! [`Storage`]: crate::Storage

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use fieldstore_core::{FieldError, FieldResult, TypeSpec, Value};
use fieldstore_sources::{Source, SourcesCollection};

use crate::field::Field;

// =============================================================================
// SCHEMA
// =============================================================================

/// Field metadata of one class.
pub struct Schema {
    id: Uuid,
    name: String,
    parent: Option<Arc<Schema>>,
    field_names: Vec<String>,
    fields: HashMap<String, Arc<Field>>,
    reverse_conflicts: HashMap<String, Vec<String>>,
    /// Lock group index per entry of `field_names`.
    lock_groups: Vec<usize>,
    group_count: usize,
}

impl Schema {
    /// Starts a class definition.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Unique identity of this class.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent class, if any.
    pub fn parent(&self) -> Option<&Arc<Schema>> {
        self.parent.as_ref()
    }

    /// Ordered field names: inherited names first, then own declarations.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Returns true if `name` is a field of this class.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The field registered under `name`, after inheritance resolution.
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.get(name)
    }

    pub(crate) fn require_field(&self, name: &str) -> FieldResult<&Arc<Field>> {
        self.fields.get(name).ok_or_else(|| FieldError::UnknownField {
            class: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Fields that declare a symmetric conflict against `name`.
    pub fn reverse_conflicts(&self, name: &str) -> &[String] {
        self.reverse_conflicts
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if this schema is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &Schema) -> bool {
        let mut current = Some(self);
        while let Some(schema) = current {
            if schema.id == other.id {
                return true;
            }
            current = schema.parent.as_deref();
        }
        false
    }

    /// Lock group index of each field, aligned with
    /// [`field_names`](Self::field_names), and the number of groups.
    pub(crate) fn lock_plan(&self) -> (&[usize], usize) {
        (&self.lock_groups, self.group_count)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("field_names", &self.field_names)
            .field("reverse_conflicts", &self.reverse_conflicts)
            .finish()
    }
}

// =============================================================================
// SCHEMA BUILDER
// =============================================================================

/// Builder for [`Schema`].
///
/// Declaration problems are recorded as they are found and only the first is
/// returned from [`build`](Self::build).
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    parent: Option<Arc<Schema>>,
    declared: Vec<(String, Arc<Field>)>,
    sources: Option<SourcesCollection>,
    error: Option<FieldError>,
}

impl SchemaBuilder {
    /// Starts a class definition named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            declared: Vec::new(),
            sources: None,
            error: None,
        }
    }

    /// Inherits the fields of `parent`.
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Declares `field` under `name`.
    pub fn field(mut self, name: impl Into<String>, field: &Arc<Field>) -> Self {
        let name = name.into();
        if self.declared.iter().any(|(declared, _)| *declared == name) {
            self.record(FieldError::binding(format!(
                "Field \"{}\" is declared twice in {}.",
                name, self.name
            )));
        } else {
            self.declared.push((name, Arc::clone(field)));
        }
        self
    }

    /// Supplies external defaults: every declared field whose name exists in
    /// `sources` takes its default from there.
    pub fn sources(mut self, sources: SourcesCollection) -> Self {
        self.sources = Some(sources);
        self
    }

    fn record(&mut self, error: FieldError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Binds the declared fields and runs the class-definition checks.
    pub fn build(mut self) -> FieldResult<Arc<Schema>> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let id = Uuid::new_v4();

        for (name, field) in &self.declared {
            let source_default = match &self.sources {
                Some(sources) => lookup_default(sources, name, field.declared_type())?,
                None => None,
            };
            field.bind(&self.name, id, name, source_default)?;
        }

        let (field_names, fields) = resolve_fields(self.parent.as_deref(), &self.declared);
        let reverse_conflicts = build_reverse_conflicts(&self.name, &field_names, &fields)?;
        check_default_conflicts(&field_names, &fields)?;
        let (lock_groups, group_count) = plan_lock_groups(&field_names, &fields);

        tracing::debug!(
            class = %self.name,
            fields = field_names.len(),
            lock_groups = group_count,
            "Built schema"
        );

        Ok(Arc::new(Schema {
            id,
            name: self.name,
            parent: self.parent,
            field_names,
            fields,
            reverse_conflicts,
            lock_groups,
            group_count,
        }))
    }
}

/// Fetches a source-backed default for `name`, if any source has one.
fn lookup_default(
    sources: &SourcesCollection,
    name: &str,
    declared_type: Option<&TypeSpec>,
) -> FieldResult<Option<Value>> {
    if sources.get(name)?.is_none() {
        return Ok(None);
    }
    let hint = declared_type.cloned().unwrap_or_default();
    let value = sources.type_awared_get(name, &hint, None)?;
    tracing::debug!(field = name, "Default supplied by configuration source");
    Ok(Some(value))
}

/// Parent's ordered list, then own names not already present. A redeclared
/// name keeps its inherited position but resolves to the new field.
fn resolve_fields(
    parent: Option<&Schema>,
    declared: &[(String, Arc<Field>)],
) -> (Vec<String>, HashMap<String, Arc<Field>>) {
    let (mut names, mut fields) = match parent {
        Some(parent) => (parent.field_names.clone(), parent.fields.clone()),
        None => (Vec::new(), HashMap::new()),
    };

    for (name, field) in declared {
        if fields.insert(name.clone(), Arc::clone(field)).is_none() {
            names.push(name.clone());
        }
    }

    (names, fields)
}

/// target field -> fields declaring a symmetric conflict against it.
fn build_reverse_conflicts(
    class: &str,
    names: &[String],
    fields: &HashMap<String, Arc<Field>>,
) -> FieldResult<HashMap<String, Vec<String>>> {
    let mut reverse: HashMap<String, Vec<String>> = HashMap::new();

    for name in names {
        let field = &fields[name];
        for other in field.conflict_targets() {
            if !fields.contains_key(other) {
                return Err(FieldError::UndefinedConflictTarget {
                    class: class.to_string(),
                    field: name.clone(),
                    other: other.to_string(),
                });
            }
            if field.has_reverse_conflicts() {
                reverse
                    .entry(other.to_string())
                    .or_default()
                    .push(name.clone());
            }
        }
    }

    Ok(reverse)
}

/// Defaults must never contradict each other.
fn check_default_conflicts(
    names: &[String],
    fields: &HashMap<String, Arc<Field>>,
) -> FieldResult<()> {
    for name in names {
        let field = &fields[name];
        if !field.has_reverse_conflicts() {
            continue;
        }
        for other in field.conflict_targets() {
            let other_field = &fields[other];
            let Some(predicate) = field.conflict_with(other) else {
                continue;
            };
            let own = field.default_value()?;
            let theirs = other_field.default_value()?;
            if predicate(&own, &own, &theirs, &theirs) {
                return Err(FieldError::Conflict {
                    field: name.clone(),
                    value: own.redacted_text(field.is_secret()),
                    other: other.to_string(),
                    other_value: theirs.redacted_text(other_field.is_secret()),
                });
            }
        }
    }
    Ok(())
}

/// Groups fields connected by conflict declarations so each group shares a
/// single lock.
fn plan_lock_groups(
    names: &[String],
    fields: &HashMap<String, Arc<Field>>,
) -> (Vec<usize>, usize) {
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut parent: Vec<usize> = (0..names.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (i, name) in names.iter().enumerate() {
        for other in fields[name].conflict_targets() {
            if let Some(&j) = index.get(other) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups = Vec::with_capacity(names.len());
    for i in 0..names.len() {
        let root = find(&mut parent, i);
        let next = group_of_root.len();
        groups.push(*group_of_root.entry(root).or_insert(next));
    }

    let count = group_of_root.len();
    (groups, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: &Value, _: &Value, _: &Value, _: &Value) -> bool {
        false
    }

    #[test]
    fn test_field_list_order() {
        let schema = Schema::builder("Config")
            .field("b", &Field::with_default(1))
            .field("a", &Field::with_default(2))
            .build()
            .unwrap();
        assert_eq!(schema.field_names(), ["b".to_string(), "a".to_string()]);
        assert!(schema.contains("a"));
        assert!(!schema.contains("c"));
    }

    #[test]
    fn test_declared_twice() {
        let result = Schema::builder("Config")
            .field("a", &Field::with_default(1))
            .field("a", &Field::with_default(2))
            .build();
        assert!(matches!(result, Err(FieldError::Binding { .. })));
    }

    #[test]
    fn test_reserved_name_aborts_build() {
        let result = Schema::builder("Config")
            .field("_hidden", &Field::with_default(1))
            .build();
        assert_eq!(
            result.unwrap_err().to_string(),
            "Field name \"_hidden\" cannot start with an underscore."
        );
    }

    #[test]
    fn test_reverse_conflict_table() {
        let b = Field::builder()
            .default(2)
            .conflicts("a", never)
            .build()
            .unwrap();
        let c = Field::builder()
            .default(3)
            .conflicts("a", never)
            .reverse_conflicts(false)
            .build()
            .unwrap();
        let schema = Schema::builder("Config")
            .field("a", &Field::with_default(1))
            .field("b", &b)
            .field("c", &c)
            .build()
            .unwrap();

        assert_eq!(schema.reverse_conflicts("a"), ["b".to_string()]);
        assert!(schema.reverse_conflicts("b").is_empty());
    }

    #[test]
    fn test_undefined_conflict_target() {
        let b = Field::builder()
            .default(2)
            .conflicts("missing", never)
            .build()
            .unwrap();
        let result = Schema::builder("Config").field("b", &b).build();
        assert!(matches!(
            result,
            Err(FieldError::UndefinedConflictTarget { ref other, .. }) if other == "missing"
        ));
    }

    #[test]
    fn test_conflicting_defaults_abort_build() {
        let b = Field::builder()
            .default(1)
            .conflicts("a", |_, new_self, _, new_other| new_self == new_other)
            .build()
            .unwrap();
        let result = Schema::builder("Config")
            .field("a", &Field::with_default(1))
            .field("b", &b)
            .build();
        assert!(matches!(result, Err(FieldError::Conflict { .. })));
    }

    #[test]
    fn test_conflicting_defaults_allowed_without_symmetry() {
        let b = Field::builder()
            .default(1)
            .conflicts("a", |_, new_self, _, new_other| new_self == new_other)
            .reverse_conflicts(false)
            .build()
            .unwrap();
        let result = Schema::builder("Config")
            .field("a", &Field::with_default(1))
            .field("b", &b)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_lock_groups_are_transitive() {
        let b = Field::builder()
            .default(2)
            .conflicts("a", never)
            .build()
            .unwrap();
        let c = Field::builder()
            .default(3)
            .conflicts("b", never)
            .build()
            .unwrap();
        let schema = Schema::builder("Config")
            .field("a", &Field::with_default(1))
            .field("b", &b)
            .field("c", &c)
            .field("d", &Field::with_default(4))
            .build()
            .unwrap();

        let (groups, count) = schema.lock_plan();
        assert_eq!(count, 2);
        assert_eq!(groups[0], groups[1]);
        assert_eq!(groups[1], groups[2]);
        assert_ne!(groups[2], groups[3]);
    }

    #[test]
    fn test_is_subclass_of() {
        let base = Schema::builder("Base")
            .field("a", &Field::with_default(1))
            .build()
            .unwrap();
        let child = Schema::builder("Child")
            .extends(&base)
            .field("b", &Field::with_default(2))
            .build()
            .unwrap();

        assert!(child.is_subclass_of(&base));
        assert!(child.is_subclass_of(&child));
        assert!(!base.is_subclass_of(&child));
        assert_eq!(child.parent().map(|p| p.name()), Some("Base"));
    }
}
