//! Field descriptors.
//!
//! A [`Field`] owns the metadata of one named attribute and mediates every
//! read and write of that attribute on every [`Storage`] of its class. Fields
//! are built once with a [`FieldBuilder`], shared as `Arc<Field>`, and bound
//! to exactly one [`Schema`](crate::Schema) when that schema is built.
//!
//! # Write pipeline
//!
//! 1. Read-only fields are rejected before any lock is taken.
//! 2. Outside the lock: type check, conversion, type check of the converted
//!    value, validation.
//! 3. Under the field lock: read the old value, evaluate declared and reverse
//!    conflicts against the current values of the opposing fields, commit,
//!    and run the change action if the value changed.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use uuid::Uuid;

use fieldstore_core::{FieldError, FieldResult, TypeSpec, Value};

use crate::storage::Storage;

/// Produces a fresh default value for every instance.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Validation predicate; `true` means the value is acceptable.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Conflict predicate `(old_self, new_self, old_other, new_other)`; `true`
/// means the combination is invalid.
pub type ConflictPredicate = Arc<dyn Fn(&Value, &Value, &Value, &Value) -> bool + Send + Sync>;

/// Callback run after a committed change with `(old, new, instance)`.
pub type ChangeAction = Arc<dyn Fn(&Value, &Value, &Storage) + Send + Sync>;

/// Pure transform applied to every incoming value.
pub type Conversion = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Clone)]
enum FieldDefault {
    Value(Value),
    Factory(DefaultFactory),
}

#[derive(Clone)]
struct ValidationRule {
    message: Option<String>,
    predicate: Validator,
}

#[derive(Debug)]
struct Binding {
    name: String,
    class: String,
    class_id: Uuid,
    /// Prepared literal default; `None` for factory fields.
    default: Option<Value>,
}

// =============================================================================
// FIELD
// =============================================================================

/// A declared attribute: default, type constraint, validation, conflict
/// rules, locking policy and secrecy.
pub struct Field {
    default: FieldDefault,
    declared_type: Option<TypeSpec>,
    read_only: bool,
    doc: Option<String>,
    validation: Vec<ValidationRule>,
    validate_default: bool,
    secret: bool,
    on_change: Option<ChangeAction>,
    read_lock: bool,
    conflicts: Vec<(String, ConflictPredicate)>,
    reverse_conflicts: bool,
    conversion: Option<Conversion>,

    bind_lock: Mutex<()>,
    binding: OnceCell<Binding>,
}

impl Field {
    /// Starts a field declaration.
    pub fn builder() -> FieldBuilder {
        FieldBuilder::new()
    }

    /// Shorthand for an untyped field with a literal default and no other
    /// options.
    pub fn with_default(default: impl Into<Value>) -> Arc<Field> {
        Arc::new(Self::from_builder(FieldBuilder::new(), FieldDefault::Value(default.into())))
    }

    fn from_builder(builder: FieldBuilder, default: FieldDefault) -> Self {
        Self {
            default,
            declared_type: builder.declared_type,
            read_only: builder.read_only,
            doc: builder.doc,
            validation: builder.validation,
            validate_default: builder.validate_default,
            secret: builder.secret,
            on_change: builder.on_change,
            read_lock: builder.read_lock,
            conflicts: builder.conflicts,
            reverse_conflicts: builder.reverse_conflicts,
            conversion: builder.conversion,
            bind_lock: Mutex::new(()),
            binding: OnceCell::new(),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// The attribute name, once bound.
    pub fn name(&self) -> Option<&str> {
        self.binding.get().map(|b| b.name.as_str())
    }

    /// Name of the class that bound this field.
    pub fn owner(&self) -> Option<&str> {
        self.binding.get().map(|b| b.class.as_str())
    }

    /// Returns true once the field has been bound to a class.
    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Declared type, if any.
    pub fn declared_type(&self) -> Option<&TypeSpec> {
        self.declared_type.as_ref()
    }

    /// Whether writes after construction are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether text forms of the value are redacted.
    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// Whether reads take the field lock.
    pub fn is_read_locked(&self) -> bool {
        self.read_lock
    }

    /// Whether declared conflicts are also enforced from the other side.
    pub fn has_reverse_conflicts(&self) -> bool {
        self.reverse_conflicts
    }

    /// Documentation string.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Names of the fields this field declares conflicts against, in
    /// declaration order.
    pub fn conflict_targets(&self) -> impl Iterator<Item = &str> {
        self.conflicts.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the conflict predicate declared against `other`.
    pub(crate) fn conflict_with(&self, other: &str) -> Option<&ConflictPredicate> {
        self.conflicts
            .iter()
            .find(|(name, _)| name == other)
            .map(|(_, predicate)| predicate)
    }

    /// `"name" field`, or `"name" field (doc)`.
    pub fn label(&self) -> String {
        let name = self.name().unwrap_or("<unbound>");
        match &self.doc {
            Some(doc) => format!("\"{}\" field ({})", name, doc),
            None => format!("\"{}\" field", name),
        }
    }

    /// Formats `value` for an object representation, redacted if secret.
    pub(crate) fn text_repr(&self, value: &Value) -> String {
        value.redacted_repr(self.secret)
    }

    fn binding(&self) -> FieldResult<&Binding> {
        self.binding
            .get()
            .ok_or_else(|| FieldError::binding("The field is not bound to any class."))
    }

    // =========================================================================
    // BINDING
    // =========================================================================

    /// Binds the field to a class under `name`. Runs once per field object.
    ///
    /// `source_default` replaces the declared literal default when a
    /// configuration source supplies one.
    pub(crate) fn bind(
        &self,
        class: &str,
        class_id: Uuid,
        name: &str,
        source_default: Option<Value>,
    ) -> FieldResult<()> {
        check_name(name)?;

        let _guard = self.bind_lock.lock();
        if let Some(existing) = self.binding.get() {
            return Err(FieldError::binding(format!(
                "\"{}\" field cannot be used in {} because it is already used in {}.",
                existing.name, class, existing.class
            )));
        }

        let default = match (&self.default, source_default) {
            (_, Some(value)) => Some(self.prepare(name, value, self.validate_default)?),
            (FieldDefault::Value(value), None) => {
                Some(self.prepare(name, value.clone(), self.validate_default)?)
            }
            (FieldDefault::Factory(_), None) => None,
        };

        let _ = self.binding.set(Binding {
            name: name.to_string(),
            class: class.to_string(),
            class_id,
            default,
        });
        tracing::debug!(field = name, class, "Bound field");
        Ok(())
    }

    /// Identity of the schema that bound this field.
    pub fn owner_id(&self) -> Option<Uuid> {
        self.binding.get().map(|b| b.class_id)
    }

    // =========================================================================
    // VALUE PIPELINE
    // =========================================================================

    /// Type check, convert, re-check, and optionally validate.
    fn prepare(&self, name: &str, value: Value, validate: bool) -> FieldResult<Value> {
        self.check_type(name, &value)?;
        let value = match &self.conversion {
            Some(convert) => {
                let converted = convert(value);
                self.check_type(name, &converted)?;
                converted
            }
            None => value,
        };
        if validate {
            self.check_value(name, &value)?;
        }
        Ok(value)
    }

    fn check_type(&self, name: &str, value: &Value) -> FieldResult<()> {
        match &self.declared_type {
            Some(spec) if !spec.matches(value) => Err(FieldError::TypeMismatch {
                field: name.to_string(),
                value: value.redacted_text(self.secret),
                value_type: value.type_name().to_string(),
                expected: spec.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_value(&self, name: &str, value: &Value) -> FieldResult<()> {
        for rule in &self.validation {
            if (rule.predicate)(value) {
                continue;
            }
            let text = value.redacted_text(self.secret);
            let message = match &rule.message {
                Some(message) => message.clone(),
                None => format!(
                    "The value \"{}\" ({}) of the {} does not match the validation.",
                    text,
                    value.type_name(),
                    self.label()
                ),
            };
            return Err(FieldError::Validation {
                field: name.to_string(),
                value: text,
                message,
            });
        }
        Ok(())
    }

    /// Produces a default value for a new instance.
    ///
    /// Literal defaults were prepared at bind time; factory output goes
    /// through the pipeline here.
    pub(crate) fn instance_default(&self) -> FieldResult<Option<Value>> {
        match (&self.default, &self.binding()?.default) {
            (FieldDefault::Factory(_), None) => Ok(Some(self.default_value()?)),
            _ => Ok(None),
        }
    }

    /// The class-level default as `get` would return it.
    ///
    /// A factory is called afresh and its output goes through the default
    /// pipeline. Fails for unbound fields.
    pub fn default_value(&self) -> FieldResult<Value> {
        let binding = self.binding()?;
        match (&binding.default, &self.default) {
            (Some(prepared), _) => Ok(prepared.clone()),
            (None, FieldDefault::Factory(factory)) => {
                self.prepare(&binding.name, factory(), self.validate_default)
            }
            (None, FieldDefault::Value(value)) => {
                self.prepare(&binding.name, value.clone(), self.validate_default)
            }
        }
    }

    // =========================================================================
    // GET / SET / DELETE
    // =========================================================================

    /// Reads the current value on `instance`, or the default if unset.
    pub fn get(&self, instance: &Storage) -> FieldResult<Value> {
        let name = self.owned_name(instance)?;
        if self.read_lock {
            let lock = instance.lock_for(name)?;
            let _guard = lock.acquire();
            self.read(instance, name)
        } else {
            self.read(instance, name)
        }
    }

    /// Writes `value` on `instance`.
    pub fn set(&self, instance: &Storage, value: impl Into<Value>) -> FieldResult<()> {
        self.write(instance, value.into(), false)
    }

    /// Fields are permanent; always fails.
    pub fn delete(&self, instance: &Storage) -> FieldResult<()> {
        let name = self.owned_name(instance)?;
        Err(FieldError::Deletion {
            field: name.to_string(),
        })
    }

    /// Current value without locking. Callers hold the lock when needed.
    pub(crate) fn read(&self, instance: &Storage, name: &str) -> FieldResult<Value> {
        let stored = instance.values().get(name).map(|entry| entry.value().clone());
        match stored {
            Some(value) => Ok(value),
            None => self.default_value(),
        }
    }

    /// Shared write path; `initializing` lifts the read-only restriction for
    /// constructor overrides.
    pub(crate) fn write(&self, instance: &Storage, value: Value, initializing: bool) -> FieldResult<()> {
        let name = self.owned_name(instance)?;

        if self.read_only && !initializing {
            tracing::debug!(field = name, "Rejected write to read-only field");
            return Err(FieldError::ReadOnly {
                field: name.to_string(),
            });
        }

        let value = self.prepare(name, value, true).map_err(|e| {
            tracing::debug!(field = name, error = %e, "Rejected write");
            e
        })?;

        let lock = instance.lock_for(name)?;
        let _guard = lock.acquire();

        let old = self.read(instance, name)?;
        if let Err(e) = self.check_conflicts(instance, name, &old, &value) {
            tracing::debug!(field = name, error = %e, "Rejected conflicting write");
            return Err(e);
        }

        instance.values().insert(name.to_string(), value.clone());
        tracing::trace!(
            field = name,
            value = %value.redacted_text(self.secret),
            "Committed field value"
        );

        if old != value {
            if let Some(action) = &self.on_change {
                action(&old, &value, instance);
            }
        }
        Ok(())
    }

    /// Evaluates declared conflicts, then reverse conflicts. The first
    /// violation wins.
    fn check_conflicts(
        &self,
        instance: &Storage,
        name: &str,
        old: &Value,
        new: &Value,
    ) -> FieldResult<()> {
        let schema = instance.schema();

        for (other, predicate) in &self.conflicts {
            let other_field = schema.require_field(other)?;
            let current = other_field.read(instance, other)?;
            if predicate(old, new, &current, &current) {
                return Err(FieldError::Conflict {
                    field: name.to_string(),
                    value: new.redacted_text(self.secret),
                    other: other.clone(),
                    other_value: current.redacted_text(other_field.secret),
                });
            }
        }

        for other in schema.reverse_conflicts(name) {
            let other_field = schema.require_field(other)?;
            let Some(predicate) = other_field.conflict_with(name) else {
                continue;
            };
            let current = other_field.read(instance, other)?;
            if predicate(&current, &current, old, new) {
                return Err(FieldError::Conflict {
                    field: name.to_string(),
                    value: new.redacted_text(self.secret),
                    other: other.clone(),
                    other_value: current.redacted_text(other_field.secret),
                });
            }
        }

        Ok(())
    }

    /// Returns the bound name after checking that `instance`'s schema
    /// resolves that name to this very field.
    fn owned_name<'a>(&'a self, instance: &Storage) -> FieldResult<&'a str> {
        let name = self.binding()?.name.as_str();
        match instance.schema().field(name) {
            Some(field) if std::ptr::eq(Arc::as_ptr(field), self) => Ok(name),
            _ => Err(FieldError::UnknownField {
                class: instance.schema().name().to_string(),
                field: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name())
            .field("owner", &self.owner())
            .field("declared_type", &self.declared_type)
            .field("read_only", &self.read_only)
            .field("secret", &self.secret)
            .field("read_lock", &self.read_lock)
            .field("conflicts", &self.conflict_targets().collect::<Vec<_>>())
            .finish()
    }
}

/// Rejects empty and reserved (underscore-prefixed) names.
fn check_name(name: &str) -> FieldResult<()> {
    if name.is_empty() {
        return Err(FieldError::binding("Field name cannot be empty."));
    }
    if name.starts_with('_') {
        return Err(FieldError::binding(format!(
            "Field name \"{}\" cannot start with an underscore.",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// FIELD BUILDER
// =============================================================================

/// Builder for [`Field`].
///
/// Exactly one of [`default`](Self::default) and
/// [`default_factory`](Self::default_factory) must be supplied.
pub struct FieldBuilder {
    default: Option<Value>,
    default_factory: Option<DefaultFactory>,
    declared_type: Option<TypeSpec>,
    read_only: bool,
    doc: Option<String>,
    validation: Vec<ValidationRule>,
    validate_default: bool,
    secret: bool,
    on_change: Option<ChangeAction>,
    read_lock: bool,
    conflicts: Vec<(String, ConflictPredicate)>,
    reverse_conflicts: bool,
    conversion: Option<Conversion>,
}

impl Default for FieldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldBuilder {
    /// Options before any setter: no type, locked reads, symmetric conflicts
    /// and a validated default.
    fn new() -> Self {
        Self {
            default: None,
            default_factory: None,
            declared_type: None,
            read_only: false,
            doc: None,
            validation: Vec::new(),
            validate_default: true,
            secret: false,
            on_change: None,
            read_lock: true,
            conflicts: Vec::new(),
            reverse_conflicts: true,
            conversion: None,
        }
    }

    /// Literal default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Factory producing a fresh default for every instance.
    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default_factory = Some(Arc::new(factory));
        self
    }

    /// Declared type, checked against the default and every assigned value.
    pub fn typed(mut self, spec: TypeSpec) -> Self {
        self.declared_type = Some(spec);
        self
    }

    /// Rejects every write after construction.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Documentation string, shown in diagnostics.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Adds a validation predicate with a generated failure message.
    pub fn validation<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validation.push(ValidationRule {
            message: None,
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Adds a validation predicate whose failure message is `message`
    /// verbatim. Rules run in insertion order.
    pub fn validation_rule<F>(mut self, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validation.push(ValidationRule {
            message: Some(message.into()),
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Whether the default value is validated (default: true).
    pub fn validate_default(mut self, validate: bool) -> Self {
        self.validate_default = validate;
        self
    }

    /// Redacts the value in every text form.
    pub fn secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    /// Callback run after a committed change.
    pub fn on_change<F>(mut self, action: F) -> Self
    where
        F: Fn(&Value, &Value, &Storage) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(action));
        self
    }

    /// Whether reads take the field lock (default: true).
    pub fn read_lock(mut self, read_lock: bool) -> Self {
        self.read_lock = read_lock;
        self
    }

    /// Declares a conflict against `other`. Declaring the same target twice
    /// replaces the earlier predicate.
    pub fn conflicts<F>(mut self, other: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &Value, &Value, &Value) -> bool + Send + Sync + 'static,
    {
        let other = other.into();
        let predicate: ConflictPredicate = Arc::new(predicate);
        match self.conflicts.iter_mut().find(|(name, _)| *name == other) {
            Some(slot) => slot.1 = predicate,
            None => self.conflicts.push((other, predicate)),
        }
        self
    }

    /// Whether declared conflicts are enforced symmetrically (default: true).
    pub fn reverse_conflicts(mut self, reverse: bool) -> Self {
        self.reverse_conflicts = reverse;
        self
    }

    /// Transform applied to every incoming value, the default included.
    pub fn conversion<F>(mut self, convert: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.conversion = Some(Arc::new(convert));
        self
    }

    /// Finishes the declaration.
    pub fn build(mut self) -> FieldResult<Arc<Field>> {
        let default = match (self.default.take(), self.default_factory.take()) {
            (Some(_), Some(_)) => {
                return Err(FieldError::configuration(
                    "You can define a default value or a factory for default values, but not both at the same time.",
                ))
            }
            (None, None) => {
                return Err(FieldError::configuration(
                    "The default value or the default value factory must be specified.",
                ))
            }
            (Some(value), None) => FieldDefault::Value(value),
            (None, Some(factory)) => FieldDefault::Factory(factory),
        };
        Ok(Arc::new(Field::from_builder(self, default)))
    }
}
