//! Entity metadata.
//!
//! Every persisted type is described once by an [`EntityDescriptor`]: its
//! table, primary key, unique constraints and ordered column list. The
//! descriptor is the allow-list for every identifier that reaches SQL text.
//!
//! Descriptors are normally produced by `#[derive(Entity)]`, which emits
//! calls to [`EntityDescriptor::builder`]. Hand-written impls use the same
//! builder together with [`DescriptorCell`] for memoisation.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::record::Record;
use crate::value::{ColumnType, ColumnValue, Value};

/// Value a column takes on insert when the entity leaves it unset.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Value),
    /// Current time, in the column's own temporal type.
    Now,
}

/// One declared column.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    name: String,
    quoted: String,
    column_type: ColumnType,
    nullable: bool,
    default: Option<ColumnDefault>,
    on_update_now: bool,
    soft_delete: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            quoted: String::new(),
            column_type,
            nullable: false,
            default: None,
            on_update_now: false,
            soft_delete: false,
        }
    }

    /// Column whose type and nullability follow the Rust field type `T`.
    pub fn of<T: ColumnValue>(name: impl Into<String>) -> Self {
        Self::new(name, T::COLUMN_TYPE).nullable(T::NULLABLE)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(ColumnDefault::Now);
        self
    }

    /// Refresh this column with the current time on every update.
    pub fn on_update_now(mut self) -> Self {
        self.on_update_now = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The quoted identifier, ready to splice into SQL.
    pub fn sql_name(&self) -> &str {
        &self.quoted
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> Option<&ColumnDefault> {
        self.default.as_ref()
    }

    pub fn is_on_update_now(&self) -> bool {
        self.on_update_now
    }

    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Resolve the insert default, if any.
    pub fn default_for_insert(&self) -> Option<Value> {
        match self.default.as_ref()? {
            ColumnDefault::Value(v) => Some(v.clone()),
            ColumnDefault::Now => Some(now_value(self.column_type)),
        }
    }

    /// Resolve the on-update value, if any.
    pub fn value_on_update(&self) -> Option<Value> {
        self.on_update_now.then(|| now_value(self.column_type))
    }
}

fn now_value(column_type: ColumnType) -> Value {
    let now = Utc::now();
    match column_type {
        ColumnType::Timestamp => Value::Timestamp(now.naive_utc()),
        ColumnType::Date => Value::Date(now.date_naive()),
        _ => Value::TimestampTz(now),
    }
}

/// Immutable, per-type schema description.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    table: Ident,
    table_sql: String,
    primary_key: usize,
    unique_constraints: Vec<Vec<String>>,
    columns: Vec<ColumnDef>,
    excluded: Vec<String>,
}

impl EntityDescriptor {
    pub fn builder(table: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            table: table.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            unique: Vec::new(),
            soft_delete: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Table name as declared (last part, unquoted).
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Table identifier rendered for SQL.
    pub fn table_sql(&self) -> &str {
        &self.table_sql
    }

    pub fn primary_key(&self) -> &ColumnDef {
        &self.columns[self.primary_key]
    }

    pub fn unique_constraints(&self) -> &[Vec<String>] {
        &self.unique_constraints
    }

    /// Union of every unique constraint's columns.
    pub fn unique_columns(&self) -> HashSet<&str> {
        self.unique_constraints
            .iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn all_columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn excluded_fields(&self) -> &[String] {
        &self.excluded
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Look up a column, failing with [`OrmError::UnknownColumn`].
    pub fn require_column(&self, name: &str) -> OrmResult<&ColumnDef> {
        self.column(name)
            .ok_or_else(|| OrmError::unknown_column(self.table_name(), name))
    }

    pub fn soft_delete_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.is_soft_delete())
    }

    /// Columns to project, in declaration order.
    ///
    /// `include` restricts the set to the named columns (names the entity
    /// does not declare are ignored); `exclude` is then removed from it.
    pub fn columns(&self, include: Option<&[&str]>, exclude: &[&str]) -> Vec<&ColumnDef> {
        self.columns
            .iter()
            .filter(|c| include.is_none_or(|inc| inc.contains(&c.name.as_str())))
            .filter(|c| !exclude.contains(&c.name.as_str()))
            .collect()
    }

    /// Fail if `record` names a column this entity does not declare.
    pub fn check_record(&self, record: &Record) -> OrmResult<()> {
        for column in record.columns() {
            self.require_column(column)?;
        }
        Ok(())
    }
}

/// Collects declarations and validates them in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    table: String,
    columns: Vec<ColumnDef>,
    primary_keys: Vec<String>,
    unique: Vec<Vec<String>>,
    soft_delete: Vec<String>,
    excluded: Vec<String>,
}

impl EntityDescriptorBuilder {
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_keys.push(column.into());
        self
    }

    /// Declare a unique constraint over one or more columns.
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Mark a boolean column as the soft-delete flag.
    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete.push(column.into());
        self
    }

    /// Record a struct field that is not persisted.
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded.push(field.into());
        self
    }

    pub fn build(self) -> OrmResult<EntityDescriptor> {
        let table = Ident::parse(&self.table)?;
        let table_name = table.name().to_string();

        let mut columns = self.columns;
        let mut seen = HashSet::new();
        for column in &mut columns {
            if !seen.insert(column.name.clone()) {
                return Err(OrmError::schema(format!(
                    "Column '{}' declared more than once on '{table_name}'",
                    column.name
                )));
            }
            column.quoted = Ident::column(&column.name)?.to_sql();
        }
        if columns.is_empty() {
            return Err(OrmError::schema(format!(
                "Entity '{table_name}' declares no columns"
            )));
        }

        let primary_key = match self.primary_keys.as_slice() {
            [] => {
                return Err(OrmError::schema(format!(
                    "Entity '{table_name}' declares no primary key"
                )));
            }
            [pk] => columns.iter().position(|c| &c.name == pk).ok_or_else(|| {
                OrmError::schema(format!(
                    "Primary key '{pk}' is not a column of '{table_name}'"
                ))
            })?,
            many => {
                return Err(OrmError::schema(format!(
                    "Entity '{table_name}' declares more than one primary key: {}",
                    many.join(", ")
                )));
            }
        };

        for constraint in &self.unique {
            if constraint.is_empty() {
                return Err(OrmError::schema(format!(
                    "Empty unique constraint on '{table_name}'"
                )));
            }
            for name in constraint {
                if !seen.contains(name) {
                    return Err(OrmError::schema(format!(
                        "Unique constraint references unknown column '{name}' on '{table_name}'"
                    )));
                }
            }
        }

        if self.soft_delete.len() > 1 {
            return Err(OrmError::schema(format!(
                "Entity '{table_name}' declares more than one soft-delete column"
            )));
        }
        for name in &self.soft_delete {
            let column = columns.iter_mut().find(|c| &c.name == name).ok_or_else(|| {
                OrmError::schema(format!(
                    "Soft-delete flag references unknown column '{name}' on '{table_name}'"
                ))
            })?;
            if column.column_type != ColumnType::Bool {
                return Err(OrmError::schema(format!(
                    "Soft-delete column '{name}' on '{table_name}' must be boolean"
                )));
            }
            column.soft_delete = true;
        }

        Ok(EntityDescriptor {
            table_sql: table.to_sql(),
            table,
            primary_key,
            unique_constraints: self.unique,
            columns,
            excluded: self.excluded,
        })
    }
}

/// A persisted record type.
pub trait Entity: Sized + Send + Sync {
    /// The memoised descriptor for this type.
    fn descriptor() -> OrmResult<&'static EntityDescriptor>;

    /// Every column in declaration order; unset fields become [`Value::Null`].
    fn to_record(&self) -> Record;

    /// Build an instance from the named columns of `record`. Fields without
    /// a matching entry keep their `Default` value.
    fn from_record(record: Record) -> OrmResult<Self>;

    fn primary_key_value(&self) -> Value;
}

/// Descriptor of `E`, built on first use.
pub fn describe<E: Entity>() -> OrmResult<&'static EntityDescriptor> {
    E::descriptor()
}

/// Lazily built descriptor storage for one entity type.
///
/// A failed build is remembered, so every later call reports the same
/// schema error instead of rebuilding.
#[derive(Debug)]
pub struct DescriptorCell(OnceLock<Result<EntityDescriptor, String>>);

impl DescriptorCell {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn get_or_build(
        &'static self,
        build: impl FnOnce() -> OrmResult<EntityDescriptor>,
    ) -> OrmResult<&'static EntityDescriptor> {
        let cached = self.0.get_or_init(|| {
            build().map_err(|e| match e {
                OrmError::Schema(message) => message,
                other => other.to_string(),
            })
        });
        match cached {
            Ok(descriptor) => Ok(descriptor),
            Err(message) => Err(OrmError::Schema(message.clone())),
        }
    }
}

impl Default for DescriptorCell {
    fn default() -> Self {
        Self::new()
    }
}
