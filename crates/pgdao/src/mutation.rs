//! Statement construction for inserts, sparse updates, upserts and deletes.
//!
//! Everything here is pure: it turns records and filters into [`Sql`] without
//! touching the store. Execution and unit-of-work handling live in
//! [`crate::dao`].
//!
//! A null value in an entity record always means "not set". Inserts omit
//! unset columns (or fill their declared default), updates never overwrite a
//! stored value with an unset one.

use std::collections::HashSet;

use crate::entity::{ColumnDef, EntityDescriptor};
use crate::error::{OrmError, OrmResult};
use crate::filter::{Filters, col};
use crate::query::ComposedQuery;
use crate::record::Record;
use crate::sql::Sql;
use crate::value::Value;

/// Conflict handling for [`upsert`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertOptions {
    /// Conflict target. Defaults to the first unique constraint, else the primary key.
    pub conflict_columns: Option<Vec<String>>,
    /// Columns to overwrite on conflict. Replaces the default update set.
    pub update_columns: Option<Vec<String>>,
    /// Columns never overwritten on conflict.
    pub exclude_columns: Vec<String>,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conflict_on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn update_only<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Value a column is inserted with: the record's non-null value, else its default.
fn insert_value(column: &ColumnDef, record: &Record) -> Option<Value> {
    match record.get(column.name()) {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => column.default_for_insert(),
    }
}

/// Primary-key filter; a null key is rejected instead of matching nothing.
pub fn by_id(descriptor: &EntityDescriptor, id: Value) -> OrmResult<Filters> {
    if id.is_null() {
        return Err(OrmError::invalid_argument(format!(
            "primary key '{}' of '{}' is not set",
            descriptor.primary_key().name(),
            descriptor.table_name()
        )));
    }
    Ok(Filters::new().and(col(descriptor.primary_key().name()).eq(id)))
}

/// `INSERT ... RETURNING <every column>` for one record.
pub fn insert<'d>(descriptor: &'d EntityDescriptor, record: &Record) -> OrmResult<ComposedQuery<'d>> {
    descriptor.check_record(record)?;

    let values: Vec<(&ColumnDef, Value)> = descriptor
        .all_columns()
        .iter()
        .filter_map(|c| insert_value(c, record).map(|v| (c, v)))
        .collect();

    let mut sql = Sql::new("INSERT INTO ");
    sql.push(descriptor.table_sql());
    if values.is_empty() {
        sql.push(" DEFAULT VALUES");
    } else {
        sql.push(" (")
            .push_columns(values.iter().map(|(c, _)| *c))
            .push(") VALUES (")
            .push_bind_list(values.into_iter().map(|(_, v)| v))
            .push(")");
    }

    let returning = descriptor.columns(None, &[]);
    sql.push(" RETURNING ").push_columns(returning.iter().copied());
    Ok(ComposedQuery::new(returning, sql))
}

/// Sparse `UPDATE ... SET` of every non-null, non-key column of `record`.
///
/// Columns marked `on_update_now` are refreshed unless `record` sets them.
/// Returns `None` when there is nothing to set.
pub fn update(descriptor: &EntityDescriptor, record: &Record, filters: &Filters) -> OrmResult<Option<Sql>> {
    descriptor.check_record(record)?;
    let pk = descriptor.primary_key().name();

    let mut assignments: Vec<(&ColumnDef, Value)> = descriptor
        .all_columns()
        .iter()
        .filter(|c| c.name() != pk)
        .filter_map(|c| match record.get(c.name()) {
            Some(v) if !v.is_null() => Some((c, v.clone())),
            _ => None,
        })
        .collect();
    if assignments.is_empty() {
        return Ok(None);
    }
    push_on_update(descriptor, &mut assignments);

    let predicates = filters.build(descriptor)?;
    let mut sql = Sql::new("UPDATE ");
    sql.push(descriptor.table_sql()).push(" SET ");
    push_assignments(&mut sql, assignments);
    sql.push_where_and(descriptor, &predicates)?;
    Ok(Some(sql))
}

fn push_on_update<'d>(descriptor: &'d EntityDescriptor, assignments: &mut Vec<(&'d ColumnDef, Value)>) {
    for column in descriptor.all_columns() {
        if assignments.iter().any(|(c, _)| c.name() == column.name()) {
            continue;
        }
        if let Some(now) = column.value_on_update() {
            assignments.push((column, now));
        }
    }
}

fn push_assignments(sql: &mut Sql, assignments: Vec<(&ColumnDef, Value)>) {
    for (i, (column, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_column(column).push(" = ").push_bind(value);
    }
}

/// Multi-row `INSERT ... ON CONFLICT` for `rows`.
///
/// The inserted column set is every column that is non-null (or defaulted)
/// in at least one row; cells a row leaves unset render as `DEFAULT`.
pub fn upsert(descriptor: &EntityDescriptor, rows: &[Record], options: &UpsertOptions) -> OrmResult<Sql> {
    if rows.is_empty() {
        return Err(OrmError::invalid_argument("upsert needs at least one row"));
    }
    for row in rows {
        descriptor.check_record(row)?;
    }

    let resolved: Vec<Vec<Option<Value>>> = rows
        .iter()
        .map(|row| {
            descriptor
                .all_columns()
                .iter()
                .map(|c| insert_value(c, row))
                .collect()
        })
        .collect();
    let target = conflict_target(descriptor, options)?;
    let resolved = last_row_per_key(descriptor, &target, resolved);
    let inserted: Vec<usize> = (0..descriptor.all_columns().len())
        .filter(|&i| resolved.iter().any(|row| row[i].is_some()))
        .collect();
    if inserted.is_empty() {
        return Err(OrmError::invalid_argument(format!(
            "upsert into '{}' sets no columns",
            descriptor.table_name()
        )));
    }
    let columns = descriptor.all_columns();

    let mut sql = Sql::new("INSERT INTO ");
    sql.push(descriptor.table_sql())
        .push(" (")
        .push_columns(inserted.iter().map(|&i| &columns[i]))
        .push(") VALUES ");
    for (r, row) in resolved.into_iter().enumerate() {
        sql.push(if r == 0 { "(" } else { ", (" });
        let mut row = row;
        for (n, &i) in inserted.iter().enumerate() {
            if n > 0 {
                sql.push(", ");
            }
            match row[i].take() {
                Some(value) => sql.push_bind(value),
                None => sql.push("DEFAULT"),
            };
        }
        sql.push(")");
    }

    sql.push(" ON CONFLICT (").push_columns(target).push(")");

    let inserted_names: Vec<&str> = inserted.iter().map(|&i| columns[i].name()).collect();
    let update_set = update_set(descriptor, options, &inserted_names)?;
    if update_set.is_empty() {
        sql.push(" DO NOTHING");
        return Ok(sql);
    }

    sql.push(" DO UPDATE SET ");
    for (i, column) in update_set.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_column(column)
            .push(" = EXCLUDED.")
            .push_column(column);
    }
    for column in columns {
        if update_set.iter().any(|c| c.name() == column.name()) {
            continue;
        }
        if let Some(now) = column.value_on_update() {
            sql.push(", ").push_column(column).push(" = ").push_bind(now);
        }
    }
    Ok(sql)
}

fn conflict_target<'d>(descriptor: &'d EntityDescriptor, options: &UpsertOptions) -> OrmResult<Vec<&'d ColumnDef>> {
    let names: Vec<&str> = match &options.conflict_columns {
        Some(names) if !names.is_empty() => names.iter().map(String::as_str).collect(),
        Some(_) => {
            return Err(OrmError::invalid_argument("conflict_columns must not be empty"));
        }
        None => match descriptor.unique_constraints().first() {
            Some(first) => first.iter().map(String::as_str).collect(),
            None => vec![descriptor.primary_key().name()],
        },
    };
    names
        .into_iter()
        .map(|name| descriptor.require_column(name))
        .collect()
}

/// Drop every row whose conflict key reappears later in the batch.
///
/// Postgres refuses to touch one row twice in a single `ON CONFLICT DO UPDATE`,
/// so the last row for a key wins. Keys with an unset or null cell never
/// conflict and are always kept.
fn last_row_per_key(
    descriptor: &EntityDescriptor,
    target: &[&ColumnDef],
    resolved: Vec<Vec<Option<Value>>>,
) -> Vec<Vec<Option<Value>>> {
    let positions: Vec<usize> = target
        .iter()
        .filter_map(|t| descriptor.all_columns().iter().position(|c| c.name() == t.name()))
        .collect();
    let key = |row: &[Option<Value>]| -> Option<Vec<Value>> {
        positions
            .iter()
            .map(|&i| row[i].clone().filter(|v| !v.is_null()))
            .collect()
    };

    let mut seen: Vec<Vec<Value>> = Vec::new();
    let mut keep = vec![true; resolved.len()];
    for (r, row) in resolved.iter().enumerate().rev() {
        if let Some(k) = key(row) {
            if seen.contains(&k) {
                keep[r] = false;
            } else {
                seen.push(k);
            }
        }
    }
    resolved
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect()
}

/// Columns overwritten with `EXCLUDED` values, in declaration order.
fn update_set<'d>(
    descriptor: &'d EntityDescriptor,
    options: &UpsertOptions,
    inserted: &[&str],
) -> OrmResult<Vec<&'d ColumnDef>> {
    for name in options.exclude_columns.iter().chain(options.update_columns.iter().flatten()) {
        descriptor.require_column(name)?;
    }
    let pk = descriptor.primary_key().name();
    let unique = descriptor.unique_columns();
    let excluded: HashSet<&str> = options.exclude_columns.iter().map(String::as_str).collect();
    let allowed: Option<HashSet<&str>> = options
        .update_columns
        .as_ref()
        .map(|names| names.iter().map(String::as_str).collect());

    Ok(descriptor
        .all_columns()
        .iter()
        .filter(|c| inserted.contains(&c.name()))
        .filter(|c| c.name() != pk && !excluded.contains(c.name()))
        .filter(|c| match &allowed {
            Some(allowed) => allowed.contains(c.name()),
            None => !unique.contains(c.name()),
        })
        .collect())
}

/// `DELETE FROM <table> [WHERE ...]`. Empty filters delete every row.
pub fn delete(descriptor: &EntityDescriptor, filters: &Filters) -> OrmResult<Sql> {
    let predicates = filters.build(descriptor)?;
    let mut sql = Sql::new("DELETE FROM ");
    sql.push(descriptor.table_sql());
    sql.push_where_and(descriptor, &predicates)?;
    Ok(sql)
}

/// Set the soft-delete flag of the row with primary key `id`.
pub fn soft_delete(descriptor: &EntityDescriptor, id: Value) -> OrmResult<Sql> {
    let flag = descriptor.soft_delete_column().ok_or_else(|| {
        OrmError::schema(format!(
            "'{}' declares no soft-delete column",
            descriptor.table_name()
        ))
    })?;
    let record = Record::new().with(flag.name(), true);
    let filters = by_id(descriptor, id)?;
    update(descriptor, &record, &filters)?
        .ok_or_else(|| OrmError::schema("soft-delete column cannot be the primary key"))
}
