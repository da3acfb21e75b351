//! Parameterised SQL text builder.
//!
//! `Sql` stores SQL pieces and parameters separately and generates
//! `$1, $2, ...` placeholders when rendered, so statement builders never
//! track placeholder indices by hand. Identifiers are only appended from
//! [`ColumnDef`]s and descriptors, which were validated when the entity was
//! described.
//!
//! ```ignore
//! let mut q = Sql::new("SELECT \"id\" FROM \"files\" WHERE \"name\" = ");
//! q.push_bind("A").push(" LIMIT ").push_bind(10i64);
//! assert_eq!(q.to_sql(), "SELECT \"id\" FROM \"files\" WHERE \"name\" = $1 LIMIT $2");
//! ```

use tokio_postgres::types::ToSql;

use crate::entity::{ColumnDef, EntityDescriptor};
use crate::error::{OrmError, OrmResult};
use crate::filter::Predicate;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A parameter-safe dynamic SQL builder.
#[must_use]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Value>,
}

impl Sql {
    /// Create a new builder with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append a comma-separated list of placeholders.
    ///
    /// An empty list appends `NULL`.
    pub fn push_bind_list<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> &mut Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first);
        for v in iter {
            self.push(", ");
            self.push_bind(v);
        }
        self
    }

    /// Append another fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        self
    }

    /// Append a declared column's quoted name.
    pub fn push_column(&mut self, column: &ColumnDef) -> &mut Self {
        self.push(column.sql_name())
    }

    /// Append a comma-separated list of quoted column names.
    pub fn push_columns<'a>(&mut self, columns: impl IntoIterator<Item = &'a ColumnDef>) -> &mut Self {
        for (i, column) in columns.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_column(column);
        }
        self
    }

    /// Append a `WHERE ...` clause of predicates joined by `AND`.
    ///
    /// No-op when `predicates` is empty.
    pub fn push_where_and(
        &mut self,
        descriptor: &EntityDescriptor,
        predicates: &[Predicate],
    ) -> OrmResult<&mut Self> {
        for (i, predicate) in predicates.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            predicate.append_to_sql(descriptor, self)?;
        }
        Ok(self)
    }

    /// Append `LIMIT $n`.
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.push(" LIMIT ").push_bind(limit)
    }

    /// Append `OFFSET $n`.
    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.push(" OFFSET ").push_bind(offset)
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        let cap = self
            .parts
            .iter()
            .map(|p| match p {
                SqlPart::Raw(s) => s.len(),
                SqlPart::Param => 4,
            })
            .sum();
        let mut out = String::with_capacity(cap);
        let mut idx = 0usize;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    out.push('$');
                    out.push_str(&idx.to_string());
                }
            }
        }
        out
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, SqlPart::Raw(s) if s.is_empty()))
    }

    pub(crate) fn validate(&self) -> OrmResult<()> {
        let placeholders = self
            .parts
            .iter()
            .filter(|p| matches!(p, SqlPart::Param))
            .count();
        if placeholders != self.params.len() {
            return Err(OrmError::invalid_argument(format!(
                "Sql: placeholders({placeholders}) != params({})",
                self.params.len()
            )));
        }
        Ok(())
    }
}
