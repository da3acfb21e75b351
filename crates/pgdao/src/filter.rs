//! Filter builder.
//!
//! Turns positional predicates and keyword `(column, value)` pairs into an
//! AND-ed list of [`Predicate`]s, validated against an entity descriptor.
//!
//! Keyword pairs follow "query by example" rules: a null value means "no
//! constraint" and is skipped, any other value becomes `column = value`.
//!
//! ```ignore
//! use pgdao::{Filters, col};
//!
//! let filters = Filters::new()
//!     .and(col("size").gt(1024i64))
//!     .kw("status", params.status)          // skipped when None
//!     .kw_expr("name", col("name").ilike("%.png"));
//! ```

use crate::entity::EntityDescriptor;
use crate::error::OrmResult;
use crate::record::Record;
use crate::sql::Sql;
use crate::value::Value;

/// Comparison operator of a [`Predicate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal: column = value
    Eq(Value),
    /// Not equal: column != value
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// LIKE pattern match
    Like(Value),
    /// Case-insensitive LIKE (PostgreSQL ILIKE)
    Ilike(Value),
    /// IN (list)
    In(Vec<Value>),
    /// NOT IN (list)
    NotIn(Vec<Value>),
    /// BETWEEN a AND b
    Between(Value, Value),
    IsNull,
    IsNotNull,
}

impl Op {
    fn keyword(&self) -> &'static str {
        match self {
            Op::Eq(_) => "=",
            Op::Ne(_) => "!=",
            Op::Gt(_) => ">",
            Op::Gte(_) => ">=",
            Op::Lt(_) => "<",
            Op::Lte(_) => "<=",
            Op::Like(_) => "LIKE",
            Op::Ilike(_) => "ILIKE",
            Op::In(_) => "IN",
            Op::NotIn(_) => "NOT IN",
            Op::Between(..) => "BETWEEN",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A boolean expression over one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    op: Op,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: Op) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Append this predicate to `sql`, resolving the column through `descriptor`.
    pub fn append_to_sql(&self, descriptor: &EntityDescriptor, sql: &mut Sql) -> OrmResult<()> {
        let column = descriptor.require_column(&self.column)?;
        match &self.op {
            // Empty IN list: always false / true.
            Op::In(values) if values.is_empty() => {
                sql.push("1=0");
            }
            Op::NotIn(values) if values.is_empty() => {
                sql.push("1=1");
            }
            Op::Eq(v)
            | Op::Ne(v)
            | Op::Gt(v)
            | Op::Gte(v)
            | Op::Lt(v)
            | Op::Lte(v)
            | Op::Like(v)
            | Op::Ilike(v) => {
                sql.push_column(column)
                    .push(" ")
                    .push(self.op.keyword())
                    .push(" ")
                    .push_bind(v.clone());
            }
            Op::In(values) | Op::NotIn(values) => {
                sql.push_column(column)
                    .push(" ")
                    .push(self.op.keyword())
                    .push(" (")
                    .push_bind_list(values.iter().cloned())
                    .push(")");
            }
            Op::Between(from, to) => {
                sql.push_column(column)
                    .push(" BETWEEN ")
                    .push_bind(from.clone())
                    .push(" AND ")
                    .push_bind(to.clone());
            }
            Op::IsNull | Op::IsNotNull => {
                sql.push_column(column).push(" ").push(self.op.keyword());
            }
        }
        Ok(())
    }
}

/// Column handle for building predicates fluently: `col("size").gt(10i64)`.
#[derive(Debug, Clone)]
pub struct Column(String);

/// Start a predicate on `name`.
pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

impl Column {
    fn op(self, op: Op) -> Predicate {
        Predicate::new(self.0, op)
    }

    pub fn eq(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Eq(v.into()))
    }

    pub fn ne(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Ne(v.into()))
    }

    pub fn gt(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Gt(v.into()))
    }

    pub fn gte(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Gte(v.into()))
    }

    pub fn lt(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Lt(v.into()))
    }

    pub fn lte(self, v: impl Into<Value>) -> Predicate {
        self.op(Op::Lte(v.into()))
    }

    pub fn like(self, pattern: impl Into<Value>) -> Predicate {
        self.op(Op::Like(pattern.into()))
    }

    pub fn ilike(self, pattern: impl Into<Value>) -> Predicate {
        self.op(Op::Ilike(pattern.into()))
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        self.op(Op::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        self.op(Op::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn between(self, from: impl Into<Value>, to: impl Into<Value>) -> Predicate {
        self.op(Op::Between(from.into(), to.into()))
    }

    pub fn is_null(self) -> Predicate {
        self.op(Op::IsNull)
    }

    pub fn is_not_null(self) -> Predicate {
        self.op(Op::IsNotNull)
    }
}

/// Right-hand side of a keyword filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    /// `key = value`, or nothing when the value is null.
    Value(Value),
    /// A ready-made predicate, used as-is.
    Expr(Predicate),
}

/// Build the AND-ed predicate list for `descriptor`.
///
/// Positional predicates are kept in order, followed by keyword filters in
/// order. Every referenced column must be declared by the entity.
pub fn build_filters(
    descriptor: &EntityDescriptor,
    positional: &[Predicate],
    keyword: &[(String, Keyword)],
) -> OrmResult<Vec<Predicate>> {
    let mut out = Vec::with_capacity(positional.len() + keyword.len());
    for predicate in positional {
        descriptor.require_column(predicate.column())?;
        out.push(predicate.clone());
    }
    for (key, kw) in keyword {
        match kw {
            Keyword::Value(Value::Null) => {}
            Keyword::Value(value) => {
                descriptor.require_column(key)?;
                out.push(Predicate::new(key.clone(), Op::Eq(value.clone())));
            }
            Keyword::Expr(predicate) => {
                descriptor.require_column(predicate.column())?;
                out.push(predicate.clone());
            }
        }
    }
    Ok(out)
}

/// Positional and keyword filters, collected fluently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    positional: Vec<Predicate>,
    keyword: Vec<(String, Keyword)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyword filters from every entry of `record` (nulls are skipped on build).
    pub fn from_record(record: Record) -> Self {
        let keyword = record
            .into_iter()
            .map(|(k, v)| (k, Keyword::Value(v)))
            .collect();
        Self {
            positional: Vec::new(),
            keyword,
        }
    }

    /// Add a positional predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.positional.push(predicate);
        self
    }

    /// Add `key = value`; a null value adds nothing.
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.push((key.into(), Keyword::Value(value.into())));
        self
    }

    /// Add a keyword slot holding a predicate.
    pub fn kw_expr(mut self, key: impl Into<String>, predicate: Predicate) -> Self {
        self.keyword.push((key.into(), Keyword::Expr(predicate)));
        self
    }

    /// True when no arguments were given at all (nulls still count as given).
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn build(&self, descriptor: &EntityDescriptor) -> OrmResult<Vec<Predicate>> {
        build_filters(descriptor, &self.positional, &self.keyword)
    }
}

impl From<Predicate> for Filters {
    fn from(predicate: Predicate) -> Self {
        Filters::new().and(predicate)
    }
}
