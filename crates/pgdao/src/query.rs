//! Query composer.
//!
//! Renders a [`Select`] (filters, projection, grouping, ordering) against an
//! entity descriptor. The projection chosen here is carried in the returned
//! [`ComposedQuery`] and reused to decode result rows, so columns are bound
//! back positionally in exactly the order they were selected.

use tokio_postgres::Row;

use crate::entity::{ColumnDef, EntityDescriptor};
use crate::error::{OrmError, OrmResult};
use crate::filter::Filters;
use crate::record::Record;
use crate::sql::Sql;
use crate::value::Value;

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered {
    column: String,
    ascending: bool,
}

impl Ordered {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// A single column with an explicit direction.
    Column { column: String, ascending: bool },
    /// Pre-built terms; each carries its own direction.
    Exprs(Vec<Ordered>),
}

impl OrderBy {
    /// Order by `column`, descending unless changed with [`OrderBy::asc`].
    pub fn column(column: impl Into<String>) -> Self {
        Self::Column {
            column: column.into(),
            ascending: false,
        }
    }

    /// Switch a single-column ordering to ascending. No effect on `Exprs`.
    pub fn asc(self) -> Self {
        match self {
            Self::Column { column, .. } => Self::Column {
                column,
                ascending: true,
            },
            exprs => exprs,
        }
    }

    pub fn exprs(terms: impl IntoIterator<Item = Ordered>) -> Self {
        Self::Exprs(terms.into_iter().collect())
    }

    fn terms(&self) -> Vec<(&str, bool)> {
        match self {
            Self::Column { column, ascending } => vec![(column.as_str(), *ascending)],
            Self::Exprs(terms) => terms
                .iter()
                .map(|t| (t.column.as_str(), t.ascending))
                .collect(),
        }
    }
}

/// Which columns to select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
}

impl Projection {
    pub fn resolve<'d>(&self, descriptor: &'d EntityDescriptor) -> OrmResult<Vec<&'d ColumnDef>> {
        let include: Option<Vec<&str>> = self
            .include
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        let exclude: Vec<&str> = self.exclude.iter().map(String::as_str).collect();
        let columns = descriptor.columns(include.as_deref(), &exclude);
        if columns.is_empty() {
            return Err(OrmError::invalid_argument(format!(
                "projection of '{}' selects no columns",
                descriptor.table_name()
            )));
        }
        Ok(columns)
    }
}

/// A read request: filters, projection, grouping and ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub filters: Filters,
    pub projection: Projection,
    pub order_by: Option<OrderBy>,
    pub group_by: Option<String>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filters: impl Into<Filters>) -> Self {
        self.filters = filters.into();
        self
    }

    /// Restrict the projection to `columns` (unknown names are ignored).
    pub fn only<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.include = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.exclude = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }
}

impl From<Filters> for Select {
    fn from(filters: Filters) -> Self {
        Select::new().filter(filters)
    }
}

/// A rendered SELECT together with the columns it projects.
#[derive(Debug, Clone)]
pub struct ComposedQuery<'d> {
    columns: Vec<&'d ColumnDef>,
    sql: Sql,
}

impl<'d> ComposedQuery<'d> {
    pub(crate) fn new(columns: Vec<&'d ColumnDef>, sql: Sql) -> Self {
        Self { columns, sql }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.sql.limit(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.sql.offset(offset);
        self
    }

    pub fn sql(&self) -> &Sql {
        &self.sql
    }

    pub fn columns(&self) -> &[&'d ColumnDef] {
        &self.columns
    }

    /// Decode a result row of this query.
    pub fn decode(&self, row: &Row) -> OrmResult<Record> {
        decode_row(&self.columns, row)
    }
}

/// Bind row values to `columns` by position.
pub(crate) fn decode_row(columns: &[&ColumnDef], row: &Row) -> OrmResult<Record> {
    if row.len() != columns.len() {
        return Err(OrmError::decode(
            "*",
            format!("expected {} columns, got {}", columns.len(), row.len()),
        ));
    }
    let mut record = Record::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        record.set(column.name(), Value::from_row(row, idx)?);
    }
    Ok(record)
}

fn push_from_where(descriptor: &EntityDescriptor, filters: &Filters, sql: &mut Sql) -> OrmResult<()> {
    let predicates = filters.build(descriptor)?;
    sql.push(" FROM ").push(descriptor.table_sql());
    sql.push_where_and(descriptor, &predicates)?;
    Ok(())
}

fn push_group_by(descriptor: &EntityDescriptor, group_by: Option<&str>, sql: &mut Sql) -> OrmResult<()> {
    if let Some(group) = group_by {
        let column = descriptor.require_column(group)?;
        sql.push(" GROUP BY ").push_column(column);
    }
    Ok(())
}

/// Render `select` as `SELECT <projection> FROM <table> [WHERE] [GROUP BY] [ORDER BY]`.
pub fn compose<'d>(descriptor: &'d EntityDescriptor, select: &Select) -> OrmResult<ComposedQuery<'d>> {
    let columns = select.projection.resolve(descriptor)?;

    let mut sql = Sql::new("SELECT ");
    sql.push_columns(columns.iter().copied());
    push_from_where(descriptor, &select.filters, &mut sql)?;
    push_group_by(descriptor, select.group_by.as_deref(), &mut sql)?;

    if let Some(order) = &select.order_by {
        for (i, (name, ascending)) in order.terms().into_iter().enumerate() {
            let column = descriptor.require_column(name)?;
            sql.push(if i == 0 { " ORDER BY " } else { ", " });
            sql.push_column(column)
                .push(if ascending { " ASC" } else { " DESC" });
        }
    }

    Ok(ComposedQuery { columns, sql })
}

/// `SELECT COUNT(*)` over the rows (or groups) `select` would return.
pub fn compose_count(descriptor: &EntityDescriptor, select: &Select) -> OrmResult<Sql> {
    match select.group_by.as_deref() {
        None => {
            let mut sql = Sql::new("SELECT COUNT(*)");
            push_from_where(descriptor, &select.filters, &mut sql)?;
            Ok(sql)
        }
        Some(group) => {
            let mut sql = Sql::new("SELECT COUNT(*) FROM (SELECT 1");
            push_from_where(descriptor, &select.filters, &mut sql)?;
            push_group_by(descriptor, Some(group), &mut sql)?;
            sql.push(") AS grouped");
            Ok(sql)
        }
    }
}

/// `SELECT EXISTS (SELECT 1 FROM <table> [WHERE ...])`.
pub fn compose_exists(descriptor: &EntityDescriptor, filters: &Filters) -> OrmResult<Sql> {
    let mut sql = Sql::new("SELECT EXISTS (SELECT 1");
    push_from_where(descriptor, filters, &mut sql)?;
    sql.push(")");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::col;

    fn files() -> EntityDescriptor {
        EntityDescriptor::builder("public.files")
            .column(ColumnDef::of::<Option<i64>>("id"))
            .column(ColumnDef::of::<Option<String>>("name"))
            .column(ColumnDef::of::<Option<String>>("status"))
            .column(ColumnDef::of::<Option<i64>>("size"))
            .primary_key("id")
            .build()
            .unwrap()
    }

    #[test]
    fn select_all_columns_in_declaration_order() {
        let d = files();
        let q = compose(&d, &Select::new()).unwrap();
        assert_eq!(
            q.sql().to_sql(),
            r#"SELECT "id", "name", "status", "size" FROM "public"."files""#
        );
        assert_eq!(q.columns().len(), 4);
    }

    #[test]
    fn projection_and_filters() {
        let d = files();
        let select = Select::new()
            .filter(Filters::new().kw("status", "A").kw("name", None::<String>))
            .only(["size", "id", "unknown"]);
        let q = compose(&d, &select).unwrap();
        assert_eq!(
            q.sql().to_sql(),
            r#"SELECT "id", "size" FROM "public"."files" WHERE "status" = $1"#
        );
        let names: Vec<_> = q.columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["id", "size"]);
    }

    #[test]
    fn default_single_column_order_is_descending() {
        let d = files();
        let q = compose(&d, &Select::new().order_by(OrderBy::column("size"))).unwrap();
        assert!(q.sql().to_sql().ends_with(r#"ORDER BY "size" DESC"#));

        let q = compose(&d, &Select::new().order_by(OrderBy::column("size").asc())).unwrap();
        assert!(q.sql().to_sql().ends_with(r#"ORDER BY "size" ASC"#));
    }

    #[test]
    fn expression_order_keeps_own_directions() {
        let d = files();
        let order = OrderBy::exprs([Ordered::asc("name"), Ordered::desc("id")]).asc();
        let q = compose(&d, &Select::new().order_by(order)).unwrap();
        assert!(q.sql().to_sql().ends_with(r#"ORDER BY "name" ASC, "id" DESC"#));
    }

    #[test]
    fn group_by_and_limit_offset() {
        let d = files();
        let q = compose(&d, &Select::new().group_by("id")).unwrap().limit(10).offset(20);
        assert_eq!(
            q.sql().to_sql(),
            r#"SELECT "id", "name", "status", "size" FROM "public"."files" GROUP BY "id" LIMIT $1 OFFSET $2"#
        );
    }

    #[test]
    fn unknown_order_or_group_column_is_rejected() {
        let d = files();
        assert!(matches!(
            compose(&d, &Select::new().order_by(OrderBy::column("owner"))),
            Err(OrmError::UnknownColumn { .. })
        ));
        assert!(matches!(
            compose(&d, &Select::new().group_by("owner")),
            Err(OrmError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn empty_projection_is_invalid() {
        let d = files();
        let select = Select::new().exclude(["id", "name", "status", "size"]);
        assert!(matches!(compose(&d, &select), Err(OrmError::InvalidArgument(_))));
    }

    #[test]
    fn count_uses_same_filters() {
        let d = files();
        let select = Select::new().filter(col("size").gt(1i64));
        assert_eq!(
            compose_count(&d, &select).unwrap().to_sql(),
            r#"SELECT COUNT(*) FROM "public"."files" WHERE "size" > $1"#
        );
        assert_eq!(
            compose_count(&d, &select.group_by("status")).unwrap().to_sql(),
            r#"SELECT COUNT(*) FROM (SELECT 1 FROM "public"."files" WHERE "size" > $1 GROUP BY "status") AS grouped"#
        );
    }

    #[test]
    fn exists_query() {
        let d = files();
        let sql = compose_exists(&d, &Filters::new().kw("id", 3i64)).unwrap();
        assert_eq!(
            sql.to_sql(),
            r#"SELECT EXISTS (SELECT 1 FROM "public"."files" WHERE "id" = $1)"#
        );
    }
}
