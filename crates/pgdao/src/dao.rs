//! Public data-access operations.
//!
//! [`Dao<E>`] runs every call as its own unit of work on a [`Store`].
//! [`Scoped`] runs the same operations on a client the caller already holds,
//! typically the session of a [`crate::transaction!`] block.
//!
//! Statements are built and validated before any connection is checked out,
//! so `Schema`, `InvalidArgument` and `UnknownColumn` errors never reach the
//! store.

use std::marker::PhantomData;
use std::time::Duration;
use tracing::warn;

use crate::client::GenericClient;
use crate::entity::{Entity, EntityDescriptor, describe};
use crate::error::{OrmError, OrmResult};
use crate::filter::Filters;
use crate::mutation::{self, UpsertOptions};
use crate::page::{Page, PageRequest, PageWindow};
use crate::pool::Store;
use crate::query::{self, ComposedQuery, Select};
use crate::record::Record;
use crate::sql::Sql;
use crate::value::Value;

/// Generic DAO for one entity type, bound to a store.
///
/// ```ignore
/// let files: Dao<File> = Dao::new(store.clone());
/// let id = files.insert(&mut file).await?;
/// let page = files.page(Filters::new().kw("status", "A"), PageRequest::new(2, 20)).await?;
/// ```
pub struct Dao<E> {
    store: Store,
    deadline: Option<Duration>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Dao<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            deadline: self.deadline,
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Dao<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("entity", &std::any::type_name::<E>())
            .field("store", &self.store.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Operations of `Dao<E>` running on a caller-provided client.
pub struct Scoped<'c, E, C> {
    client: &'c C,
    _entity: PhantomData<fn() -> E>,
}

/// What an update resolves to once the sparse `SET` list is known.
enum UpdatePlan {
    Write(Sql),
    /// Nothing to set: report how many rows match instead.
    Count(Sql),
}

fn plan_update<E: Entity>(descriptor: &EntityDescriptor, entity: &E, filters: &Filters) -> OrmResult<UpdatePlan> {
    match mutation::update(descriptor, &entity.to_record(), filters)? {
        Some(sql) => Ok(UpdatePlan::Write(sql)),
        None => Ok(UpdatePlan::Count(query::compose_count(
            descriptor,
            &Select::new().filter(filters.clone()),
        )?)),
    }
}

fn warn_if_absent(descriptor: &EntityDescriptor, operation: &'static str, id: &Value, affected: u64) {
    if affected == 0 {
        warn!(
            table = descriptor.table_name(),
            operation,
            id = ?id,
            "no row with this primary key"
        );
    }
}

fn into_entities<E: Entity>(records: Vec<Record>) -> OrmResult<Vec<E>> {
    records.into_iter().map(E::from_record).collect()
}

async fn fetch_all<C: GenericClient>(client: &C, query: &ComposedQuery<'_>) -> OrmResult<Vec<Record>> {
    let sql = query.sql();
    let rows = client.query(&sql.to_sql(), &sql.params_ref()).await?;
    rows.iter().map(|row| query.decode(row)).collect()
}

async fn fetch_opt<C: GenericClient>(client: &C, query: &ComposedQuery<'_>) -> OrmResult<Option<Record>> {
    let sql = query.sql();
    match client.query_opt(&sql.to_sql(), &sql.params_ref()).await? {
        Some(row) => query.decode(&row).map(Some),
        None => Ok(None),
    }
}

async fn fetch_each<C: GenericClient>(client: &C, queries: &[ComposedQuery<'_>]) -> OrmResult<Vec<Record>> {
    let mut out = Vec::with_capacity(queries.len());
    for query in queries {
        let sql = query.sql();
        let row = client.query_one(&sql.to_sql(), &sql.params_ref()).await?;
        out.push(query.decode(&row)?);
    }
    Ok(out)
}

async fn execute<C: GenericClient>(client: &C, sql: &Sql) -> OrmResult<u64> {
    sql.validate()?;
    client.execute(&sql.to_sql(), &sql.params_ref()).await
}

async fn count<C: GenericClient>(client: &C, sql: &Sql) -> OrmResult<i64> {
    let row = client.query_one(&sql.to_sql(), &sql.params_ref()).await?;
    row.try_get::<_, i64>(0)
        .map_err(|e| OrmError::decode("count", e.to_string()))
}

async fn exists<C: GenericClient>(client: &C, sql: &Sql) -> OrmResult<bool> {
    let row = client.query_one(&sql.to_sql(), &sql.params_ref()).await?;
    row.try_get::<_, bool>(0)
        .map_err(|e| OrmError::decode("exists", e.to_string()))
}

async fn run_update<C: GenericClient>(client: &C, plan: &UpdatePlan) -> OrmResult<u64> {
    match plan {
        UpdatePlan::Write(sql) => execute(client, sql).await,
        UpdatePlan::Count(sql) => Ok(u64::try_from(count(client, sql).await?).unwrap_or(0)),
    }
}

async fn run_page<C: GenericClient, E: Entity>(
    client: &C,
    count_sql: &Sql,
    query: &ComposedQuery<'_>,
    request: PageRequest,
) -> OrmResult<Page<E>> {
    let total = count(client, count_sql).await?;
    let window = PageWindow::compute(total, request.page_num, request.page_size)?;
    if window.total == 0 {
        return Ok(window.into_page(Vec::new()));
    }
    let query = query.clone().limit(window.page_size).offset(window.offset);
    let records = fetch_all(client, &query).await?;
    Ok(window.into_page(into_entities(records)?))
}

fn plan_page(
    descriptor: &'static EntityDescriptor,
    select: &Select,
    request: PageRequest,
) -> OrmResult<(Sql, ComposedQuery<'static>)> {
    PageWindow::compute(0, request.page_num, request.page_size)?;
    Ok((
        query::compose_count(descriptor, select)?,
        query::compose(descriptor, select)?,
    ))
}

fn plan_insert_batch<E: Entity>(entities: &[E]) -> OrmResult<Vec<ComposedQuery<'static>>> {
    if entities.is_empty() {
        return Err(OrmError::invalid_argument("insert_batch needs at least one entity"));
    }
    let descriptor = E::descriptor()?;
    entities
        .iter()
        .map(|e| mutation::insert(descriptor, &e.to_record()))
        .collect()
}

fn plan_update_by_id<E: Entity>(entity: &E) -> OrmResult<(Value, UpdatePlan)> {
    let descriptor = E::descriptor()?;
    let id = entity.primary_key_value();
    let plan = plan_update(descriptor, entity, &mutation::by_id(descriptor, id.clone())?)?;
    Ok((id, plan))
}

fn plan_remove_by_id<E: Entity>(id: Value) -> OrmResult<(Value, Sql)> {
    let descriptor = E::descriptor()?;
    let sql = mutation::delete(descriptor, &mutation::by_id(descriptor, id.clone())?)?;
    Ok((id, sql))
}

fn rebind<E: Entity>(entities: &mut [E], records: Vec<Record>) -> OrmResult<()> {
    for (entity, record) in entities.iter_mut().zip(records) {
        *entity = E::from_record(record)?;
    }
    Ok(())
}

fn not_found(descriptor: &EntityDescriptor, id: &Value) -> OrmError {
    OrmError::not_found(format!(
        "{} with {} = {id:?}",
        descriptor.table_name(),
        descriptor.primary_key().name()
    ))
}

impl<E: Entity> Dao<E> {
    /// Bind a DAO to `store`, inheriting the store's deadline.
    pub fn new(store: Store) -> Self {
        Self {
            deadline: store.deadline(),
            store,
            _entity: PhantomData,
        }
    }

    /// Deadline for each operation of this DAO.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn descriptor(&self) -> OrmResult<&'static EntityDescriptor> {
        describe::<E>()
    }

    /// Run operations on `client` instead of opening a unit of work per call.
    pub fn on<'c, C: GenericClient>(&self, client: &'c C) -> Scoped<'c, E, C> {
        Scoped {
            client,
            _entity: PhantomData,
        }
    }

    /// Insert `entity` and rebind it from the stored row; returns the primary key.
    pub async fn insert(&self, entity: &mut E) -> OrmResult<Value> {
        let query = mutation::insert(E::descriptor()?, &entity.to_record())?;
        crate::__unit_of_work!(self.store, "insert", self.deadline, tx, {
            self.on(&tx).run_insert(&query, entity).await
        })
    }

    /// Insert all entities in one unit of work. Nothing is stored if any insert fails.
    pub async fn insert_batch(&self, entities: &mut [E]) -> OrmResult<u64> {
        let queries = plan_insert_batch(entities)?;
        crate::__unit_of_work!(self.store, "insert_batch", self.deadline, tx, {
            self.on(&tx).run_insert_batch(&queries, entities).await
        })
    }

    /// Insert-or-update `rows`; see [`UpsertOptions`] for conflict handling.
    pub async fn upsert(&self, rows: Vec<Record>, options: UpsertOptions) -> OrmResult<u64> {
        let sql = mutation::upsert(E::descriptor()?, &rows, &options)?;
        crate::__unit_of_work!(self.store, "upsert", self.deadline, tx, {
            execute(&tx, &sql).await
        })
    }

    pub async fn upsert_entities(&self, entities: &[E], options: UpsertOptions) -> OrmResult<u64> {
        let rows: Vec<Record> = entities.iter().map(Entity::to_record).collect();
        self.upsert(rows, options).await
    }

    /// Sparse update of the row with the entity's primary key. Returns 0 or 1.
    pub async fn update_by_id(&self, entity: &E) -> OrmResult<u64> {
        let (id, plan) = plan_update_by_id(entity)?;
        crate::__unit_of_work!(self.store, "update_by_id", self.deadline, tx, {
            self.on(&tx).run_update_by_id(&plan, &id).await
        })
    }

    /// Sparse update of every matching row; returns the matched row count.
    pub async fn update_by_predicate(&self, entity: &E, filters: impl Into<Filters>) -> OrmResult<u64> {
        let plan = plan_update(E::descriptor()?, entity, &filters.into())?;
        crate::__unit_of_work!(self.store, "update_by_predicate", self.deadline, tx, {
            run_update(&tx, &plan).await
        })
    }

    pub async fn select_by_id(&self, id: impl Into<Value>) -> OrmResult<Option<E>> {
        let descriptor = E::descriptor()?;
        self.select_one(mutation::by_id(descriptor, id.into())?).await
    }

    /// Like [`Dao::select_by_id`], but a missing row is [`OrmError::NotFound`].
    pub async fn get_by_id(&self, id: impl Into<Value>) -> OrmResult<E> {
        let id = id.into();
        let descriptor = E::descriptor()?;
        self.select_by_id(id.clone())
            .await?
            .ok_or_else(|| not_found(descriptor, &id))
    }

    /// First row of `select`, if any.
    pub async fn select_one(&self, select: impl Into<Select>) -> OrmResult<Option<E>> {
        let query = query::compose(E::descriptor()?, &select.into())?.limit(1);
        crate::__unit_of_work!(self.store, "select_one", self.deadline, tx, {
            self.on(&tx).run_select_one(&query).await
        })
    }

    pub async fn select_list(&self, select: impl Into<Select>) -> OrmResult<Vec<E>> {
        let query = query::compose(E::descriptor()?, &select.into())?;
        crate::__unit_of_work!(self.store, "select_list", self.deadline, tx, {
            self.on(&tx).run_select_list(&query).await
        })
    }

    pub async fn select_count(&self, select: impl Into<Select>) -> OrmResult<i64> {
        let sql = query::compose_count(E::descriptor()?, &select.into())?;
        crate::__unit_of_work!(self.store, "select_count", self.deadline, tx, {
            count(&tx, &sql).await
        })
    }

    pub async fn exists(&self, filters: impl Into<Filters>) -> OrmResult<bool> {
        let sql = query::compose_exists(E::descriptor()?, &filters.into())?;
        crate::__unit_of_work!(self.store, "exists", self.deadline, tx, {
            exists(&tx, &sql).await
        })
    }

    /// One page of `select`, counted and fetched in the same session.
    pub async fn page(&self, select: impl Into<Select>, request: PageRequest) -> OrmResult<Page<E>> {
        let (count_sql, query) = plan_page(E::descriptor()?, &select.into(), request)?;
        crate::__unit_of_work!(self.store, "page", self.deadline, tx, {
            run_page(&tx, &count_sql, &query, request).await
        })
    }

    /// Delete by primary key.
    ///
    /// A row that is already gone counts as removed, so this returns 1 either way.
    pub async fn remove_by_id(&self, id: impl Into<Value>) -> OrmResult<u64> {
        let (id, sql) = plan_remove_by_id::<E>(id.into())?;
        crate::__unit_of_work!(self.store, "remove_by_id", self.deadline, tx, {
            self.on(&tx).run_remove_by_id(&sql, &id).await
        })
    }

    /// Delete every matching row. Empty filters delete the whole table.
    pub async fn remove_by_predicate(&self, filters: impl Into<Filters>) -> OrmResult<u64> {
        let sql = mutation::delete(E::descriptor()?, &filters.into())?;
        crate::__unit_of_work!(self.store, "remove_by_predicate", self.deadline, tx, {
            execute(&tx, &sql).await
        })
    }

    /// Set the soft-delete flag of one row. Returns 0 or 1.
    pub async fn soft_delete_by_id(&self, id: impl Into<Value>) -> OrmResult<u64> {
        let id = id.into();
        let sql = mutation::soft_delete(E::descriptor()?, id.clone())?;
        crate::__unit_of_work!(self.store, "soft_delete_by_id", self.deadline, tx, {
            self.on(&tx).run_soft_delete_by_id(&sql, &id).await
        })
    }
}

impl<E: Entity, C: GenericClient> Scoped<'_, E, C> {
    pub async fn insert(&self, entity: &mut E) -> OrmResult<Value> {
        let query = mutation::insert(E::descriptor()?, &entity.to_record())?;
        self.run_insert(&query, entity).await
    }

    pub async fn insert_batch(&self, entities: &mut [E]) -> OrmResult<u64> {
        let queries = plan_insert_batch(entities)?;
        self.run_insert_batch(&queries, entities).await
    }

    pub async fn upsert(&self, rows: Vec<Record>, options: UpsertOptions) -> OrmResult<u64> {
        let sql = mutation::upsert(E::descriptor()?, &rows, &options)?;
        execute(self.client, &sql).await
    }

    pub async fn upsert_entities(&self, entities: &[E], options: UpsertOptions) -> OrmResult<u64> {
        let rows: Vec<Record> = entities.iter().map(Entity::to_record).collect();
        self.upsert(rows, options).await
    }

    pub async fn update_by_id(&self, entity: &E) -> OrmResult<u64> {
        let (id, plan) = plan_update_by_id(entity)?;
        self.run_update_by_id(&plan, &id).await
    }

    pub async fn update_by_predicate(&self, entity: &E, filters: impl Into<Filters>) -> OrmResult<u64> {
        let plan = plan_update(E::descriptor()?, entity, &filters.into())?;
        run_update(self.client, &plan).await
    }

    pub async fn select_by_id(&self, id: impl Into<Value>) -> OrmResult<Option<E>> {
        let descriptor = E::descriptor()?;
        self.select_one(mutation::by_id(descriptor, id.into())?).await
    }

    pub async fn get_by_id(&self, id: impl Into<Value>) -> OrmResult<E> {
        let id = id.into();
        let descriptor = E::descriptor()?;
        self.select_by_id(id.clone())
            .await?
            .ok_or_else(|| not_found(descriptor, &id))
    }

    pub async fn select_one(&self, select: impl Into<Select>) -> OrmResult<Option<E>> {
        let query = query::compose(E::descriptor()?, &select.into())?.limit(1);
        self.run_select_one(&query).await
    }

    pub async fn select_list(&self, select: impl Into<Select>) -> OrmResult<Vec<E>> {
        let query = query::compose(E::descriptor()?, &select.into())?;
        self.run_select_list(&query).await
    }

    pub async fn select_count(&self, select: impl Into<Select>) -> OrmResult<i64> {
        let sql = query::compose_count(E::descriptor()?, &select.into())?;
        count(self.client, &sql).await
    }

    pub async fn exists(&self, filters: impl Into<Filters>) -> OrmResult<bool> {
        let sql = query::compose_exists(E::descriptor()?, &filters.into())?;
        exists(self.client, &sql).await
    }

    pub async fn page(&self, select: impl Into<Select>, request: PageRequest) -> OrmResult<Page<E>> {
        let (count_sql, query) = plan_page(E::descriptor()?, &select.into(), request)?;
        run_page(self.client, &count_sql, &query, request).await
    }

    pub async fn remove_by_id(&self, id: impl Into<Value>) -> OrmResult<u64> {
        let (id, sql) = plan_remove_by_id::<E>(id.into())?;
        self.run_remove_by_id(&sql, &id).await
    }

    pub async fn remove_by_predicate(&self, filters: impl Into<Filters>) -> OrmResult<u64> {
        let sql = mutation::delete(E::descriptor()?, &filters.into())?;
        execute(self.client, &sql).await
    }

    pub async fn soft_delete_by_id(&self, id: impl Into<Value>) -> OrmResult<u64> {
        let id = id.into();
        let sql = mutation::soft_delete(E::descriptor()?, id.clone())?;
        self.run_soft_delete_by_id(&sql, &id).await
    }

    // Execution halves; `Dao` runs these on its session after planning.

    async fn run_insert(&self, query: &ComposedQuery<'_>, entity: &mut E) -> OrmResult<Value> {
        let mut records = fetch_each(self.client, std::slice::from_ref(query)).await?;
        if let Some(record) = records.pop() {
            *entity = E::from_record(record)?;
        }
        Ok(entity.primary_key_value())
    }

    async fn run_insert_batch(&self, queries: &[ComposedQuery<'_>], entities: &mut [E]) -> OrmResult<u64> {
        let records = fetch_each(self.client, queries).await?;
        rebind(entities, records)?;
        Ok(entities.len() as u64)
    }

    async fn run_update_by_id(&self, plan: &UpdatePlan, id: &Value) -> OrmResult<u64> {
        let affected = run_update(self.client, plan).await?;
        warn_if_absent(E::descriptor()?, "update_by_id", id, affected);
        Ok(affected)
    }

    async fn run_select_one(&self, query: &ComposedQuery<'_>) -> OrmResult<Option<E>> {
        fetch_opt(self.client, query)
            .await?
            .map(E::from_record)
            .transpose()
    }

    async fn run_select_list(&self, query: &ComposedQuery<'_>) -> OrmResult<Vec<E>> {
        into_entities(fetch_all(self.client, query).await?)
    }

    async fn run_remove_by_id(&self, sql: &Sql, id: &Value) -> OrmResult<u64> {
        let affected = execute(self.client, sql).await?;
        warn_if_absent(E::descriptor()?, "remove_by_id", id, affected);
        Ok(affected.max(1))
    }

    async fn run_soft_delete_by_id(&self, sql: &Sql, id: &Value) -> OrmResult<u64> {
        let affected = execute(self.client, sql).await?;
        warn_if_absent(E::descriptor()?, "soft_delete_by_id", id, affected);
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnDef, DescriptorCell};
    use crate::filter::col;
    use std::sync::Mutex;
    use tokio_postgres::Row;
    use tokio_postgres::types::ToSql;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        id: Option<i64>,
        name: Option<String>,
        size: Option<i64>,
        is_delete: Option<bool>,
    }

    impl Entity for Item {
        fn descriptor() -> OrmResult<&'static EntityDescriptor> {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_build(|| {
                EntityDescriptor::builder("items")
                    .column(ColumnDef::of::<Option<i64>>("id"))
                    .column(ColumnDef::of::<Option<String>>("name"))
                    .column(ColumnDef::of::<Option<i64>>("size"))
                    .column(ColumnDef::of::<Option<bool>>("is_delete").default_value(false))
                    .primary_key("id")
                    .unique(["name"])
                    .soft_delete("is_delete")
                    .build()
            })
        }

        fn to_record(&self) -> Record {
            Record::new()
                .with("id", self.id)
                .with("name", self.name.clone())
                .with("size", self.size)
                .with("is_delete", self.is_delete)
        }

        fn from_record(record: Record) -> OrmResult<Self> {
            use crate::value::ColumnValue;
            let mut out = Self::default();
            for (column, value) in record {
                let decode = |m: String| OrmError::decode(column.as_str(), m);
                match column.as_str() {
                    "id" => out.id = ColumnValue::from_value(value).map_err(decode)?,
                    "name" => out.name = ColumnValue::from_value(value).map_err(decode)?,
                    "size" => out.size = ColumnValue::from_value(value).map_err(decode)?,
                    "is_delete" => out.is_delete = ColumnValue::from_value(value).map_err(decode)?,
                    _ => {}
                }
            }
            Ok(out)
        }

        fn primary_key_value(&self) -> Value {
            self.id.into()
        }
    }

    /// Records every statement; `execute` reports a fixed row count.
    #[derive(Default)]
    struct RecordingClient {
        statements: Mutex<Vec<(String, usize)>>,
        affected: u64,
    }

    impl RecordingClient {
        fn affecting(affected: u64) -> Self {
            Self {
                affected,
                ..Self::default()
            }
        }

        fn statements(&self) -> Vec<(String, usize)> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl GenericClient for RecordingClient {
        async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
            self.statements.lock().unwrap().push((sql.to_string(), params.len()));
            Ok(vec![])
        }

        async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            self.statements.lock().unwrap().push((sql.to_string(), params.len()));
            Ok(self.affected)
        }
    }

    fn scoped(client: &RecordingClient) -> Scoped<'_, Item, RecordingClient> {
        Scoped {
            client,
            _entity: PhantomData,
        }
    }

    #[test]
    fn dao_descriptor_is_the_entity_descriptor() {
        let store = Store::from_url("postgres://localhost/pgdao", 1).unwrap();
        let dao: Dao<Item> = Dao::new(store);
        assert!(std::ptr::eq(dao.descriptor().unwrap(), Item::descriptor().unwrap()));
    }

    #[tokio::test]
    async fn remove_missing_id_counts_as_removed() {
        let client = RecordingClient::affecting(0);
        let removed = scoped(&client).remove_by_id(42i64).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            client.statements(),
            [(r#"DELETE FROM "items" WHERE "id" = $1"#.to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn missing_id_for_update_and_soft_delete_reports_zero() {
        let client = RecordingClient::affecting(0);
        let item = Item {
            id: Some(42),
            size: Some(1),
            ..Item::default()
        };
        assert_eq!(scoped(&client).update_by_id(&item).await.unwrap(), 0);
        assert_eq!(scoped(&client).soft_delete_by_id(42i64).await.unwrap(), 0);
        assert_eq!(client.statements().len(), 2);
    }

    #[tokio::test]
    async fn update_by_id_sends_sparse_set() {
        let client = RecordingClient::affecting(1);
        let item = Item {
            id: Some(1),
            size: Some(9),
            ..Item::default()
        };
        assert_eq!(scoped(&client).update_by_id(&item).await.unwrap(), 1);
        assert_eq!(
            client.statements(),
            [(r#"UPDATE "items" SET "size" = $1 WHERE "id" = $2"#.to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn update_without_key_touches_nothing() {
        let client = RecordingClient::affecting(1);
        let item = Item {
            size: Some(9),
            ..Item::default()
        };
        let err = scoped(&client).update_by_id(&item).await.unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
        assert!(client.statements().is_empty());
    }

    #[tokio::test]
    async fn unknown_filter_column_touches_nothing() {
        let client = RecordingClient::affecting(1);
        let err = scoped(&client)
            .remove_by_predicate(Filters::new().kw("owner", "bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::UnknownColumn { .. }));
        assert!(client.statements().is_empty());
    }

    #[tokio::test]
    async fn remove_by_predicate_without_filters_deletes_all() {
        let client = RecordingClient::affecting(3);
        let removed = scoped(&client).remove_by_predicate(Filters::new()).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(client.statements()[0].0, r#"DELETE FROM "items""#);
    }

    #[tokio::test]
    async fn soft_delete_sets_flag() {
        let client = RecordingClient::affecting(1);
        assert_eq!(scoped(&client).soft_delete_by_id(5i64).await.unwrap(), 1);
        assert_eq!(
            client.statements(),
            [(r#"UPDATE "items" SET "is_delete" = $1 WHERE "id" = $2"#.to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn upsert_entities_uses_unique_constraint() {
        let client = RecordingClient::affecting(2);
        let items = [
            Item {
                name: Some("a".into()),
                size: Some(1),
                ..Item::default()
            },
            Item {
                name: Some("b".into()),
                size: Some(2),
                ..Item::default()
            },
        ];
        let n = scoped(&client)
            .upsert_entities(&items, UpsertOptions::new())
            .await
            .unwrap();
        assert_eq!(n, 2);
        let (sql, params) = &client.statements()[0];
        assert!(sql.contains(r#"ON CONFLICT ("name") DO UPDATE SET "size" = EXCLUDED."size""#), "{sql}");
        assert_eq!(*params, 6);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let client = RecordingClient::default();
        let err = scoped(&client).insert_batch(&mut []).await.unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn select_list_on_empty_result() {
        let client = RecordingClient::default();
        let items = scoped(&client)
            .select_list(Filters::new().and(col("size").gt(10i64)))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(
            client.statements()[0].0,
            r#"SELECT "id", "name", "size", "is_delete" FROM "items" WHERE "size" > $1"#
        );
    }

    #[tokio::test]
    async fn invalid_page_size_touches_nothing() {
        let client = RecordingClient::default();
        let err = scoped(&client)
            .page(Select::new(), PageRequest::new(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
        assert!(client.statements().is_empty());
    }
}
