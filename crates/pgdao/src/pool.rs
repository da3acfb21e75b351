//! Store handle: a named connection pool plus per-store settings.

use deadpool_postgres::{Hook, HookError, Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

use crate::client::GenericClient;
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::value::Value;

/// A pooled store. Cloning is cheap and shares the pool.
///
/// Every operation run through a `Store` (directly, through a
/// [`crate::Dao`] or inside [`crate::transaction!`]) checks out one
/// connection, opens a transaction and releases the connection on return.
///
/// ```ignore
/// let store = Store::new(&StoreConfig::from_env("PGSQL")?)?;
/// let rows = store.exec_raw("SELECT now() AS ts", &[]).await?;
/// ```
#[derive(Clone)]
pub struct Store {
    pool: Pool,
    name: Arc<str>,
    wait_timeout: Duration,
    echo_statements: bool,
    deadline: Option<Duration>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("status", &self.pool.status())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Store {
    /// Build the pool described by `config`. No connection is opened yet.
    pub fn new(config: &StoreConfig) -> OrmResult<Self> {
        let pg_config = config.pg_config()?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let recycle_after = config.pool_recycle_after();
        let pool = Pool::builder(manager)
            .max_size(config.max_connections())
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(config.pool_wait_timeout()))
            .pre_recycle(Hook::sync_fn(move |_, metrics| {
                if metrics.age() > recycle_after {
                    return Err(HookError::Message(
                        format!("connection older than {recycle_after:?}").into(),
                    ));
                }
                Ok(())
            }))
            .build()
            .map_err(|e| OrmError::Pool(e.to_string()))?;

        info!(
            store = %config.name,
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections(),
            "store created"
        );

        Ok(Self {
            pool,
            name: Arc::from(config.name.as_str()),
            wait_timeout: config.pool_wait_timeout(),
            echo_statements: config.echo_statements,
            deadline: None,
        })
    }

    /// Build a store from a `postgres://` URL with default pool settings.
    pub fn from_url(database_url: &str, max_size: usize) -> OrmResult<Self> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| OrmError::Config(e.to_string()))?;
        let wait_timeout = StoreConfig::default().pool_wait_timeout();
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(wait_timeout))
            .build()
            .map_err(|e| OrmError::Pool(e.to_string()))?;
        Ok(Self::from_pool("default", pool, wait_timeout))
    }

    /// Wrap an existing pool. `wait_timeout` is only used for error reporting.
    pub fn from_pool(name: impl Into<String>, pool: Pool, wait_timeout: Duration) -> Self {
        Self {
            pool,
            name: Arc::from(name.into()),
            wait_timeout,
            echo_statements: false,
            deadline: None,
        }
    }

    /// Default deadline for every unit of work run on this store.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_echo_statements(mut self, echo: bool) -> Self {
        self.echo_statements = echo;
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn echo_statements(&self) -> bool {
        self.echo_statements
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Check a connection out of the pool.
    ///
    /// Waiting longer than the pool timeout yields [`OrmError::PoolExhausted`].
    pub async fn checkout(&self) -> OrmResult<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| OrmError::from_pool_error(e, self.wait_timeout))
    }

    /// Run one parameterised statement and return its rows as records.
    pub async fn exec_raw(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        crate::__unit_of_work!(self, "exec_raw", self.deadline, tx, {
            let rows = tx.query(sql, &params).await?;
            rows.iter().map(Record::from_row).collect::<OrmResult<Vec<_>>>()
        })
    }

    /// Run one statement and map each row onto `E` by column name.
    ///
    /// Columns the entity does not declare are ignored; declared columns
    /// missing from the result keep their default value.
    pub async fn exec_raw_as<E: Entity>(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<E>> {
        let descriptor = E::descriptor()?;
        let records = self.exec_raw(sql, params).await?;
        records
            .into_iter()
            .map(|record| {
                let known: Record = record
                    .into_iter()
                    .filter(|(column, _)| descriptor.has_column(column))
                    .collect();
                E::from_record(known)
            })
            .collect()
    }

    /// Run unparameterised statements in order, in one unit of work.
    ///
    /// Returns the total number of affected rows.
    pub async fn exec_batch(&self, statements: &[&str]) -> OrmResult<u64> {
        crate::__unit_of_work!(self, "exec_batch", self.deadline, tx, {
            let mut affected = 0;
            for statement in statements {
                affected += tx.execute(statement, &[]).await?;
            }
            Ok(affected)
        })
    }
}
