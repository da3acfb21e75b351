#![allow(dead_code)]

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pgdao::{Entity, OrmError, OrmResult, Store};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::NoTls;

/// All tests share one table; run them one at a time.
static TABLE_LOCK: Mutex<()> = Mutex::const_new(());

#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[dao(table = "pgdao_test_files", unique(bucket, path))]
pub struct TestFile {
    #[dao(id)]
    pub id: Option<i64>,
    pub bucket: Option<String>,
    pub path: Option<String>,
    #[dao(default = "A")]
    pub status: Option<String>,
    pub size: Option<i64>,
    #[dao(default_now)]
    pub created_at: Option<DateTime<Utc>>,
    #[dao(default_now, on_update_now)]
    pub updated_at: Option<DateTime<Utc>>,
    #[dao(soft_delete, default = false)]
    pub is_delete: Option<bool>,
    #[dao(skip)]
    pub note: Option<String>,
}

impl TestFile {
    pub fn new(bucket: &str, path: &str, size: i64) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            path: Some(path.to_string()),
            size: Some(size),
            ..Self::default()
        }
    }
}

const SETUP: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS pgdao_test_files (
        id BIGSERIAL PRIMARY KEY,
        bucket TEXT NOT NULL,
        path TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'A',
        size BIGINT,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ,
        is_delete BOOLEAN NOT NULL DEFAULT false,
        UNIQUE (bucket, path)
    )",
    "TRUNCATE pgdao_test_files RESTART IDENTITY",
];

/// A store on `DATABASE_URL` with an empty test table, or `None` when unset.
pub async fn setup(test: &str) -> OrmResult<Option<(Store, MutexGuard<'static, ()>)>> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            return Ok(None);
        }
    };

    let guard = TABLE_LOCK.lock().await;
    let store = Store::from_url(&database_url, 4)?;
    store.exec_batch(SETUP).await?;
    // Descriptor errors would otherwise only surface on first use.
    TestFile::descriptor()?;
    Ok(Some((store, guard)))
}

/// A store on `DATABASE_URL` that holds at most one connection.
pub fn single_connection_store(wait: Duration) -> OrmResult<Store> {
    let database_url = std::env::var("DATABASE_URL").map_err(|e| OrmError::Config(e.to_string()))?;
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| OrmError::Config(e.to_string()))?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(manager)
        .max_size(1)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(wait))
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))?;
    Ok(Store::from_pool("single", pool, wait))
}
