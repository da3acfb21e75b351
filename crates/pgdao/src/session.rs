//! Session and unit-of-work lifecycle.
//!
//! A [`Session`] is one pooled connection with one open transaction. Every
//! public operation runs as a unit of work:
//!
//! 1. check a connection out of the pool (`PoolExhausted` on wait timeout),
//! 2. `BEGIN`,
//! 3. run the body, optionally under a deadline,
//! 4. `COMMIT` on success, `ROLLBACK` on any error,
//! 5. return the connection to the pool (on drop, on every path).
//!
//! Store-level failures leave the unit of work as [`OrmError::Persistence`].
//! Several operations can share one unit of work with [`transaction!`]:
//!
//! ```ignore
//! use pgdao::{Dao, transaction};
//!
//! let moved = transaction!(store, tx, {
//!     files.on(&tx).remove_by_id(old_id).await?;
//!     files.on(&tx).insert(&mut replacement).await?;
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, error, info, warn};

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::pool::Store;

/// One pooled connection with an open transaction.
pub struct Session<'a> {
    tx: deadpool_postgres::Transaction<'a>,
    store: Arc<str>,
    echo: bool,
}

impl<'a> Session<'a> {
    /// Open a transaction on a checked-out connection of `store`.
    pub async fn begin(client: &'a mut deadpool_postgres::Client, store: &Store) -> OrmResult<Self> {
        let tx = client.transaction().await.map_err(OrmError::from_db_error)?;
        Ok(Self {
            tx,
            store: store.name_arc(),
            echo: store.echo_statements(),
        })
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    pub async fn commit(self) -> OrmResult<()> {
        self.tx.commit().await.map_err(OrmError::from_db_error)
    }

    pub async fn rollback(self) -> OrmResult<()> {
        self.tx.rollback().await.map_err(OrmError::from_db_error)
    }

    fn log(&self, sql: &str, params: usize) {
        if self.echo {
            info!(target: "pgdao::sql", store = self.store_name(), params, "{sql}");
        } else {
            debug!(target: "pgdao::sql", store = self.store_name(), params, "{sql}");
        }
    }
}

impl GenericClient for Session<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        self.log(sql, params.len());
        GenericClient::query(&self.tx, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        self.log(sql, params.len());
        GenericClient::execute(&self.tx, sql, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        GenericClient::cancel_token(&self.tx)
    }
}

/// Await `future`, giving up after `deadline`.
///
/// On expiry the future is dropped, a server-side cancel is sent in the
/// background when `cancel` is available, and [`OrmError::Timeout`] is returned.
pub async fn run_with_deadline<T, F>(
    deadline: Option<Duration>,
    cancel: Option<tokio_postgres::CancelToken>,
    future: F,
) -> OrmResult<T>
where
    F: Future<Output = OrmResult<T>>,
{
    match deadline {
        Some(timeout) => {
            tokio::pin!(future);
            tokio::select! {
                result = &mut future => result,
                _ = tokio::time::sleep(timeout) => {
                    if let Some(cancel_token) = cancel {
                        tokio::spawn(async move {
                            let _ = cancel_token.cancel_query(NoTls).await;
                        });
                    }
                    Err(OrmError::Timeout(timeout))
                }
            }
        }
        None => future.await,
    }
}

/// Commit or roll back `session` according to `result`.
pub async fn finish<T>(session: Session<'_>, result: OrmResult<T>, operation: &'static str) -> OrmResult<T> {
    let store = Arc::clone(&session.store);
    match result {
        Ok(value) => match session.commit().await {
            Ok(()) => Ok(value),
            Err(e) => {
                error!(store = %store, operation, error = %e, "commit failed");
                Err(e.into_persistence(operation))
            }
        },
        Err(e) => {
            if let Err(rollback_err) = session.rollback().await {
                warn!(store = %store, operation, error = %rollback_err, "rollback failed");
            }
            error!(store = %store, operation, error = %e, "unit of work rolled back");
            Err(e.into_persistence(operation))
        }
    }
}

/// Run `$body` as one unit of work on `$store`, binding the session to `$tx`.
///
/// Evaluates to `OrmResult<T>`; `$body` must evaluate to `OrmResult<T>`.
#[doc(hidden)]
#[macro_export]
macro_rules! __unit_of_work {
    ($store:expr, $operation:expr, $deadline:expr, $tx:ident, $body:block) => {{
        let __pgdao_store = &$store;
        let __pgdao_operation: &'static str = $operation;
        match __pgdao_store.checkout().await {
            Err(e) => Err(e),
            Ok(mut __pgdao_client) => {
                match $crate::Session::begin(&mut __pgdao_client, __pgdao_store).await {
                    Err(e) => Err(e.into_persistence(__pgdao_operation)),
                    Ok($tx) => {
                        let __pgdao_result = $crate::session::run_with_deadline(
                            $deadline,
                            $crate::GenericClient::cancel_token(&$tx),
                            async { $body },
                        )
                        .await;
                        $crate::session::finish($tx, __pgdao_result, __pgdao_operation).await
                    }
                }
            }
        }
    }};
}

/// Runs the given block as one unit of work on a [`Store`].
///
/// - Checks out a connection and begins a transaction bound to `$tx`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`; store errors come back as [`OrmError::Persistence`].
/// - Honours the store's deadline, if one is set.
///
/// The block must evaluate to `pgdao::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($store:expr, $tx:ident, $body:block) => {{
        let __pgdao_tx_store = &$store;
        $crate::__unit_of_work!(
            __pgdao_tx_store,
            "transaction",
            __pgdao_tx_store.deadline(),
            $tx,
            $body
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HangingClient;

    impl GenericClient for HangingClient {
        async fn query(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }

        async fn execute(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn deadline_expires_on_hanging_client() {
        let client = HangingClient;
        let err = run_with_deadline(
            Some(Duration::from_millis(10)),
            client.cancel_token(),
            client.execute("SELECT pg_sleep(60)", &[]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrmError::Timeout(d) if d == Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn no_deadline_awaits_to_completion() {
        let value = run_with_deadline(None, None, async { Ok::<_, OrmError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn fast_future_beats_deadline() {
        let value = run_with_deadline(Some(Duration::from_secs(5)), None, async {
            Ok::<_, OrmError>("done")
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn errors_inside_deadline_pass_through() {
        let err = run_with_deadline(Some(Duration::from_secs(5)), None, async {
            Err::<(), _>(OrmError::invalid_argument("bad"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
    }
}
