//! Error types for pgdao

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pgdao operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for data-access operations.
///
/// Validation variants (`Schema`, `InvalidArgument`, `UnknownColumn`) are returned
/// before any statement reaches the store. Store-level causes (`Query`,
/// constraint violations, `Decode`, `Connection`) are wrapped into
/// [`OrmError::Persistence`] once the unit of work has been rolled back.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Entity declaration is unusable (no primary key, bad identifier, ...)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Caller passed an argument the layer cannot act on
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A filter, projection or record referenced a column the entity does not declare
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// The store rejected a statement inside a unit of work (already rolled back)
    #[error("Persistence error during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: Box<OrmError>,
    },

    /// No pooled connection became available within the pool timeout
    #[error("Connection pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),

    /// Other pool failures (closed pool, connection setup)
    #[error("Pool error: {0}")]
    Pool(String),

    /// Operation deadline expired; the unit of work was rolled back
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row not found (strict lookups only)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unknown-column error
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Whether this error originated in the store (as opposed to local validation,
    /// pool checkout or deadlines).
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::Query(_)
                | Self::UniqueViolation(_)
                | Self::ForeignKeyViolation(_)
                | Self::CheckViolation(_)
                | Self::Decode { .. }
                | Self::Connection(_)
        )
    }

    /// Wrap a store-level error into [`OrmError::Persistence`]; other errors pass through.
    pub fn into_persistence(self, operation: &'static str) -> Self {
        if self.is_store_error() {
            Self::Persistence {
                operation,
                source: Box::new(self),
            }
        } else {
            self
        }
    }

    /// The innermost error, looking through [`OrmError::Persistence`].
    pub fn root_cause(&self) -> &OrmError {
        match self {
            Self::Persistence { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.root_cause(), Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Query(err)
    }

    /// Map a pool checkout failure. A wait timeout means the pool is exhausted.
    pub(crate) fn from_pool_error(err: deadpool_postgres::PoolError, wait: Duration) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => Self::PoolExhausted(wait),
            deadpool_postgres::PoolError::Backend(e) => Self::from_db_error(e),
            other => Self::Pool(other.to_string()),
        }
    }
}
