//! Store configuration.
//!
//! A [`StoreConfig`] is plain data: it can be deserialised from whatever
//! configuration source the application uses, built in code with the setter
//! methods, or read from `{PREFIX}_DB_*` environment variables.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_postgres::config::SslMode;

use crate::error::{OrmError, OrmResult};

/// Connection and pool settings for one [`crate::Store`].
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label used in log events.
    pub name: String,
    /// `postgres` or `postgresql`, optionally with a `+driver` suffix.
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub pool_size: usize,
    /// Extra connections allowed on top of `pool_size`.
    pub max_overflow: usize,
    pub pool_timeout_seconds: u64,
    /// Connections older than this are discarded instead of reused.
    pub pool_recycle_seconds: u64,
    /// Log every statement at INFO instead of DEBUG.
    pub echo_statements: bool,
    pub connect_args: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            protocol: "postgresql".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: String::new(),
            password: String::new(),
            pool_size: 20,
            max_overflow: 40,
            pool_timeout_seconds: 60,
            pool_recycle_seconds: 3600,
            echo_statements: false,
            connect_args: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("max_overflow", &self.max_overflow)
            .field("pool_timeout_seconds", &self.pool_timeout_seconds)
            .field("pool_recycle_seconds", &self.pool_recycle_seconds)
            .field("echo_statements", &self.echo_statements)
            .field("connect_args", &self.connect_args)
            .finish()
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{prefix}_DB_HOST`, `_DB_PORT`, `_DB_NAME`, `_DB_USER` and
    /// `_DB_PASSWORD`. Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> OrmResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let var = |suffix: &str| lookup(&format!("{prefix}_DB_{suffix}"));
        let mut config = Self::default().name(prefix.to_ascii_lowercase());
        if let Some(host) = var("HOST") {
            config.host = host;
        }
        if let Some(port) = var("PORT") {
            config.port = port.trim().parse().map_err(|_| {
                OrmError::Config(format!("{prefix}_DB_PORT is not a valid port: '{port}'"))
            })?;
        }
        if let Some(database) = var("NAME") {
            config.database = database;
        }
        if let Some(username) = var("USER") {
            config.username = username;
        }
        if let Some(password) = var("PASSWORD") {
            config.password = password;
        }
        Ok(config)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn max_overflow(mut self, overflow: usize) -> Self {
        self.max_overflow = overflow;
        self
    }

    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout_seconds = timeout.as_secs();
        self
    }

    pub fn pool_recycle(mut self, recycle: Duration) -> Self {
        self.pool_recycle_seconds = recycle.as_secs();
        self
    }

    pub fn echo_statements(mut self, echo: bool) -> Self {
        self.echo_statements = echo;
        self
    }

    pub fn connect_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_args.insert(key.into(), value.into());
        self
    }

    /// Upper bound on open connections.
    pub fn max_connections(&self) -> usize {
        self.pool_size + self.max_overflow
    }

    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_seconds)
    }

    pub fn pool_recycle_after(&self) -> Duration {
        Duration::from_secs(self.pool_recycle_seconds)
    }

    pub fn validate(&self) -> OrmResult<()> {
        let scheme = self.protocol.split('+').next().unwrap_or_default();
        if !matches!(scheme, "postgres" | "postgresql") {
            return Err(OrmError::Config(format!(
                "unsupported protocol '{}': only postgres/postgresql is supported",
                self.protocol
            )));
        }
        if self.host.is_empty() {
            return Err(OrmError::Config("host must not be empty".to_string()));
        }
        if self.max_connections() == 0 {
            return Err(OrmError::Config(
                "pool_size + max_overflow must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Driver configuration for new connections.
    pub fn pg_config(&self) -> OrmResult<tokio_postgres::Config> {
        self.validate()?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host).port(self.port).dbname(&self.database);
        if !self.username.is_empty() {
            pg.user(&self.username);
        }
        if !self.password.is_empty() {
            pg.password(&self.password);
        }

        for (key, value) in &self.connect_args {
            match key.as_str() {
                "application_name" => {
                    pg.application_name(value);
                }
                "options" => {
                    pg.options(value);
                }
                "connect_timeout" => {
                    pg.connect_timeout(Duration::from_secs(parse_arg(key, value)?));
                }
                "keepalives" => {
                    pg.keepalives(parse_flag(key, value)?);
                }
                "keepalives_idle" => {
                    pg.keepalives_idle(Duration::from_secs(parse_arg(key, value)?));
                }
                "sslmode" => {
                    pg.ssl_mode(match value.as_str() {
                        "disable" => SslMode::Disable,
                        "prefer" => SslMode::Prefer,
                        "require" => SslMode::Require,
                        other => {
                            return Err(OrmError::Config(format!("invalid sslmode '{other}'")));
                        }
                    });
                }
                other => {
                    return Err(OrmError::Config(format!("unknown connect arg '{other}'")));
                }
            }
        }
        Ok(pg)
    }
}

fn parse_arg(key: &str, value: &str) -> OrmResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| OrmError::Config(format!("connect arg '{key}' expects seconds, got '{value}'")))
}

fn parse_flag(key: &str, value: &str) -> OrmResult<bool> {
    match value.trim() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(OrmError::Config(format!(
            "connect arg '{key}' expects a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = StoreConfig::default();
        assert_eq!(c.name, "default");
        assert_eq!(c.port, 5432);
        assert_eq!(c.pool_size, 20);
        assert_eq!(c.max_overflow, 40);
        assert_eq!(c.max_connections(), 60);
        assert_eq!(c.pool_wait_timeout(), Duration::from_secs(60));
        assert_eq!(c.pool_recycle_after(), Duration::from_secs(3600));
        assert!(!c.echo_statements);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let c: StoreConfig = serde_json::from_value(serde_json::json!({
            "host": "db",
            "database": "files",
            "pool_size": 5,
            "connect_args": {"application_name": "worker"}
        }))
        .unwrap();
        assert_eq!(c.host, "db");
        assert_eq!(c.pool_size, 5);
        assert_eq!(c.max_overflow, 40);
        assert_eq!(c.connect_args["application_name"], "worker");
    }

    #[test]
    fn reads_prefixed_env_vars() {
        let vars: HashMap<&str, &str> = [
            ("PGSQL_DB_HOST", "10.0.0.2"),
            ("PGSQL_DB_PORT", "6543"),
            ("PGSQL_DB_NAME", "files"),
            ("PGSQL_DB_USER", "app"),
            ("PGSQL_DB_PASSWORD", "s3cret"),
        ]
        .into_iter()
        .collect();
        let c = StoreConfig::from_lookup("PGSQL", |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.name, "pgsql");
        assert_eq!(c.host, "10.0.0.2");
        assert_eq!(c.port, 6543);
        assert_eq!(c.database, "files");
        assert_eq!(c.username, "app");
        assert_eq!(c.password, "s3cret");
    }

    #[test]
    fn bad_env_port_is_config_error() {
        let err = StoreConfig::from_lookup("PGSQL", |k| {
            (k == "PGSQL_DB_PORT").then(|| "port".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }

    #[test]
    fn debug_redacts_password() {
        let c = StoreConfig::new().password("hunter2");
        let debug = format!("{c:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn protocol_validation() {
        assert!(StoreConfig::new().protocol("postgresql+psycopg2").validate().is_ok());
        assert!(StoreConfig::new().protocol("postgres").validate().is_ok());
        assert!(matches!(
            StoreConfig::new().protocol("mysql+pymysql").validate(),
            Err(OrmError::Config(_))
        ));
    }

    #[test]
    fn pg_config_applies_connect_args() {
        let pg = StoreConfig::new()
            .username("app")
            .connect_arg("application_name", "worker")
            .connect_arg("connect_timeout", "5")
            .connect_arg("keepalives", "1")
            .pg_config()
            .unwrap();
        assert_eq!(pg.get_user(), Some("app"));
        assert_eq!(pg.get_application_name(), Some("worker"));
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_secs(5)));
        assert!(pg.get_keepalives());
    }

    #[test]
    fn pg_config_rejects_unknown_args() {
        assert!(StoreConfig::new().connect_arg("nope", "1").pg_config().is_err());
        assert!(StoreConfig::new().connect_arg("sslmode", "maybe").pg_config().is_err());
        assert!(StoreConfig::new().connect_arg("connect_timeout", "soon").pg_config().is_err());
    }
}
