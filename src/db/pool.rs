//! Connection pool factory.
//!
//! Opens one pool per registered database using database-specific pools (MySqlPool,
//! PgPool, SqlitePool) to ensure full type support. A pool is handed out only after a
//! ping succeeded.

use crate::db::dialect::connection_string;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Dialect, PoolConfig};
use sqlx::{
    Connection, MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgConnectOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(feature = "firebird")]
use crate::db::firebird::FirebirdPool;

/// Time allowed to obtain a connection before an acquire fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
    #[cfg(feature = "firebird")]
    Firebird(FirebirdPool),
}

impl DbPool {
    /// Validate `config`, open a pool sized by `limits` and ping it.
    ///
    /// Any failure closes whatever was opened. Errors never echo the password.
    pub async fn open(config: &ConnectionConfig, limits: &PoolConfig) -> DbResult<Self> {
        config.validate()?;
        let url = connection_string(config)?;
        let dialect = config.dialect;

        info!(
            dialect = %dialect,
            driver = dialect.spec().driver_name,
            host = %config.host,
            dbname = %config.dbname,
            max_open = limits.max_connections(),
            max_idle = limits.max_idle(),
            "Opening connection pool"
        );

        let pool = Self::create(dialect, &url, config, limits)
            .await
            .map_err(|e| match e {
                OpenError::Sqlx(err) => DbError::connection(
                    format!("Failed to connect to {}: {}", dialect.display_name(), err),
                    connection_suggestion(dialect, &err.to_string()),
                ),
                OpenError::Db(err) => err,
            })?;

        if let Err(e) = pool.ping().await {
            pool.close().await;
            return Err(e);
        }

        debug!(dialect = %dialect, dbname = %config.dbname, "Connection pool ready");
        Ok(pool)
    }

    async fn create(
        dialect: Dialect,
        url: &str,
        config: &ConnectionConfig,
        limits: &PoolConfig,
    ) -> Result<Self, OpenError> {
        match dialect {
            Dialect::PostgreSQL => {
                let options = PgConnectOptions::from_str(url)?.statement_cache_capacity(0);
                let pool = PgPoolOptions::new()
                    .max_connections(limits.max_connections())
                    .min_connections(0)
                    .max_lifetime(limits.max_lifetime())
                    .idle_timeout(limits.idle_timeout())
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
            Dialect::MySQL => {
                let options = MySqlConnectOptions::from_str(url)?
                    .charset("utf8mb4")
                    .statement_cache_capacity(0);
                let pool = MySqlPoolOptions::new()
                    .max_connections(limits.max_connections())
                    .min_connections(0)
                    .max_lifetime(limits.max_lifetime())
                    .idle_timeout(limits.idle_timeout())
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await?;
                Ok(DbPool::MySql(pool))
            }
            Dialect::SQLite => {
                let options = SqliteConnectOptions::from_str(url)?.create_if_missing(false);
                let pool = SqlitePoolOptions::new()
                    .max_connections(limits.max_connections())
                    .min_connections(0)
                    .max_lifetime(limits.max_lifetime())
                    .idle_timeout(limits.idle_timeout())
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await?;
                Ok(DbPool::SQLite(pool))
            }
            #[cfg(feature = "firebird")]
            Dialect::Firebird => Ok(DbPool::Firebird(FirebirdPool::new(config, limits))),
            #[cfg(not(feature = "firebird"))]
            Dialect::Firebird => {
                let _ = config;
                Err(OpenError::Db(DbError::config(
                    "Firebird support is not compiled in; rebuild with the `firebird` feature",
                )))
            }
        }
    }

    /// Verify that a connection can be obtained and answers.
    pub async fn ping(&self) -> DbResult<()> {
        let dialect = self.dialect();
        let result: Result<(), sqlx::Error> = impl_db_dispatch!(self, {
            MySql(p) => async { p.acquire().await?.ping().await }.await,
            Postgres(p) => async { p.acquire().await?.ping().await }.await,
            SQLite(p) => async { p.acquire().await?.ping().await }.await,
            #[cfg(feature = "firebird")]
            Firebird(p) => return p.ping().await,
        });
        result.map_err(|e| {
            DbError::connection(
                format!("Ping failed for {}: {}", dialect.display_name(), e),
                connection_suggestion(dialect, &e.to_string()),
            )
        })
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(p) => p.close().await,
            Postgres(p) => p.close().await,
            SQLite(p) => p.close().await,
            #[cfg(feature = "firebird")]
            Firebird(p) => p.close(),
        })
    }

    /// Get the dialect served by this pool.
    pub fn dialect(&self) -> Dialect {
        impl_db_dispatch!(self, {
            MySql(_p) => Dialect::MySQL,
            Postgres(_p) => Dialect::PostgreSQL,
            SQLite(_p) => Dialect::SQLite,
            #[cfg(feature = "firebird")]
            Firebird(_p) => Dialect::Firebird,
        })
    }
}

enum OpenError {
    Sqlx(sqlx::Error),
    Db(DbError),
}

impl From<sqlx::Error> for OpenError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

/// Generate a helpful suggestion based on the connection error.
pub(crate) fn connection_suggestion(dialect: Dialect, error: &str) -> String {
    let error_str = error.to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            dialect.display_name()
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist")
        || error_str.contains("unknown database")
        || error_str.contains("unable to open database")
    {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match dialect {
        Dialect::PostgreSQL | Dialect::MySQL | Dialect::Firebird => format!(
            "Verify hostname, port (default {}) and database name",
            dialect.default_port().unwrap_or_default()
        ),
        Dialect::SQLite => "Verify the file path exists and is accessible".to_string(),
    }
}
