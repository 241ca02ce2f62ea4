//! Connection-related data models.
//!
//! This module defines the addressable-database types: dialect, group identity,
//! connection parameters and pool tuning. They are plain data; opening connections
//! lives in [`crate::db::pool`].

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pool size when `maxOpenConns` is absent or zero.
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
/// Default idle cap when `maxIdleConns` is absent.
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 2;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    Firebird,
    /// Local file databases; `name` holds the path
    SQLite,
}

impl Dialect {
    /// The identifier used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::Firebird => "firebird",
            Self::SQLite => "sqlite",
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::Firebird => "Firebird",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this dialect.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::Firebird => Some(3050),
            Self::SQLite => None,
        }
    }

    /// True for dialects reached over the network (host and port required).
    pub fn is_networked(&self) -> bool {
        self.default_port().is_some()
    }
}

impl std::str::FromStr for Dialect {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "firebird" => Ok(Self::Firebird),
            "sqlite" => Ok(Self::SQLite),
            _ => Err(DbError::config(format!("unknown type: {}", s))),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Composite key of one logical database slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupIdentity {
    #[serde(rename = "groupName")]
    pub name: String,
    #[serde(rename = "groupType")]
    pub group_type: String,
}

impl GroupIdentity {
    pub fn new(name: impl Into<String>, group_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: group_type.into(),
        }
    }
}

impl std::fmt::Display for GroupIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group_type, self.name)
    }
}

/// Network address and credentials of one database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub dialect: Dialect,
    #[serde(rename = "hostname", default)]
    pub host: String,
    /// Zero selects the dialect's default port
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "name")]
    pub dbname: String,
    #[serde(default)]
    pub username: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl ConnectionConfig {
    pub fn new(
        dialect: Dialect,
        host: impl Into<String>,
        port: u16,
        dbname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            host: host.into(),
            port,
            dbname: dbname.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Configuration for a local SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(Dialect::SQLite, "", 0, path, "", "")
    }

    /// Port to connect to, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.dialect.default_port()) {
            (0, Some(default)) => default,
            (port, _) => port,
        }
    }

    /// Reject parameters that can never produce a connection.
    pub fn validate(&self) -> DbResult<()> {
        if self.dbname.trim().is_empty() {
            return Err(DbError::config(format!(
                "{} connection requires a database name",
                self.dialect
            )));
        }
        if self.dialect.is_networked() && self.host.trim().is_empty() {
            return Err(DbError::config(format!(
                "{} connection requires a hostname",
                self.dialect
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Pool limits, applied once when the pool is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    #[serde(rename = "maxOpenConns")]
    pub max_open_conns: u32,
    #[serde(rename = "maxIdleConns")]
    pub max_idle_conns: u32,
    #[serde(rename = "connMaxLifetimeInSeconds")]
    pub conn_max_lifetime_secs: u64,
    #[serde(rename = "connMaxIdleTimeInSeconds")]
    pub conn_max_idle_time_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            conn_max_lifetime_secs: 0,
            conn_max_idle_time_secs: 0,
        }
    }
}

impl PoolConfig {
    /// Maximum open connections; zero means the default.
    pub fn max_connections(&self) -> u32 {
        if self.max_open_conns == 0 {
            DEFAULT_MAX_OPEN_CONNS
        } else {
            self.max_open_conns
        }
    }

    /// Idle cap, never above the open-connection cap.
    pub fn max_idle(&self) -> u32 {
        self.max_idle_conns.min(self.max_connections())
    }

    /// `None` keeps connections for the life of the pool.
    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.conn_max_lifetime_secs > 0).then(|| Duration::from_secs(self.conn_max_lifetime_secs))
    }

    /// `None` never reaps idle connections.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.conn_max_idle_time_secs > 0)
            .then(|| Duration::from_secs(self.conn_max_idle_time_secs))
    }
}

/// One registration record: identity, address and pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(flatten)]
    pub group: GroupIdentity,
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(flatten)]
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(group: GroupIdentity, connection: ConnectionConfig) -> Self {
        Self {
            group,
            connection,
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// A catalog database whose query rows describe further databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    pub query: String,
}

/// Listing entry returned by the registry (no secrets exposed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseItem {
    #[serde(flatten)]
    pub group: GroupIdentity,
    #[serde(rename = "type")]
    pub dialect: Dialect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!(Dialect::from_str("postgresql").unwrap(), Dialect::PostgreSQL);
        assert_eq!(Dialect::from_str("MySQL").unwrap(), Dialect::MySQL);
        assert_eq!(Dialect::from_str("firebird").unwrap(), Dialect::Firebird);
        assert_eq!(Dialect::from_str("sqlite").unwrap(), Dialect::SQLite);
        let err = Dialect::from_str("oracle").unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("unknown type: oracle"));
    }

    #[test]
    fn test_effective_port_defaults() {
        let pg = ConnectionConfig::new(Dialect::PostgreSQL, "db", 0, "app", "u", "p");
        assert_eq!(pg.effective_port(), 5432);
        let fb = ConnectionConfig::new(Dialect::Firebird, "db", 0, "app", "u", "p");
        assert_eq!(fb.effective_port(), 3050);
        let mysql = ConnectionConfig::new(Dialect::MySQL, "db", 3307, "app", "u", "p");
        assert_eq!(mysql.effective_port(), 3307);
    }

    #[test]
    fn test_validate_requires_host_for_network_dialects() {
        let cfg = ConnectionConfig::new(Dialect::MySQL, " ", 3306, "app", "u", "p");
        assert!(cfg.validate().is_err());
        assert!(ConnectionConfig::sqlite("/tmp/x.db").validate().is_ok());
        assert!(ConnectionConfig::sqlite("").validate().is_err());
    }

    #[test]
    fn test_debug_masks_password() {
        let cfg = ConnectionConfig::new(Dialect::PostgreSQL, "db", 5432, "app", "u", "hunter2");
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_pool_config_limits() {
        let pool = PoolConfig {
            max_open_conns: 0,
            max_idle_conns: 50,
            conn_max_lifetime_secs: 600,
            conn_max_idle_time_secs: 0,
        };
        assert_eq!(pool.max_connections(), DEFAULT_MAX_OPEN_CONNS);
        assert_eq!(pool.max_idle(), DEFAULT_MAX_OPEN_CONNS);
        assert_eq!(pool.max_lifetime(), Some(Duration::from_secs(600)));
        assert_eq!(pool.idle_timeout(), None);
    }

    #[test]
    fn test_database_config_deserialize_flat_keys() {
        let json = serde_json::json!({
            "groupName": "a",
            "groupType": "test-db",
            "type": "postgresql",
            "hostname": "localhost",
            "port": 5432,
            "name": "test-non-existing-1",
            "username": "postgres",
            "password": "admin",
            "maxOpenConns": 2,
            "maxIdleConns": 1,
            "connMaxLifetimeInSeconds": 600,
            "connMaxIdleTimeInSeconds": 60
        });
        let cfg: DatabaseConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.group, GroupIdentity::new("a", "test-db"));
        assert_eq!(cfg.connection.dialect, Dialect::PostgreSQL);
        assert_eq!(cfg.connection.dbname, "test-non-existing-1");
        assert_eq!(cfg.connection.password, "admin");
        assert_eq!(cfg.pool.max_open_conns, 2);
        assert_eq!(cfg.pool.conn_max_idle_time_secs, 60);
    }

    #[test]
    fn test_database_config_pool_defaults() {
        let json = serde_json::json!({
            "groupName": "b",
            "groupType": "local",
            "type": "sqlite",
            "name": "/tmp/b.db"
        });
        let cfg: DatabaseConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.pool, PoolConfig::default());
        assert_eq!(cfg.connection.port, 0);
    }

    #[test]
    fn test_database_item_serialization() {
        let item = DatabaseItem {
            group: GroupIdentity::new("a", "shard"),
            dialect: Dialect::MySQL,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"groupName": "a", "groupType": "shard", "type": "mysql"})
        );
    }
}
