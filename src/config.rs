//! Configuration handling for the query router.
//!
//! Server settings come from CLI arguments and environment variables. The databases to
//! register come from a JSON file with two lists: `databaseConfigs`, registered as-is,
//! and `dataSources`, catalog databases whose query rows describe more databases.

use crate::error::{DbError, DbResult};
use crate::models::{DataSource, DatabaseConfig};
use clap::Parser;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Server configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mdb-router",
    about = "Run SQL against registered databases, one at a time or fanned out by group",
    version,
    author
)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MDB_HOST")]
    pub host: String,

    /// HTTP port to bind to
    #[arg(short, long, default_value_t = DEFAULT_HTTP_PORT, env = "MDB_PORT")]
    pub port: u16,

    /// Path of the JSON file listing databases and data sources
    #[arg(
        short,
        long = "config",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_PATH,
        env = "MDB_CONFIG"
    )]
    pub config_path: PathBuf,

    /// Per-request query deadline in seconds
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS, env = "MDB_QUERY_TIMEOUT")]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MDB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MDB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

/// Raw contents of the databases file.
///
/// Entries stay untyped until [`DatabasesFile::decode`] so that one malformed entry
/// cannot reject the whole file.
#[derive(Debug, Default, Deserialize)]
pub struct DatabasesFile {
    #[serde(rename = "dataSources", default)]
    pub data_sources: Vec<JsonValue>,
    #[serde(rename = "databaseConfigs", default)]
    pub database_configs: Vec<JsonValue>,
}

/// Typed entries of the databases file plus one error per rejected entry.
#[derive(Debug, Default)]
pub struct Databases {
    pub data_sources: Vec<DataSource>,
    pub database_configs: Vec<DatabaseConfig>,
    pub errors: Vec<DbError>,
}

impl DatabasesFile {
    /// Read and parse the databases file.
    pub fn load(path: &Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> DbResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| DbError::config(format!("invalid databases file: {}", e)))
    }

    /// Decode each entry independently.
    pub fn decode(self) -> Databases {
        let mut errors = Vec::new();
        let data_sources = decode_entries(self.data_sources, "dataSources", &mut errors);
        let database_configs =
            decode_entries(self.database_configs, "databaseConfigs", &mut errors);
        Databases {
            data_sources,
            database_configs,
            errors,
        }
    }
}

fn decode_entries<T: DeserializeOwned>(
    entries: Vec<JsonValue>,
    list: &str,
    errors: &mut Vec<DbError>,
) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match serde_json::from_value::<T>(entry) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                errors.push(DbError::config(format!("{}[{}]: {}", list, idx, e)));
                None
            }
        })
        .collect()
}
