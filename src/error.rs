//! Error types for the query router.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Registration errors are fatal to one entry only; query errors are embedded in the
//! per-target result and never abort sibling targets.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("database is already added with groupName={group_name}, groupType={group_type}")]
    RegistrationConflict {
        group_name: String,
        group_type: String,
    },

    #[error("{message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("no database registered with groupName: {group_name}, groupType: {group_type}")]
    TargetNotFound {
        group_name: String,
        group_type: String,
    },

    #[error("Query cancelled before completion")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn registration_conflict(
        group_name: impl Into<String>,
        group_type: impl Into<String>,
    ) -> Self {
        Self::RegistrationConflict {
            group_name: group_name.into(),
            group_type: group_type.into(),
        }
    }

    /// Create a query execution error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    pub fn target_not_found(group_name: impl Into<String>, group_type: impl Into<String>) -> Self {
        Self::TargetNotFound {
            group_name: group_name.into(),
            group_type: group_type.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable tag used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Connection { .. } => "connection",
            Self::RegistrationConflict { .. } => "conflict",
            Self::Query { .. } => "query",
            Self::TargetNotFound { .. } => "not_found",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the pool",
                "Check that the database is reachable or raise maxOpenConns",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Re-register the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::query(err.to_string(), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_target_not_found_message_names_target() {
        let err = DbError::target_not_found("tenant-7", "shard");
        assert_eq!(
            err.to_string(),
            "no database registered with groupName: tenant-7, groupType: shard"
        );
        assert!(err.is_not_found());
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_conflict_message() {
        let err = DbError::registration_conflict("a", "test-db");
        assert!(err.to_string().contains("groupName=a"));
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_query_error_is_bare_engine_message() {
        let err = DbError::query("relation \"nope\" does not exist", Some("42P01".into()));
        assert_eq!(err.to_string(), "relation \"nope\" does not exist");
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.kind(), "connection");
        assert_eq!(err.suggestion(), Some("Re-register the database"));
    }

    #[test]
    fn test_row_not_found_maps_to_query() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), "query");
    }

    #[test]
    fn test_cancelled() {
        assert!(DbError::Cancelled.is_cancelled());
        assert!(!DbError::internal("x").is_cancelled());
        assert_eq!(DbError::Cancelled.kind(), "cancelled");
    }
}
