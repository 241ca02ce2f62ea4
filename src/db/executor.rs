//! Query execution engine.
//!
//! Every execution runs inside one transaction on one pooled connection, through the
//! simple query protocol so that scripts with several statements are accepted. The
//! outcome is an [`Execution`]: normalized data, an error, or both when rows were read
//! before the failure.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific transaction runner
//! - `postgres`: PostgreSQL-specific transaction runner
//! - `sqlite`: SQLite-specific transaction runner
//!
//! Each submodule is generated from the same body by `impl_transaction_runner!`.
//! Firebird executes on a blocking worker, see [`crate::db::firebird`].

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{GroupQueryResult, QueryData, QueryError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Outcome of one execution.
///
/// `data` holds the rows read, `error` the failure if any. Both are set when a query
/// failed after producing rows.
#[derive(Debug)]
pub struct Execution {
    pub data: Option<QueryData>,
    pub error: Option<DbError>,
}

impl Execution {
    pub fn succeeded(data: QueryData) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: DbError, partial: Option<QueryData>) -> Self {
        Self {
            data: partial,
            error: Some(error),
        }
    }

    /// Discard partial rows and keep the first-class outcome.
    pub fn into_result(self) -> DbResult<QueryData> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.data.unwrap_or_default()),
        }
    }

    /// Convert into the per-target JSON result. Partial rows move into the error payload.
    pub fn into_group_result(self, group_name: impl Into<String>) -> GroupQueryResult {
        match self.error {
            Some(e) => GroupQueryResult::failure(group_name, QueryError::new(&e, self.data)),
            None => GroupQueryResult::success(group_name, self.data.unwrap_or_default()),
        }
    }
}

/// Execute `sql` on `pool` in a single transaction.
///
/// Cancelling `cancel` aborts the execution at its next await point. The caller gets
/// [`DbError::Cancelled`] together with any rows read so far.
pub async fn execute_query(pool: &DbPool, sql: &str, cancel: &CancellationToken) -> Execution {
    let start = Instant::now();
    debug!(sql = %sql, dialect = %pool.dialect(), "Executing query");

    let execution = impl_db_dispatch!(pool, {
        MySql(p) => mysql::run_in_transaction(p, sql, cancel).await,
        Postgres(p) => postgres::run_in_transaction(p, sql, cancel).await,
        SQLite(p) => sqlite::run_in_transaction(p, sql, cancel).await,
        #[cfg(feature = "firebird")]
        Firebird(p) => p.execute(sql, cancel).await,
    });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let rows = execution.data.as_ref().map_or(0, |d| d.rows.len());
    match &execution.error {
        None => debug!(rows, elapsed_ms, "Query completed"),
        Some(e) if e.is_cancelled() => debug!(rows, elapsed_ms, "Query cancelled"),
        Some(e) => debug!(rows, elapsed_ms, error = %e, "Query failed"),
    }
    execution
}

/// Log a failed rollback. Rollbacks that found no open transaction are expected after
/// some server-side errors and only logged at debug level.
pub fn log_rollback_failure(err: &sqlx::Error) {
    if is_no_transaction_error(err) {
        debug!(error = %err, "Rollback found no active transaction");
    } else {
        error!(error = %err, "Failed to roll back transaction");
    }
}

fn is_no_transaction_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_lowercase();
            message.contains("no transaction is active")
                || message.contains("no transaction is in progress")
                || message.contains("no transaction in progress")
        }
        _ => false,
    }
}

/// Read the first two columns of every row as text.
///
/// Used for introspection statements returning `(table, column)` pairs; cells that are
/// not text are skipped with a warning.
pub fn text_pairs(data: &QueryData) -> Vec<(String, String)> {
    let (Some(first), Some(second)) = (data.columns.first(), data.columns.get(1)) else {
        return Vec::new();
    };

    data.rows
        .iter()
        .filter_map(|row| {
            let left = row.get(&first.field_name).and_then(|v| v.as_text());
            let right = row.get(&second.field_name).and_then(|v| v.as_text());
            match (left, right) {
                (Some(l), Some(r)) => Some((l.trim().to_string(), r.trim().to_string())),
                _ => {
                    warn!(row = ?row, "Skipping introspection row with non-text cells");
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// Database-Specific Runners
// =============================================================================

mod mysql {
    crate::impl_transaction_runner!(sqlx::MySqlPool);
}

mod postgres {
    crate::impl_transaction_runner!(sqlx::PgPool);
}

mod sqlite {
    crate::impl_transaction_runner!(sqlx::SqlitePool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, Column, RowMap};

    fn data(rows: Vec<(CellValue, CellValue)>) -> QueryData {
        QueryData {
            columns: vec![
                Column {
                    name: "table_name".into(),
                    field_name: "table_name".into(),
                },
                Column {
                    name: "column_name".into(),
                    field_name: "column_name".into(),
                },
            ],
            rows: rows
                .into_iter()
                .map(|(t, c)| {
                    let mut row = RowMap::new();
                    row.insert("table_name".into(), t);
                    row.insert("column_name".into(), c);
                    row
                })
                .collect(),
        }
    }

    #[test]
    fn test_text_pairs_trims_and_skips_non_text() {
        let data = data(vec![
            (CellValue::Text("USERS   ".into()), CellValue::Text("ID  ".into())),
            (CellValue::Int(1), CellValue::Text("x".into())),
        ]);
        assert_eq!(
            text_pairs(&data),
            vec![("USERS".to_string(), "ID".to_string())]
        );
    }

    #[test]
    fn test_text_pairs_empty() {
        assert!(text_pairs(&QueryData::default()).is_empty());
    }

    #[test]
    fn test_execution_failure_moves_partial_into_error() {
        let partial = data(vec![(
            CellValue::Text("a".into()),
            CellValue::Text("b".into()),
        )]);
        let result = Execution::failed(DbError::Cancelled, Some(partial.clone()))
            .into_group_result("g");
        assert!(result.data.is_none());
        let error = result.error.unwrap();
        assert_eq!(error.kind, "cancelled");
        assert_eq!(error.partial, Some(partial));
    }

    #[test]
    fn test_execution_success_defaults_to_empty_data() {
        let result = Execution {
            data: None,
            error: None,
        }
        .into_group_result("g");
        assert_eq!(result.data, Some(QueryData::default()));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_into_result_drops_partial() {
        let err = Execution::failed(DbError::query("boom", None), Some(QueryData::default()))
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
