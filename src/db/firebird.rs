//! Firebird backend.
//!
//! The Firebird driver is synchronous, so each execution opens a connection on a
//! blocking worker thread. A semaphore sized by `maxOpenConns` bounds how many
//! connections are open at once; closing the pool closes the semaphore.
//!
//! Cancellation returns to the caller immediately. The worker finishes in the
//! background and its transaction is rolled back when the connection drops.

use crate::db::executor::Execution;
use crate::db::normalize::{ResultBuilder, ScanRow};
use crate::error::{DbError, DbResult};
use crate::models::{CellValue, ConnectionConfig, PoolConfig};
use rsfbclient::{FbError, Queryable, Row, SimpleConnection, SqlType};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const PING_SQL: &str = "SELECT 1 FROM RDB$DATABASE";

#[derive(Debug, Clone)]
pub struct FirebirdPool {
    config: Arc<ConnectionConfig>,
    permits: Arc<Semaphore>,
}

impl FirebirdPool {
    pub fn new(config: &ConnectionConfig, limits: &PoolConfig) -> Self {
        Self {
            config: Arc::new(config.clone()),
            permits: Arc::new(Semaphore::new(limits.max_connections() as usize)),
        }
    }

    pub async fn ping(&self) -> DbResult<()> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || {
            let mut conn = connect(&config)?;
            conn.query_first::<(), Row>(PING_SQL, ()).map_err(|e| {
                DbError::connection(format!("Ping failed for Firebird: {}", e), suggestion(&e))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| DbError::internal(format!("Firebird worker failed: {}", e)))?
    }

    pub async fn execute(&self, sql: &str, cancel: &CancellationToken) -> Execution {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Execution::failed(DbError::Cancelled, None),
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return Execution::failed(
                        DbError::connection("Connection pool is closed", "Re-register the database"),
                        None,
                    );
                }
            },
        };

        let config = Arc::clone(&self.config);
        let sql = sql.to_string();
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_blocking(&config, &sql)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Execution::failed(DbError::Cancelled, None),
            joined = worker => joined.unwrap_or_else(|e| {
                Execution::failed(DbError::internal(format!("Firebird worker failed: {}", e)), None)
            }),
        }
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

fn connect(config: &ConnectionConfig) -> DbResult<SimpleConnection> {
    rsfbclient::builder_pure_rust()
        .host(&config.host)
        .port(config.effective_port())
        .db_name(&config.dbname)
        .user(&config.username)
        .pass(&config.password)
        .connect()
        .map(SimpleConnection::from)
        .map_err(|e| {
            DbError::connection(format!("Failed to connect to Firebird: {}", e), suggestion(&e))
        })
}

fn suggestion(err: &FbError) -> String {
    crate::db::pool::connection_suggestion(crate::models::Dialect::Firebird, &err.to_string())
}

fn run_blocking(config: &ConnectionConfig, sql: &str) -> Execution {
    let mut conn = match connect(config) {
        Ok(conn) => conn,
        Err(e) => return Execution::failed(e, None),
    };

    let mut builder = ResultBuilder::new();
    let outcome = run_in_transaction(&mut conn, sql, &mut builder);

    if let Err(e) = conn.close() {
        warn!(error = %e, "Failed to close Firebird connection");
    }

    match outcome {
        Ok(()) => Execution::succeeded(builder.finish()),
        Err(e) => Execution::failed(DbError::query(e.to_string(), None), Some(builder.finish())),
    }
}

fn run_in_transaction(
    conn: &mut SimpleConnection,
    sql: &str,
    builder: &mut ResultBuilder,
) -> Result<(), FbError> {
    conn.begin_transaction()?;

    let scanned = conn.query_iter::<_, Row>(sql, ()).and_then(|rows| {
        for row in rows {
            builder.push(&row?);
        }
        Ok(())
    });

    match scanned {
        Ok(()) => conn.commit(),
        Err(e) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(error = %rollback_err, "Failed to roll back Firebird transaction");
            }
            Err(e)
        }
    }
}

impl ScanRow for Row {
    fn column_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }

    fn values(&self) -> Vec<CellValue> {
        self.cols
            .iter()
            .map(|c| match &c.value {
                SqlType::Null => CellValue::Null,
                SqlType::Boolean(v) => CellValue::Bool(*v),
                SqlType::Integer(v) => CellValue::Int(*v),
                SqlType::Floating(v) => CellValue::from_f64(*v),
                SqlType::Text(v) => CellValue::Text(v.clone()),
                SqlType::Binary(v) => CellValue::from_bytes(v),
                SqlType::Timestamp(v) => CellValue::Text(v.to_string()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsfbclient::Column;

    fn row(cols: Vec<(&str, SqlType)>) -> Row {
        Row {
            cols: cols
                .into_iter()
                .map(|(name, value)| Column::new(name.to_string(), 0, value))
                .collect(),
        }
    }

    #[test]
    fn test_scan_row_maps_sql_types() {
        let row = row(vec![
            ("ID", SqlType::Integer(7)),
            ("NAME", SqlType::Text("ada".into())),
            ("SCORE", SqlType::Floating(1.5)),
            ("ACTIVE", SqlType::Boolean(true)),
            ("NOTE", SqlType::Null),
            ("RAW", SqlType::Binary(b"blob".to_vec())),
        ]);

        assert_eq!(row.column_names(), vec!["ID", "NAME", "SCORE", "ACTIVE", "NOTE", "RAW"]);
        assert_eq!(
            row.values(),
            vec![
                CellValue::Int(7),
                CellValue::Text("ada".into()),
                CellValue::from_f64(1.5),
                CellValue::Bool(true),
                CellValue::Null,
                CellValue::Text("blob".into()),
            ]
        );
    }

    #[test]
    fn test_scan_row_deduplicates_repeated_columns() {
        let row = row(vec![
            ("ID", SqlType::Integer(1)),
            ("ID", SqlType::Integer(2)),
        ]);
        let mut builder = ResultBuilder::new();
        builder.push(&row);
        let data = builder.finish();

        assert_eq!(data.field_names().collect::<Vec<_>>(), vec!["ID", "ID__1"]);
        assert_eq!(data.rows[0]["ID__1"], CellValue::Int(2));
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_queries() {
        let config =
            ConnectionConfig::new(crate::models::Dialect::Firebird, "localhost", 0, "db", "u", "p");
        let pool = FirebirdPool::new(&config, &PoolConfig::default());
        pool.close();

        let execution = pool.execute(PING_SQL, &CancellationToken::new()).await;
        assert!(execution.data.is_none());
        assert_eq!(execution.error.unwrap().kind(), "connection");
    }
}
