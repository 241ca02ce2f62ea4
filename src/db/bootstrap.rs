//! Catalog bootstrap.
//!
//! A data source is a catalog database plus a query whose rows describe further
//! databases. Each row is read through the regular pool factory and executor, then
//! decoded into a [`DatabaseConfig`] with the same keys as the databases file.

use crate::db::executor;
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{CellValue, DataSource, DatabaseConfig, PoolConfig, RowMap};
use serde_json::{Map, Value as JsonValue};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolve every data source concurrently.
///
/// Returns the configs read from all catalogs and one error per failed source or row.
pub async fn resolve_data_sources(
    sources: Vec<DataSource>,
) -> (Vec<DatabaseConfig>, Vec<DbError>) {
    let mut tasks = JoinSet::new();
    for source in sources {
        tasks.spawn(resolve_data_source(source));
    }

    let mut configs = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((resolved, failures)) => {
                configs.extend(resolved);
                errors.extend(failures);
            }
            Err(e) => {
                error!(error = %e, "Data source task failed");
                errors.push(DbError::internal(format!("data source task failed: {}", e)));
            }
        }
    }
    (configs, errors)
}

/// Query one catalog and decode its rows. The catalog pool is closed afterwards.
pub async fn resolve_data_source(source: DataSource) -> (Vec<DatabaseConfig>, Vec<DbError>) {
    let data = match fetch_catalog(&source).await {
        Ok(data) => data,
        Err(e) => return (Vec::new(), vec![e]),
    };

    let mut configs = Vec::with_capacity(data.rows.len());
    let mut errors = Vec::new();
    for (idx, row) in data.rows.into_iter().enumerate() {
        match decode_row(row) {
            Ok(config) => configs.push(config),
            Err(e) => errors.push(DbError::config(format!(
                "data source {} row {}: {}",
                source.connection.dbname, idx, e
            ))),
        }
    }

    info!(
        dialect = %source.connection.dialect,
        dbname = %source.connection.dbname,
        databases = configs.len(),
        "Data source resolved"
    );
    (configs, errors)
}

async fn fetch_catalog(source: &DataSource) -> DbResult<crate::models::QueryData> {
    let pool = DbPool::open(&source.connection, &PoolConfig::default()).await?;
    let execution =
        executor::execute_query(&pool, &source.query, &CancellationToken::new()).await;
    pool.close().await;
    execution.into_result()
}

/// Decode one catalog row. SQL NULLs are dropped so that field defaults apply.
pub fn decode_row(row: RowMap) -> Result<DatabaseConfig, serde_json::Error> {
    let object: Map<String, JsonValue> = row
        .into_iter()
        .filter(|(_, value)| *value != CellValue::Null)
        .map(|(key, value)| serde_json::to_value(value).map(|v| (key, v)))
        .collect::<Result<_, _>>()?;
    serde_json::from_value(JsonValue::Object(object))
}
