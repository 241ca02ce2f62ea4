//! Database registry.
//!
//! [`DatabaseStore`] owns one pool per [`GroupIdentity`] and dispatches queries to a
//! single database or, concurrently, to every database of a group type. The map lock
//! is only held to read or mutate the map; pools are cloned out of it before any I/O.

use crate::db::executor::{self, Execution};
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseConfig, DatabaseItem, Dialect, GroupIdentity, GroupQueryResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tables of one database, each with its columns in ordinal order.
pub type TablesMetadata = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
struct DatabaseEntry {
    config: DatabaseConfig,
    pool: DbPool,
}

/// A registered database as handed out for one call.
#[derive(Debug, Clone)]
pub struct DatabaseHandle {
    pub identity: GroupIdentity,
    pub dialect: Dialect,
    pub pool: DbPool,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseStore {
    databases: Arc<RwLock<HashMap<GroupIdentity, DatabaseEntry>>>,
}

impl DatabaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pool for `config` and register it under its group identity.
    ///
    /// Fails with [`DbError::RegistrationConflict`] when the identity is taken; the
    /// pool opened for the rejected entry is closed before returning.
    pub async fn add_database(&self, config: DatabaseConfig) -> DbResult<()> {
        let identity = config.group.clone();

        // Early check for existing registration
        {
            let databases = self.databases.read().await;
            if databases.contains_key(&identity) {
                return Err(DbError::registration_conflict(
                    &identity.name,
                    &identity.group_type,
                ));
            }
        }

        let pool = DbPool::open(&config.connection, &config.pool).await?;

        // Re-check after async work to prevent TOCTOU race
        // If duplicate detected, return the pool so we can close it outside the lock
        let pool_to_close: Option<DbPool> = {
            let mut databases = self.databases.write().await;
            if databases.contains_key(&identity) {
                Some(pool)
            } else {
                databases.insert(identity.clone(), DatabaseEntry { config, pool });
                None
            }
        }; // Lock released here

        if let Some(pool) = pool_to_close {
            pool.close().await;
            return Err(DbError::registration_conflict(
                identity.name,
                identity.group_type,
            ));
        }

        info!(
            group_name = %identity.name,
            group_type = %identity.group_type,
            "Database registered"
        );
        Ok(())
    }

    /// Register a batch concurrently. Failures are logged and returned; they never
    /// stop the other registrations.
    pub async fn add_databases(
        &self,
        configs: Vec<DatabaseConfig>,
    ) -> Vec<(GroupIdentity, DbError)> {
        let mut tasks = JoinSet::new();
        for config in configs {
            let store = self.clone();
            tasks.spawn(async move {
                let identity = config.group.clone();
                (identity, store.add_database(config).await)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((identity, Err(e))) => {
                    warn!(
                        group_name = %identity.name,
                        group_type = %identity.group_type,
                        error = %e,
                        "Failed to register database"
                    );
                    failures.push((identity, e));
                }
                Err(e) => error!(error = %e, "Registration task failed"),
            }
        }
        failures
    }

    /// Get the pool registered under `(group_name, group_type)`.
    pub async fn lookup(&self, group_name: &str, group_type: &str) -> DbResult<DatabaseHandle> {
        let identity = GroupIdentity::new(group_name, group_type);
        let databases = self.databases.read().await;
        databases
            .get(&identity)
            .map(|entry| DatabaseHandle {
                dialect: entry.config.connection.dialect,
                pool: entry.pool.clone(),
                identity: identity.clone(),
            })
            .ok_or_else(|| DbError::target_not_found(group_name, group_type))
    }

    /// List registered databases, sorted by group type then name.
    pub async fn database_items(&self) -> Vec<DatabaseItem> {
        let databases = self.databases.read().await;
        let mut items: Vec<DatabaseItem> = databases
            .values()
            .map(|entry| DatabaseItem {
                group: entry.config.group.clone(),
                dialect: entry.config.connection.dialect,
            })
            .collect();
        items.sort_by(|a, b| {
            (&a.group.group_type, &a.group.name).cmp(&(&b.group.group_type, &b.group.name))
        });
        items
    }

    /// Get the number of registered databases.
    pub async fn len(&self) -> usize {
        self.databases.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.databases.read().await.is_empty()
    }

    /// Run `sql` on one database.
    ///
    /// An unknown identity yields a failure payload naming it, like any other error.
    pub async fn query_database(
        &self,
        group_name: &str,
        group_type: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> GroupQueryResult {
        match self.lookup(group_name, group_type).await {
            Ok(handle) => executor::execute_query(&handle.pool, sql, cancel)
                .await
                .into_group_result(group_name),
            Err(e) => {
                debug!(group_name, group_type, "Query target not registered");
                Execution::failed(e, None).into_group_result(group_name)
            }
        }
    }

    /// Run `sql` concurrently on every database of `group_type`.
    ///
    /// Returns one result per target once every task has finished. The order of the
    /// results is unspecified.
    pub async fn query_group(
        &self,
        group_type: &str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Vec<GroupQueryResult> {
        let targets: Vec<(String, DbPool)> = {
            let databases = self.databases.read().await;
            databases
                .iter()
                .filter(|(identity, _)| identity.group_type == group_type)
                .map(|(identity, entry)| (identity.name.clone(), entry.pool.clone()))
                .collect()
        }; // Lock released here

        debug!(group_type, targets = targets.len(), "Fanning out query");

        let sql: Arc<str> = Arc::from(sql);
        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(targets.len());
        for (group_name, pool) in targets {
            let sql = Arc::clone(&sql);
            let cancel = cancel.clone();
            let handle = tasks.spawn(async move {
                executor::execute_query(&pool, &sql, &cancel).await
            });
            names.insert(handle.id(), group_name);
        }

        let mut results = Vec::with_capacity(names.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, execution) = match joined {
                Ok((id, execution)) => (id, execution),
                Err(e) => {
                    error!(error = %e, "Query task failed");
                    let failure =
                        Execution::failed(DbError::internal(format!("query task failed: {}", e)), None);
                    (e.id(), failure)
                }
            };
            let group_name = names.remove(&id).unwrap_or_default();
            results.push(execution.into_group_result(group_name));
        }
        results
    }

    /// Map every table of one database to its columns.
    pub async fn list_tables(
        &self,
        group_name: &str,
        group_type: &str,
        cancel: &CancellationToken,
    ) -> DbResult<TablesMetadata> {
        let handle = self.lookup(group_name, group_type).await?;
        let sql = handle.dialect.spec().tables_metadata_sql;
        let data = executor::execute_query(&handle.pool, sql, cancel)
            .await
            .into_result()?;

        let mut tables = TablesMetadata::new();
        for (table, column) in executor::text_pairs(&data) {
            tables.entry(table).or_default().push(column);
        }
        debug!(
            group_name = %handle.identity.name,
            group_type = %handle.identity.group_type,
            tables = tables.len(),
            "Listed tables"
        );
        Ok(tables)
    }

    /// Close every pool and empty the registry.
    pub async fn close_all(&self) {
        let entries: Vec<(GroupIdentity, DatabaseEntry)> = {
            let mut databases = self.databases.write().await;
            databases.drain().collect()
        };
        for (identity, entry) in entries {
            info!(
                group_name = %identity.name,
                group_type = %identity.group_type,
                "Closing database"
            );
            entry.pool.close().await;
        }
        info!("All databases closed");
    }
}
