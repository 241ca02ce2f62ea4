//! Integration tests for catalog bootstrap.
//!
//! A catalog is a SQLite file whose `databases` table lists other SQLite files.

use mdb_router::db::{DatabaseStore, resolve_data_sources};
use mdb_router::models::{CellValue, ConnectionConfig, DataSource};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

fn path_of(file: &NamedTempFile) -> String {
    file.path().to_str().unwrap().to_string()
}

async fn seed(file: &NamedTempFile, sql: &str) {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", path_of(file)))
        .await
        .unwrap();
    sqlx::raw_sql(sql).execute(&pool).await.unwrap();
    pool.close().await;
}

fn catalog_source(catalog: &NamedTempFile) -> DataSource {
    DataSource {
        connection: ConnectionConfig::sqlite(path_of(catalog)),
        query: r#"SELECT "groupName", "groupType", "type", "name", "maxOpenConns" FROM databases"#
            .to_string(),
    }
}

#[tokio::test]
async fn test_resolve_and_register_catalog_entries() {
    let (catalog, first, second) = (
        NamedTempFile::new().unwrap(),
        NamedTempFile::new().unwrap(),
        NamedTempFile::new().unwrap(),
    );
    seed(
        &catalog,
        &format!(
            r#"CREATE TABLE databases (
                   "groupName" TEXT, "groupType" TEXT, "type" TEXT, "name" TEXT,
                   "maxOpenConns" INTEGER
               );
               INSERT INTO databases VALUES ('t1', 'tenant', 'sqlite', '{}', 3);
               INSERT INTO databases VALUES ('t2', 'tenant', 'sqlite', '{}', NULL);
               INSERT INTO databases VALUES ('bad', 'tenant', 'oracle', 'x', NULL);"#,
            path_of(&first),
            path_of(&second)
        ),
    )
    .await;
    seed(&first, "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('first');").await;
    seed(&second, "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('second');").await;

    let (configs, errors) = resolve_data_sources(vec![catalog_source(&catalog)]).await;
    assert_eq!(configs.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), "config");

    let t1 = configs.iter().find(|c| c.group.name == "t1").unwrap();
    assert_eq!(t1.pool.max_open_conns, 3);
    let t2 = configs.iter().find(|c| c.group.name == "t2").unwrap();
    assert_eq!(t2.pool.max_open_conns, 10);

    let store = DatabaseStore::new();
    assert!(store.add_databases(configs).await.is_empty());

    let results = store
        .query_group("tenant", "SELECT v FROM t", &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 2);
    for result in results {
        let expected = if result.group_name == "t1" { "first" } else { "second" };
        assert_eq!(
            result.data.unwrap().rows[0]["v"],
            CellValue::Text(expected.into())
        );
    }
}

#[tokio::test]
async fn test_unreachable_catalog_does_not_block_others() {
    let (catalog, target) = (NamedTempFile::new().unwrap(), NamedTempFile::new().unwrap());
    seed(
        &catalog,
        &format!(
            r#"CREATE TABLE databases (
                   "groupName" TEXT, "groupType" TEXT, "type" TEXT, "name" TEXT,
                   "maxOpenConns" INTEGER
               );
               INSERT INTO databases VALUES ('only', 'tenant', 'sqlite', '{}', NULL);"#,
            path_of(&target)
        ),
    )
    .await;

    let missing_dir = tempfile::tempdir().unwrap();
    let missing = DataSource {
        connection: ConnectionConfig::sqlite(missing_dir.path().join("nope.db").to_string_lossy()),
        query: "SELECT 1".to_string(),
    };

    let (configs, errors) =
        resolve_data_sources(vec![missing, catalog_source(&catalog)]).await;
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].group.name, "only");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), "connection");
}

#[tokio::test]
async fn test_failing_catalog_query_is_reported() {
    let catalog = NamedTempFile::new().unwrap();
    let source = DataSource {
        connection: ConnectionConfig::sqlite(path_of(&catalog)),
        query: "SELECT * FROM missing_table".to_string(),
    };
    let (configs, errors) = resolve_data_sources(vec![source]).await;
    assert!(configs.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), "query");
}
