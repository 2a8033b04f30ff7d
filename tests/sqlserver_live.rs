// SPDX-License-Identifier: Apache-2.0

//! End-to-end run against a live SQL Server.
//!
//! Run with `cargo test -- --ignored` after pointing the
//! `QORE_EXTRACT_TEST_MSSQL_*` variables at a disposable database.

use std::sync::Arc;

use qore_extract::config::{ExtractConfig, ScriptConfig, ScriptStrategies, TableRule};
use qore_extract::engine::drivers::sqlserver::{ConnectionConfig, SqlServerCatalog, SqlServerSource};
use qore_extract::engine::{
    DependencyBuilder, ExtractResult, RootQuery, RowSource, SchemaCatalog, Value,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_DB: &str = "master";

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn mssql_config() -> ConnectionConfig {
    ConnectionConfig {
        host: env_or_default("QORE_EXTRACT_TEST_MSSQL_HOST", "127.0.0.1"),
        port: env_u16_or_default("QORE_EXTRACT_TEST_MSSQL_PORT", 1433),
        username: env_or_default("QORE_EXTRACT_TEST_MSSQL_USER", "sa"),
        password: env_or_default("QORE_EXTRACT_TEST_MSSQL_PASSWORD", "QoreExtract_test1"),
        database: Some(env_or_default("QORE_EXTRACT_TEST_MSSQL_DB", DEFAULT_DB)),
        ssl: false,
        pool_max_connections: Some(2),
        pool_min_connections: None,
        pool_acquire_timeout_secs: Some(10),
    }
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

async fn run(source: &dyn RowSource, sql: &str) -> ExtractResult<()> {
    source.query(sql, &CancellationToken::new()).await.map(|_| ())
}

#[tokio::test]
#[ignore = "requires a SQL Server instance"]
async fn sqlserver_resolves_foreign_keys() -> ExtractResult<()> {
    let source: Arc<dyn RowSource> = Arc::new(SqlServerSource::connect(&mssql_config()).await?);
    let customers = unique_name("qx_customers");
    let orders = unique_name("qx_orders");

    run(
        source.as_ref(),
        &format!(
            "CREATE TABLE {customers} (Id INT IDENTITY(1,1) PRIMARY KEY, Name NVARCHAR(50) NOT NULL)"
        ),
    )
    .await?;
    run(
        source.as_ref(),
        &format!(
            "CREATE TABLE {orders} (Id INT PRIMARY KEY, CustomerId INT NOT NULL \
             REFERENCES {customers}(Id), Code VARCHAR(20) NULL)"
        ),
    )
    .await?;
    run(
        source.as_ref(),
        &format!(
            "INSERT INTO {customers} (Name) VALUES (N'Ann'); \
             INSERT INTO {orders} (Id, CustomerId, Code) VALUES (42, 1, 'A'), (43, 1, NULL)"
        ),
    )
    .await?;

    let outcome = async {
        let mut catalog = SqlServerCatalog::new(Arc::clone(&source), ExtractConfig::default());
        catalog.init(&CancellationToken::new()).await?;

        let meta = catalog.table_metadata(&orders)?;
        assert_eq!(meta.primary_key_columns().count(), 1);
        assert!(meta.column("Code").map(|c| c.is_nullable).unwrap_or(false));

        let script = ScriptConfig {
            script_name: "live".to_string(),
            root_records: Vec::new(),
            tables_to_process: vec![
                TableRule::new(orders.as_str()).with_strategy("fk"),
                TableRule::new(customers.as_str()).with_strategy("fk"),
            ],
        };
        let strategies = ScriptStrategies::new(&script, &ExtractConfig::default())?;

        let mut builder = DependencyBuilder::new(Arc::new(catalog), Arc::clone(&source));
        builder
            .prepare(
                &[RootQuery::new(orders.as_str(), "Id = 42")],
                &strategies,
                &CancellationToken::new(),
            )
            .await
    }
    .await;

    run(source.as_ref(), &format!("DROP TABLE {orders}; DROP TABLE {customers}")).await?;

    let prepared = outcome?;
    assert_eq!(prepared.graph.len(), 3);

    let customer = prepared
        .graph
        .find(&customers, ["1"])
        .expect("customer fetched");
    assert_eq!(customer.children().len(), 2);
    assert!(matches!(customer.field("Name").map(|f| f.value()), Some(Value::Text(name)) if name == "Ann"));

    let order = prepared.graph.find(&orders, ["43"]).expect("sibling order fetched");
    assert!(order.field("Code").is_none());
    Ok(())
}
