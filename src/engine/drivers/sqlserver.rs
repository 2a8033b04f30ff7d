// SPDX-License-Identifier: Apache-2.0

//! SQL Server Driver
//!
//! [`SqlServerSource`] implements [`RowSource`] with Tiberius behind a bb8
//! pool; [`SqlServerCatalog`] implements [`SchemaCatalog`] by reading the
//! `sys.*` catalog views through any row source.
//!
//! ## Connection Model
//!
//! Every fetch acquires a pooled connection, runs one statement and returns
//! the connection to the pool when the guard drops, including on error and
//! cancellation. The fetch races the caller's cancellation token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExtractConfig;
use crate::engine::catalog::{loaded, CatalogSnapshot};
use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::traits::{RowSource, SchemaCatalog};
use crate::engine::types::{
    ColumnInfo, FieldMetadata, ForeignKeyEdge, QueryResult, Row as QRow, TableMetadata, Value,
    ValueKind,
};

// ==================== Types ====================

type MssqlPool = Pool<ConnectionManager>;
type MssqlClient = Client<Compat<TcpStream>>;

fn default_port() -> u16 {
    1433
}

/// Connection settings for a SQL Server source database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub pool_max_connections: Option<u32>,
    #[serde(default)]
    pub pool_min_connections: Option<u32>,
    #[serde(default)]
    pub pool_acquire_timeout_secs: Option<u32>,
}

// ==================== Row Source ====================

pub struct SqlServerSource {
    pool: MssqlPool,
    /// Current database name (from connection config).
    database: String,
}

impl SqlServerSource {
    /// Builds the pool. Connections are opened lazily by bb8.
    pub async fn connect(config: &ConnectionConfig) -> ExtractResult<Self> {
        let pool = Self::create_pool(config).await?;
        info!(
            host = %config.host,
            port = config.port,
            database = ?config.database,
            "SQL Server pool created"
        );
        Ok(Self {
            pool,
            database: config.database.clone().unwrap_or_default(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Build a tiberius Config from a ConnectionConfig.
    fn build_config(config: &ConnectionConfig) -> ExtractResult<Config> {
        if config.host.trim().is_empty() {
            return Err(ExtractError::configuration("SQL Server host is empty"));
        }
        let mut tib_config = Config::new();
        tib_config.host(&config.host);
        tib_config.port(config.port);
        tib_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        if let Some(ref db) = config.database {
            if !db.is_empty() {
                tib_config.database(db);
            }
        }
        tib_config.encryption(if config.ssl {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        tib_config.trust_cert();
        Ok(tib_config)
    }

    async fn create_pool(config: &ConnectionConfig) -> ExtractResult<MssqlPool> {
        let tib_config = Self::build_config(config)?;
        let mgr = ConnectionManager::new(tib_config);

        let max_size = config.pool_max_connections.unwrap_or(5);
        let timeout_secs = config.pool_acquire_timeout_secs.unwrap_or(30) as u64;

        Pool::builder()
            .max_size(max_size)
            .min_idle(config.pool_min_connections)
            .connection_timeout(Duration::from_secs(timeout_secs))
            .build(mgr)
            .await
            .map_err(|e| {
                ExtractError::connection_failed(format!("Failed to create connection pool: {e}"))
            })
    }

    async fn fetch(&self, sql: &str) -> ExtractResult<QueryResult> {
        let start = Instant::now();
        let mut conn = self.pool.get().await.map_err(|e| {
            ExtractError::connection_failed(format!("Failed to acquire connection: {e}"))
        })?;
        execute_select(&mut conn, sql, start).await
    }
}

#[async_trait]
impl RowSource for SqlServerSource {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> ExtractResult<QueryResult> {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Fetch cancelled, connection returned to pool");
                Err(ExtractError::Cancelled)
            }
            result = self.fetch(sql) => result,
        }
    }
}

// ==================== Type Conversion ====================

/// Convert a tiberius ColumnData to a Value.
fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(widen_real(*v)),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Guid(*g),
        ColumnData::Binary(Some(b)) => Value::Bytes(b.to_vec()),
        ColumnData::Xml(Some(xml)) => Value::Text(xml.to_string()),
        _ => Value::Null,
    }
}

/// Widens a `real` through its shortest decimal form, so 1.1 stays 1.1.
fn widen_real(v: f32) -> f64 {
    v.to_string().parse().unwrap_or(v as f64)
}

/// Convert a tiberius Row, using typed getters for decimals and date/time types.
fn convert_row(row: &tiberius::Row) -> QRow {
    let values: Vec<Value> = row
        .cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            ColumnData::Numeric(Some(_)) => row
                .try_get::<rust_decimal::Decimal, _>(i)
                .ok()
                .flatten()
                .map(Value::Decimal)
                .unwrap_or(Value::Null),
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::DateTime(d.and_time(NaiveTime::MIN)))
                .unwrap_or(Value::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(|t| Value::Time(t.signed_duration_since(NaiveTime::MIN)))
                .unwrap_or(Value::Null),
            _ => convert_column_data(data),
        })
        .collect();
    QRow { values }
}

fn get_column_info(columns: &[tiberius::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            data_type: format!("{:?}", col.column_type()),
        })
        .collect()
}

async fn execute_select(conn: &mut MssqlClient, sql: &str, start: Instant) -> ExtractResult<QueryResult> {
    let stream = conn
        .simple_query(sql)
        .await
        .map_err(|e| ExtractError::execution_error(e.to_string()))?;

    let result_set = stream
        .into_first_result()
        .await
        .map_err(|e| ExtractError::execution_error(e.to_string()))?;

    let columns = result_set
        .first()
        .map(|first| get_column_info(first.columns()))
        .unwrap_or_default();
    let rows: Vec<QRow> = result_set.iter().map(convert_row).collect();
    let execution_time_ms = start.elapsed().as_micros() as f64 / 1000.0;

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}

/// Logical kind of a SQL Server base type
pub fn value_kind_for(base_type: &str) -> ValueKind {
    match base_type.trim().to_ascii_lowercase().as_str() {
        "tinyint" | "smallint" | "int" | "bigint" | "decimal" | "numeric" | "money"
        | "smallmoney" | "float" | "real" => ValueKind::Number,
        "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "xml"
        | "uniqueidentifier" | "sysname" => ValueKind::String,
        "bit" => ValueKind::Boolean,
        "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => {
            ValueKind::DateTime
        }
        "time" => ValueKind::TimeSpan,
        "binary" | "varbinary" | "image" => ValueKind::Binary,
        _ => ValueKind::Other,
    }
}

// ==================== Schema Catalog ====================

const TABLES_SQL: &str = "SELECT t.name AS TableName \
     FROM sys.tables t \
     WHERE t.is_ms_shipped = 0 \
     ORDER BY t.name";

/// Timestamp (189), CLR (240) and computed columns cannot be inserted and are left out.
const COLUMNS_SQL: &str = "SELECT \
         OBJECT_NAME(c.object_id) AS TableName, \
         c.name AS ColumnName, \
         c.is_identity AS IsIdentity, \
         c.is_nullable AS IsNullable, \
         tb.name AS BaseTypeName, \
         tb.name + CASE \
             WHEN tb.user_type_id IN (165, 167, 173, 175, 231, 239) THEN \
                 CASE \
                     WHEN c.max_length = -1 THEN '(max)' \
                     WHEN tb.user_type_id IN (231, 239) THEN '(' + CAST(c.max_length / 2 AS nvarchar(10)) + ')' \
                     ELSE '(' + CAST(c.max_length AS nvarchar(10)) + ')' \
                 END \
             WHEN tb.user_type_id IN (106, 108) THEN \
                 '(' + CAST(c.precision AS nvarchar(10)) + ',' + CAST(c.scale AS nvarchar(10)) + ')' \
             ELSE '' \
         END AS SqlType, \
         CAST(CASE WHEN EXISTS ( \
             SELECT 1 FROM sys.indexes i \
             JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             WHERE ic.object_id = c.object_id AND ic.column_id = c.column_id AND i.is_primary_key = 1 \
         ) THEN 1 ELSE 0 END AS bit) AS IsPrimaryKey \
     FROM sys.columns c \
     JOIN sys.tables st ON st.object_id = c.object_id \
     JOIN sys.types t ON t.system_type_id = c.system_type_id AND t.user_type_id = c.user_type_id \
     JOIN sys.types tb ON tb.system_type_id = t.system_type_id AND tb.system_type_id = tb.user_type_id \
     WHERE t.system_type_id NOT IN (189, 240) AND c.is_computed = 0 \
     ORDER BY OBJECT_NAME(c.object_id), c.column_id";

const FOREIGN_KEYS_SQL: &str = "SELECT \
         OBJECT_NAME(fkc.parent_object_id) AS ParentTable, \
         pc.name AS ParentColumn, \
         OBJECT_NAME(fkc.referenced_object_id) AS ReferencedTable, \
         rc.name AS ReferencedColumn \
     FROM sys.foreign_key_columns fkc \
     JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id \
     JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id \
     ORDER BY ParentTable, fkc.constraint_object_id, fkc.constraint_column_id";

fn text_at(result: &QueryResult, row: &QRow, column: &str) -> ExtractResult<String> {
    match result.value(row, column) {
        Some(Value::Null) | None => Err(ExtractError::execution_error(format!(
            "Catalog query returned no {column}"
        ))),
        Some(value) => Ok(value.to_string()),
    }
}

fn flag_at(result: &QueryResult, row: &QRow, column: &str) -> bool {
    match result.value(row, column) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Int(i)) => *i != 0,
        _ => false,
    }
}

/// Groups catalog column rows under their tables, keeping table and column order.
fn tables_from_rows(tables: &QueryResult, columns: &QueryResult) -> ExtractResult<Vec<TableMetadata>> {
    let mut result = Vec::with_capacity(tables.rows.len());
    for row in &tables.rows {
        let name = text_at(tables, row, "TableName")?;
        let mut fields = Vec::new();
        for col in &columns.rows {
            if !text_at(columns, col, "TableName")?.eq_ignore_ascii_case(&name) {
                continue;
            }
            let base_type = text_at(columns, col, "BaseTypeName")?;
            let mut field = FieldMetadata::new(
                text_at(columns, col, "ColumnName")?,
                value_kind_for(&base_type),
                text_at(columns, col, "SqlType")?,
            );
            field.is_primary_key = flag_at(columns, col, "IsPrimaryKey");
            field.is_identity = flag_at(columns, col, "IsIdentity");
            field.is_nullable = flag_at(columns, col, "IsNullable");
            fields.push(field);
        }
        result.push(TableMetadata::new(name, fields));
    }
    Ok(result)
}

fn edges_from_rows(result: &QueryResult) -> ExtractResult<Vec<ForeignKeyEdge>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(ForeignKeyEdge::new(
                text_at(result, row, "ParentTable")?,
                text_at(result, row, "ParentColumn")?,
                text_at(result, row, "ReferencedTable")?,
                text_at(result, row, "ReferencedColumn")?,
            ))
        })
        .collect()
}

/// [`SchemaCatalog`] backed by the SQL Server system views
pub struct SqlServerCatalog {
    source: Arc<dyn RowSource>,
    config: ExtractConfig,
    snapshot: Option<CatalogSnapshot>,
}

impl SqlServerCatalog {
    pub fn new(source: Arc<dyn RowSource>, config: ExtractConfig) -> Self {
        Self {
            source,
            config,
            snapshot: None,
        }
    }
}

#[async_trait]
impl SchemaCatalog for SqlServerCatalog {
    async fn init(&mut self, cancel: &CancellationToken) -> ExtractResult<()> {
        info!("Loading SQL Server schema metadata");
        let tables = self.source.query(TABLES_SQL, cancel).await?;
        let columns = self.source.query(COLUMNS_SQL, cancel).await?;
        let foreign_keys = self.source.query(FOREIGN_KEYS_SQL, cancel).await?;

        let tables = tables_from_rows(&tables, &columns)?;
        let edges = edges_from_rows(&foreign_keys)?;
        debug!(tables = tables.len(), foreign_keys = edges.len(), "Schema metadata read");

        self.snapshot = Some(CatalogSnapshot::build(tables, edges, &self.config)?);
        Ok(())
    }

    fn list_tables(&self) -> ExtractResult<&[Arc<TableMetadata>]> {
        Ok(loaded(&self.snapshot)?.tables())
    }

    fn list_foreign_keys(&self) -> ExtractResult<&[Arc<ForeignKeyEdge>]> {
        Ok(loaded(&self.snapshot)?.foreign_keys())
    }

    fn table_metadata(&self, name: &str) -> ExtractResult<Arc<TableMetadata>> {
        loaded(&self.snapshot)?.table(name)
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| ColumnInfo::new(*c)).collect(),
            rows: rows.into_iter().map(|values| QRow { values }).collect(),
            execution_time_ms: 0.0,
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 1433,
            username: "sa".to_string(),
            password: "MyPassword123!".to_string(),
            database: Some("testdb".to_string()),
            ssl: false,
            pool_max_connections: None,
            pool_min_connections: None,
            pool_acquire_timeout_secs: None,
        }
    }

    #[test]
    fn test_build_config() {
        assert!(SqlServerSource::build_config(&config()).is_ok());

        let mut blank = config();
        blank.host = " ".to_string();
        assert!(matches!(
            SqlServerSource::build_config(&blank),
            Err(ExtractError::Configuration { .. })
        ));
    }

    #[test]
    fn test_connection_config_defaults() {
        let cfg: ConnectionConfig =
            serde_json::from_str(r#"{"host":"db","username":"sa","password":"x"}"#).unwrap();
        assert_eq!(cfg.port, 1433);
        assert!(!cfg.ssl);
        assert!(cfg.database.is_none());
        assert!(!serde_json::to_string(&cfg).unwrap().contains("password"));
    }

    #[test]
    fn test_value_kind_for() {
        assert_eq!(value_kind_for("int"), ValueKind::Number);
        assert_eq!(value_kind_for("MONEY"), ValueKind::Number);
        assert_eq!(value_kind_for("nvarchar"), ValueKind::String);
        assert_eq!(value_kind_for("uniqueidentifier"), ValueKind::String);
        assert_eq!(value_kind_for("bit"), ValueKind::Boolean);
        assert_eq!(value_kind_for("datetime2"), ValueKind::DateTime);
        assert_eq!(value_kind_for("time"), ValueKind::TimeSpan);
        assert_eq!(value_kind_for("varbinary"), ValueKind::Binary);
        assert_eq!(value_kind_for("sql_variant"), ValueKind::Other);
    }

    #[test]
    fn test_real_keeps_its_decimal_form() {
        assert_eq!(convert_column_data(&ColumnData::F32(Some(1.1))), Value::Float(1.1));
        assert_eq!(convert_column_data(&ColumnData::F64(Some(1.1))), Value::Float(1.1));

        let price = FieldMetadata::new("Price", ValueKind::Number, "real");
        let field = crate::engine::record::Field::new(
            Arc::new(price),
            convert_column_data(&ColumnData::F32(Some(0.3))),
        );
        assert_eq!(crate::engine::sql_text::value_to_sql_text(&field), "0.3");
    }

    #[test]
    fn test_tables_from_rows() {
        let tables = result(
            &["TableName"],
            vec![vec!["Customers".into()], vec!["Orders".into()]],
        );
        let columns = result(
            &["TableName", "ColumnName", "IsIdentity", "IsNullable", "BaseTypeName", "SqlType", "IsPrimaryKey"],
            vec![
                vec!["Orders".into(), "Id".into(), true.into(), false.into(), "int".into(), "int".into(), true.into()],
                vec!["Orders".into(), "Note".into(), false.into(), true.into(), "nvarchar".into(), "nvarchar(max)".into(), false.into()],
                vec!["Customers".into(), "Id".into(), false.into(), false.into(), "int".into(), "int".into(), Value::Int(1)],
            ],
        );

        let parsed = tables_from_rows(&tables, &columns).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "Customers");
        assert!(parsed[0].columns[0].is_primary_key);

        let orders = &parsed[1];
        assert_eq!(orders.columns.len(), 2);
        assert!(orders.columns[0].is_identity);
        let note = orders.column("note").unwrap();
        assert!(note.is_nullable);
        assert_eq!(note.kind, ValueKind::String);
        assert_eq!(note.base_type(), "nvarchar");
    }

    #[test]
    fn test_edges_from_rows() {
        let fks = result(
            &["ParentTable", "ParentColumn", "ReferencedTable", "ReferencedColumn"],
            vec![vec!["Orders".into(), "CustomerId".into(), "Customers".into(), "Id".into()]],
        );
        let edges = edges_from_rows(&fks).unwrap();
        assert_eq!(edges, vec![ForeignKeyEdge::new("Orders", "CustomerId", "Customers", "Id")]);

        let broken = result(
            &["ParentTable", "ParentColumn", "ReferencedTable", "ReferencedColumn"],
            vec![vec!["Orders".into(), Value::Null, "Customers".into(), "Id".into()]],
        );
        assert!(edges_from_rows(&broken).is_err());
    }

    #[tokio::test]
    async fn test_catalog_requires_init() {
        struct Unreachable;

        #[async_trait]
        impl RowSource for Unreachable {
            async fn query(&self, _sql: &str, _cancel: &CancellationToken) -> ExtractResult<QueryResult> {
                Err(ExtractError::connection_failed("unreachable"))
            }
        }

        let mut catalog = SqlServerCatalog::new(Arc::new(Unreachable), ExtractConfig::default());
        assert!(matches!(catalog.list_tables(), Err(ExtractError::UninitializedCatalog)));

        let err = catalog.init(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractError::ConnectionFailed { .. }));
        assert!(matches!(
            catalog.table_metadata("Orders"),
            Err(ExtractError::UninitializedCatalog)
        ));
    }
}
