// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for builder integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use qore_extract::config::{ExtractConfig, ScriptConfig, ScriptStrategies, TableRule};
use qore_extract::engine::{
    ColumnInfo, ExtractError, ExtractResult, FieldMetadata, ForeignKeyEdge, MemoryCatalog,
    QueryResult, Row, RowSource, SchemaCatalog, TableMetadata, Value, ValueKind,
};
use tokio_util::sync::CancellationToken;

/// Answers exact SQL text with canned rows; anything unscripted returns no rows.
#[derive(Default)]
pub struct ScriptedSource {
    responses: HashMap<String, QueryResult>,
    failures: HashMap<String, String>,
    blocked: HashSet<String>,
    issued: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, sql: &str, result: QueryResult) -> Self {
        self.responses.insert(sql.to_string(), result);
        self
    }

    pub fn fail(mut self, sql: &str, message: &str) -> Self {
        self.failures.insert(sql.to_string(), message.to_string());
        self
    }

    /// Leaves `sql` pending until the caller's token is cancelled.
    pub fn block(mut self, sql: &str) -> Self {
        self.blocked.insert(sql.to_string());
        self
    }

    /// Fires `token` once `count` queries have been answered.
    pub fn cancel_after(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((count, token));
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowSource for ScriptedSource {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> ExtractResult<QueryResult> {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let answered = {
            let mut issued = self.issued.lock().unwrap();
            issued.push(sql.to_string());
            issued.len()
        };
        if self.blocked.contains(sql) {
            cancel.cancelled().await;
            return Err(ExtractError::Cancelled);
        }
        if let Some((count, token)) = &self.cancel_after {
            if answered >= *count {
                token.cancel();
            }
        }
        if let Some(message) = self.failures.get(sql) {
            return Err(ExtractError::execution_error(message.clone()));
        }
        Ok(self
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(QueryResult::empty))
    }
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| ColumnInfo::new(*c)).collect(),
        rows: rows.into_iter().map(|values| Row { values }).collect(),
        execution_time_ms: 0.0,
    }
}

fn id() -> FieldMetadata {
    FieldMetadata::new("Id", ValueKind::Number, "int").primary_key()
}

pub fn customers() -> TableMetadata {
    TableMetadata::new(
        "Customers",
        vec![
            id().identity(),
            FieldMetadata::new("Name", ValueKind::String, "nvarchar(50)"),
        ],
    )
}

pub fn orders() -> TableMetadata {
    TableMetadata::new(
        "Orders",
        vec![
            id().identity(),
            FieldMetadata::new("CustomerId", ValueKind::Number, "int"),
            FieldMetadata::new("Code", ValueKind::String, "varchar(20)").nullable(),
        ],
    )
}

pub fn order_lines() -> TableMetadata {
    TableMetadata::new(
        "OrderLines",
        vec![
            FieldMetadata::new("OrderId", ValueKind::Number, "int").primary_key(),
            FieldMetadata::new("LineNo", ValueKind::Number, "int").primary_key(),
            FieldMetadata::new("Sku", ValueKind::String, "varchar(20)"),
        ],
    )
}

pub fn employees() -> TableMetadata {
    TableMetadata::new(
        "Employees",
        vec![
            id().identity(),
            FieldMetadata::new("ManagerId", ValueKind::Number, "int").nullable(),
            FieldMetadata::new("Name", ValueKind::String, "nvarchar(100)"),
        ],
    )
}

pub fn order_customer_edge() -> ForeignKeyEdge {
    ForeignKeyEdge::new("Orders", "CustomerId", "Customers", "Id")
}

pub fn order_line_edge() -> ForeignKeyEdge {
    ForeignKeyEdge::new("OrderLines", "OrderId", "Orders", "Id")
}

pub fn manager_edge() -> ForeignKeyEdge {
    ForeignKeyEdge::new("Employees", "ManagerId", "Employees", "Id")
}

/// Customers, Orders and OrderLines
pub async fn sales_catalog() -> Arc<dyn SchemaCatalog> {
    let mut catalog = MemoryCatalog::new()
        .with_table(customers())
        .with_table(orders())
        .with_table(order_lines())
        .with_foreign_key(order_customer_edge())
        .with_foreign_key(order_line_edge());
    catalog
        .init(&CancellationToken::new())
        .await
        .expect("catalog init");
    Arc::new(catalog)
}

pub async fn catalog_of(tables: Vec<TableMetadata>, edges: Vec<ForeignKeyEdge>) -> Arc<dyn SchemaCatalog> {
    let mut catalog = MemoryCatalog::new();
    for table in tables {
        catalog = catalog.with_table(table);
    }
    for edge in edges {
        catalog = catalog.with_foreign_key(edge);
    }
    catalog
        .init(&CancellationToken::new())
        .await
        .expect("catalog init");
    Arc::new(catalog)
}

pub fn strategies(rules: Vec<TableRule>) -> ScriptStrategies {
    let script = ScriptConfig {
        script_name: "test".to_string(),
        root_records: Vec::new(),
        tables_to_process: rules,
    };
    ScriptStrategies::new(&script, &ExtractConfig::default()).expect("valid rules")
}

pub fn fk(table: &str) -> TableRule {
    TableRule::new(table).with_strategy("fk")
}

pub const ORDER_COLUMNS: &[&str] = &["Id", "CustomerId", "Code"];
pub const CUSTOMER_COLUMNS: &[&str] = &["Id", "Name"];
pub const EMPLOYEE_COLUMNS: &[&str] = &["Id", "ManagerId", "Name"];

pub fn order(id: i64, customer: i64, code: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::Int(customer), code.into()]
}

pub fn customer(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int(id), name.into()]
}

pub fn employee(id: i64, manager: Option<i64>, name: &str) -> Vec<Value> {
    vec![Value::Int(id), manager.into(), name.into()]
}
