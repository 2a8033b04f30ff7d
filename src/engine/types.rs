// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the extraction engine
//!
//! Column/table metadata and foreign-key edges are produced once per run by a
//! [`SchemaCatalog`](crate::engine::traits::SchemaCatalog); values and query
//! results come from a [`RowSource`](crate::engine::traits::RowSource).

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one `prepare` run, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Raw value of one column on one fetched row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
    /// Time-of-day stored as an offset from midnight
    Time(TimeDelta),
    Guid(Uuid),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Plain (unquoted) rendering, used for record identity and variable names.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::Time(t) => write!(f, "{}", t),
            Value::Guid(g) => write!(f, "{}", g),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode_upper(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Logical value type of a column; drives literal rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    DateTime,
    TimeSpan,
    Binary,
    Other,
}

impl ValueKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Number)
    }
}

/// Column descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    pub name: String,
    pub kind: ValueKind,
    /// Dialect type, e.g. `nvarchar(50)` or `decimal(18,2)`
    pub sql_type: String,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_nullable: bool,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, kind: ValueKind, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            sql_type: sql_type.into(),
            is_primary_key: false,
            is_identity: false,
            is_nullable: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Dialect type without length/precision suffix, lowercased
    pub fn base_type(&self) -> String {
        self.sql_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// Ordered column metadata for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<Arc<FieldMetadata>>,
    /// Override for idempotency checks; empty means "use the primary key"
    pub unique_columns: Vec<String>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, columns: Vec<FieldMetadata>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Arc::new).collect(),
            unique_columns: Vec::new(),
        }
    }

    /// Returns a copy of this metadata carrying the given unique-column override
    pub fn with_unique_columns(&self, columns: &[String]) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            unique_columns: columns.to_vec(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Arc<FieldMetadata>> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Arc<FieldMetadata>> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    pub fn is_named(&self, table: &str) -> bool {
        self.name.eq_ignore_ascii_case(table)
    }
}

/// One directed dependency of the schema graph:
/// `parent_table.parent_column` references `referenced_table.referenced_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyEdge {
    pub parent_table: String,
    pub parent_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKeyEdge {
    pub fn new(
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }

    pub fn is_parent(&self, table: &str) -> bool {
        self.parent_table.eq_ignore_ascii_case(table)
    }

    pub fn is_referenced(&self, table: &str) -> bool {
        self.referenced_table.eq_ignore_ascii_case(table)
    }

    pub fn is_self_referencing(&self) -> bool {
        self.parent_table.eq_ignore_ascii_case(&self.referenced_table)
    }
}

impl fmt::Display for ForeignKeyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.parent_table, self.parent_column, self.referenced_table, self.referenced_column
        )
    }
}

/// Initial table + filter pair that seeds the traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootQuery {
    /// Literal table name or `/regex/` pattern
    pub table_name: String,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub processing_order: i32,
}

impl RootQuery {
    pub fn new(table_name: impl Into<String>, where_clause: impl Into<String>) -> Self {
        let where_clause = where_clause.into();
        Self {
            table_name: table_name.into(),
            where_clause: if where_clause.trim().is_empty() {
                None
            } else {
                Some(where_clause)
            },
            processing_order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.processing_order = order;
        self
    }
}

/// Column metadata of a result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: String::new(),
        }
    }
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

/// Rows returned by one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            execution_time_ms: 0.0,
        }
    }

    /// Position of a column in the result set (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a column value on one row by name
    pub fn value<'a>(&self, row: &'a Row, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|i| row.values.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_type_strips_length_suffix() {
        let meta = FieldMetadata::new("Name", ValueKind::String, "NVarChar(50)");
        assert_eq!(meta.base_type(), "nvarchar");
        let meta = FieldMetadata::new("Amount", ValueKind::Number, "decimal(18,2)");
        assert_eq!(meta.base_type(), "decimal");
    }

    #[test]
    fn root_query_deserializes_from_camel_case() {
        let json = r#"{"tableName":"Orders","where":"Id = 42","processingOrder":2}"#;
        let root: RootQuery = serde_json::from_str(json).expect("should parse");
        assert_eq!(root.table_name, "Orders");
        assert_eq!(root.where_clause.as_deref(), Some("Id = 42"));
        assert_eq!(root.processing_order, 2);
    }

    #[test]
    fn empty_where_is_dropped() {
        let root = RootQuery::new("Orders", "  ");
        assert!(root.where_clause.is_none());
    }

    #[test]
    fn edge_sides_compare_case_insensitively() {
        let edge = ForeignKeyEdge::new("Orders", "CustomerId", "Customers", "Id");
        assert!(edge.is_parent("orders"));
        assert!(edge.is_referenced("CUSTOMERS"));
        assert!(!edge.is_self_referencing());
        assert_eq!(edge.to_string(), "Orders.CustomerId -> Customers.Id");
    }

    #[test]
    fn value_display_is_unquoted() {
        assert_eq!(Value::Text("O'Brien".into()).to_string(), "O'Brien");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bytes(vec![0xab, 0x01]).to_string(), "0xAB01");
        assert_eq!(Value::Null.to_string(), "");
    }
}
