// SPDX-License-Identifier: Apache-2.0

//! Typed row model
//!
//! A [`Record`] is one fetched row with its primary/unique-key identity, the
//! strategies of its table and the parent/child links discovered during
//! traversal. Links point into the owning [`RecordGraph`](super::graph::RecordGraph)
//! by [`RecordId`], so cyclic schemas never produce owning cycles.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::sql_text;
use crate::engine::strategy::{ExtractStrategy, SqlBuildStrategy};
use crate::engine::types::{FieldMetadata, ForeignKeyEdge, QueryResult, Row, TableMetadata, Value};

/// Longest variable name emitted verbatim; longer names are hashed.
pub const MAX_VARIABLE_NAME_LEN: usize = 120;

/// One column value on one fetched row
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    metadata: Arc<FieldMetadata>,
    value: Value,
    /// Rendered verbatim instead of the value when set
    expression: Option<String>,
}

impl Field {
    pub fn new(metadata: Arc<FieldMetadata>, value: Value) -> Self {
        Self {
            metadata,
            value,
            expression: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn set_expression(&mut self, expression: impl Into<String>) {
        self.expression = Some(expression.into());
    }

    pub fn clear_expression(&mut self) {
        self.expression = None;
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.metadata.name.eq_ignore_ascii_case(name)
    }
}

/// Index of a record inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

/// Deduplication identity: table name plus rendered primary-key values
///
/// Key values are kept as a list rather than concatenated into one string, so
/// composite keys such as `(1, 23)` and `(12, 3)` stay distinct. `Display`
/// still prints the concatenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    table: String,
    values: Vec<String>,
}

impl RecordKey {
    pub fn new<S: Into<String>>(table: &str, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            table: table.to_ascii_lowercase(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.table, self.values.concat())
    }
}

/// Link to a related record through one foreign-key edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub record: RecordId,
    pub edge: Arc<ForeignKeyEdge>,
}

/// One fetched row
#[derive(Debug, Clone)]
pub struct Record {
    metadata: Arc<TableMetadata>,
    fields: Vec<Field>,
    primary_key: Vec<usize>,
    unique_key: Vec<usize>,
    source: String,
    extract_strategy: Arc<ExtractStrategy>,
    sql_build_strategy: Arc<SqlBuildStrategy>,
    is_starting_point: bool,
    parents: Vec<Relation>,
    children: Vec<Relation>,
}

impl Record {
    /// Builds a record from one result-set row. NULL and unfetched columns are omitted.
    pub fn from_row(
        metadata: Arc<TableMetadata>,
        result: &QueryResult,
        row: &Row,
    ) -> ExtractResult<Self> {
        let fields = metadata
            .columns
            .iter()
            .filter_map(|column| {
                result
                    .value(row, &column.name)
                    .filter(|v| !v.is_null())
                    .map(|v| Field::new(Arc::clone(column), v.clone()))
            })
            .collect();
        Self::from_fields(metadata, fields)
    }

    /// Builds a record from `(column, value)` pairs; columns unknown to the metadata are ignored.
    pub fn from_values<N, V>(
        metadata: Arc<TableMetadata>,
        values: impl IntoIterator<Item = (N, V)>,
    ) -> ExtractResult<Self>
    where
        N: AsRef<str>,
        V: Into<Value>,
    {
        let values: Vec<(N, Value)> = values.into_iter().map(|(n, v)| (n, v.into())).collect();
        let fields = metadata
            .columns
            .iter()
            .filter_map(|column| {
                values
                    .iter()
                    .find(|(name, _)| name.as_ref().eq_ignore_ascii_case(&column.name))
                    .filter(|(_, v)| !v.is_null())
                    .map(|(_, v)| Field::new(Arc::clone(column), v.clone()))
            })
            .collect();
        Self::from_fields(metadata, fields)
    }

    fn from_fields(metadata: Arc<TableMetadata>, fields: Vec<Field>) -> ExtractResult<Self> {
        let primary_key: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.metadata.is_primary_key)
            .map(|(i, _)| i)
            .collect();

        if primary_key.is_empty() {
            return Err(ExtractError::missing_primary_key(&metadata.name));
        }

        let unique_key = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| metadata.unique_columns.iter().any(|u| f.is_named(u)))
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            metadata,
            fields,
            primary_key,
            unique_key,
            source: String::new(),
            extract_strategy: Arc::new(ExtractStrategy::default()),
            sql_build_strategy: Arc::new(SqlBuildStrategy::default()),
            is_starting_point: false,
            parents: Vec::new(),
            children: Vec::new(),
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_strategies(
        mut self,
        extract: Arc<ExtractStrategy>,
        sql_build: Arc<SqlBuildStrategy>,
    ) -> Self {
        self.extract_strategy = extract;
        self.sql_build_strategy = sql_build;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.is_named(name))
    }

    pub fn primary_key_fields(&self) -> Vec<&Field> {
        self.primary_key.iter().map(|&i| &self.fields[i]).collect()
    }

    /// Configured unique fields, or the primary key when no override applies
    pub fn unique_fields(&self) -> Vec<&Field> {
        let indices = if self.unique_key.is_empty() {
            &self.primary_key
        } else {
            &self.unique_key
        };
        indices.iter().map(|&i| &self.fields[i]).collect()
    }

    /// WHERE predicate identifying this row by its unique fields
    pub fn unique_where(&self) -> String {
        sql_text::where_clause(&self.unique_fields())
    }

    /// Fields that go into generated INSERT/UPDATE statements
    pub fn not_identity_fields(&self) -> Vec<&Field> {
        let strategy = &self.sql_build_strategy;
        self.fields
            .iter()
            .filter(|f| !f.metadata.is_identity && !strategy.excludes_field(f.name()))
            .collect()
    }

    pub fn not_identity_fields_mut(&mut self) -> Vec<&mut Field> {
        let strategy = &self.sql_build_strategy;
        self.fields
            .iter_mut()
            .filter(|f| !f.metadata.is_identity && !strategy.excludes_field(f.name()))
            .collect()
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(
            &self.metadata.name,
            self.primary_key_fields().iter().map(|f| f.value.to_string()),
        )
    }

    /// SQL variable name standing in for this row's key in generated scripts.
    ///
    /// Built from the table name and every primary-key name/value pair; `-`, `.`
    /// and `_` are spelled out and anything else outside `[A-Za-z0-9@]` is
    /// dropped. Names longer than [`MAX_VARIABLE_NAME_LEN`] become `@` followed
    /// by the SHA-256 of the name in hex.
    pub fn variable_name(&self) -> String {
        let mut raw = format!("@{}_", self.metadata.name);
        for field in self.primary_key_fields() {
            raw.push_str(field.name());
            raw.push('_');
            raw.push_str(&field.value.to_string());
        }

        let name: String = raw
            .replace('-', "Ngt")
            .replace('.', "Point")
            .replace('_', "Un")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '@')
            .collect();

        if name.len() > MAX_VARIABLE_NAME_LEN {
            format!("@{}", hex::encode_upper(Sha256::digest(name.as_bytes())))
        } else {
            name
        }
    }

    pub fn is_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    pub fn is_numeric_primary_key(&self) -> bool {
        match self.primary_key.as_slice() {
            [only] => self.fields[*only].metadata.kind.is_numeric(),
            _ => false,
        }
    }

    pub fn is_identity_primary_key(&self) -> bool {
        self.primary_key
            .first()
            .map(|&i| self.fields[i].metadata.is_identity)
            .unwrap_or(false)
    }

    /// Fields named as the referenced column of a recorded parent link
    pub fn foreign_key_fields(&self) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| {
                self.parents
                    .iter()
                    .any(|p| f.is_named(&p.edge.referenced_column))
            })
            .collect()
    }

    pub fn all_foreign_keys_resolved(&self) -> bool {
        self.foreign_key_fields()
            .iter()
            .all(|f| f.expression.is_none())
    }

    /// Query that produced this row
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn extract_strategy(&self) -> &ExtractStrategy {
        &self.extract_strategy
    }

    pub fn sql_build_strategy(&self) -> &SqlBuildStrategy {
        &self.sql_build_strategy
    }

    pub fn is_starting_point(&self) -> bool {
        self.is_starting_point
    }

    pub(crate) fn mark_starting_point(&mut self) {
        self.is_starting_point = true;
    }

    pub fn parents(&self) -> &[Relation] {
        &self.parents
    }

    pub fn children(&self) -> &[Relation] {
        &self.children
    }

    pub(crate) fn push_parent(&mut self, record: RecordId, edge: Arc<ForeignKeyEdge>) {
        self.parents.push(Relation { record, edge });
    }

    pub(crate) fn push_child(&mut self, record: RecordId, edge: Arc<ForeignKeyEdge>) {
        self.children.push(Relation { record, edge });
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key: String = self
            .primary_key_fields()
            .iter()
            .map(|f| f.value.to_string())
            .collect();
        write!(f, "{} {}", self.metadata.name, key)
    }
}
