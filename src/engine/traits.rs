// SPDX-License-Identifier: Apache-2.0

//! Collaborator traits of the dependency builder
//!
//! The builder only reads: it asks a [`SchemaCatalog`] for table metadata and
//! foreign-key edges, a [`RowSource`] for rows, and a [`StrategyResolver`] for
//! the per-table policies. Each seam has an in-crate implementation and can be
//! replaced in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::error::ExtractResult;
use crate::engine::strategy::{ExtractStrategy, SqlBuildStrategy};
use crate::engine::types::{ForeignKeyEdge, QueryResult, TableMetadata};

/// Schema metadata provider
///
/// Accessors fail with `UninitializedCatalog` until [`SchemaCatalog::init`]
/// has completed successfully.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Loads tables, columns and foreign keys. Calling it again reloads.
    async fn init(&mut self, cancel: &CancellationToken) -> ExtractResult<()>;

    fn list_tables(&self) -> ExtractResult<&[Arc<TableMetadata>]>;

    fn list_foreign_keys(&self) -> ExtractResult<&[Arc<ForeignKeyEdge>]>;

    /// Case-insensitive lookup; `UnknownTable` when absent.
    fn table_metadata(&self, name: &str) -> ExtractResult<Arc<TableMetadata>>;
}

/// Row-fetch primitive
///
/// Implementations acquire whatever connection they need for the duration of
/// one call and release it before returning, on success, error or cancellation.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> ExtractResult<QueryResult>;
}

/// Per-table policy lookup for one run
pub trait StrategyResolver: Send + Sync {
    /// Falls back to the process-wide default when no rule matches.
    fn extract_strategy_for(&self, table: &str) -> ExtractStrategy;

    /// Falls back to the process-wide default when no rule matches.
    fn sql_build_strategy_for(&self, table: &str) -> SqlBuildStrategy;

    /// Whether the active configuration names this table at all.
    /// Related rows of unconfigured tables are never fetched.
    fn is_configured(&self, table: &str) -> bool;

    /// Table-level unique-column override, empty when none applies.
    fn unique_columns_for(&self, table: &str) -> ExtractResult<Vec<String>> {
        let _ = table;
        Ok(Vec::new())
    }
}

#[async_trait]
impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    async fn query(&self, sql: &str, cancel: &CancellationToken) -> ExtractResult<QueryResult> {
        (**self).query(sql, cancel).await
    }
}
