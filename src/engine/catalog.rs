// SPDX-License-Identifier: Apache-2.0

//! Schema catalogs
//!
//! [`CatalogSnapshot`] is the initialized state every catalog exposes: table
//! metadata with configuration applied, plus the foreign-key edge list.
//! [`MemoryCatalog`] serves a schema described in code.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{resolve_unique_columns, ExtractConfig};
use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::traits::SchemaCatalog;
use crate::engine::types::{ForeignKeyEdge, TableMetadata};

/// Loaded schema with excluded columns removed and unique-column rules applied
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    tables: Vec<Arc<TableMetadata>>,
    foreign_keys: Vec<Arc<ForeignKeyEdge>>,
}

impl CatalogSnapshot {
    pub fn build(
        tables: Vec<TableMetadata>,
        foreign_keys: Vec<ForeignKeyEdge>,
        config: &ExtractConfig,
    ) -> ExtractResult<Self> {
        let mut prepared = Vec::with_capacity(tables.len());
        for mut table in tables {
            table.columns.retain(|c| {
                !config
                    .fields_to_exclude
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(&c.name))
            });
            if let Some(columns) = resolve_unique_columns(&config.unique_columns, &table.name)? {
                debug!(table = %table.name, ?columns, "Applying unique column rule");
                table.unique_columns = columns;
            }
            prepared.push(Arc::new(table));
        }

        Ok(Self {
            tables: prepared,
            foreign_keys: foreign_keys.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn tables(&self) -> &[Arc<TableMetadata>] {
        &self.tables
    }

    pub fn foreign_keys(&self) -> &[Arc<ForeignKeyEdge>] {
        &self.foreign_keys
    }

    pub fn table(&self, name: &str) -> ExtractResult<Arc<TableMetadata>> {
        self.tables
            .iter()
            .find(|t| t.is_named(name))
            .cloned()
            .ok_or_else(|| ExtractError::unknown_table(name))
    }
}

/// Returns the snapshot or `UninitializedCatalog`.
pub(crate) fn loaded(snapshot: &Option<CatalogSnapshot>) -> ExtractResult<&CatalogSnapshot> {
    snapshot.as_ref().ok_or(ExtractError::UninitializedCatalog)
}

/// In-memory [`SchemaCatalog`]
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: Vec<TableMetadata>,
    foreign_keys: Vec<ForeignKeyEdge>,
    config: ExtractConfig,
    snapshot: Option<CatalogSnapshot>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_foreign_key(mut self, edge: ForeignKeyEdge) -> Self {
        self.foreign_keys.push(edge);
        self
    }

    pub fn with_config(mut self, config: ExtractConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[async_trait]
impl SchemaCatalog for MemoryCatalog {
    async fn init(&mut self, cancel: &CancellationToken) -> ExtractResult<()> {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let snapshot = CatalogSnapshot::build(
            self.tables.clone(),
            self.foreign_keys.clone(),
            &self.config,
        )?;
        info!(
            tables = snapshot.tables().len(),
            foreign_keys = snapshot.foreign_keys().len(),
            "Schema catalog initialized"
        );
        self.snapshot = Some(snapshot);
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
