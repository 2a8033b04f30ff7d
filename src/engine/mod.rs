// SPDX-License-Identifier: Apache-2.0

// Extraction Engine Module
// Record model, SQL text rendering and FK-graph traversal

pub mod builder;
pub mod catalog;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod record;
pub mod sql_text;
pub mod strategy;
pub mod traits;
pub mod types;

pub use builder::{BuildState, BuildStats, DependencyBuilder, PreparedGraph};
pub use catalog::{CatalogSnapshot, MemoryCatalog};
pub use error::{ExtractError, ExtractResult};
pub use graph::RecordGraph;
pub use record::{Field, Record, RecordId, RecordKey, Relation};
pub use strategy::{ExtractStrategy, SqlBuildStrategy, StrategyOptions};
pub use traits::{RowSource, SchemaCatalog, StrategyResolver};
pub use types::*;
