// SPDX-License-Identifier: Apache-2.0

// qore-extract - referentially closed row extraction for SQL Server
// Core library

pub mod config;
pub mod engine;
pub mod observability;
pub mod package;

pub use config::{ExtractConfig, PackageConfig, ScriptConfig, ScriptStrategies, TableRule};
pub use engine::sql_text::idempotent_insert_fragment;
pub use engine::{
    DependencyBuilder, ExtractError, ExtractResult, PreparedGraph, Record, RecordGraph,
};
pub use package::{prepare_package, ScriptGraph};
