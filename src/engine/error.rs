// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the extraction engine
//!
//! Catalog, driver and configuration failures are all mapped onto
//! [`ExtractError`] so callers get a single descriptive error per
//! `prepare` call, never a partially resolved graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all extraction operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ExtractError {
    #[error("{table} does not have a primary key")]
    MissingPrimaryKey { table: String },

    #[error("More than one pattern rule for unique columns matches table {table}")]
    AmbiguousUniqueColumnRule { table: String },

    #[error("Schema catalog was not initialized")]
    UninitializedCatalog,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Table not found in schema catalog: {table}")]
    UnknownTable { table: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Invalid table pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ExtractError {
    pub fn missing_primary_key(table: impl Into<String>) -> Self {
        Self::MissingPrimaryKey { table: table.into() }
    }

    pub fn ambiguous_unique_rule(table: impl Into<String>) -> Self {
        Self::AmbiguousUniqueColumnRule { table: table.into() }
    }

    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable { table: table.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: msg.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;
