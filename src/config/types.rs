// SPDX-License-Identifier: Apache-2.0

//! Configuration types
//!
//! All types deserialize from camelCase JSON. Table names in rules may be
//! literal names or `/regex/` patterns.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::strategy::{ExtractStrategy, SqlBuildStrategy};
use crate::engine::types::RootQuery;

/// Process-wide settings shared by every script of a package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractConfig {
    /// Used for tables without a matching rule
    #[serde(default)]
    pub default_extract_strategy: ExtractStrategy,
    #[serde(default)]
    pub default_sql_build_strategy: SqlBuildStrategy,
    /// Unique-column overrides applied to catalog metadata
    #[serde(default)]
    pub unique_columns: Vec<UniqueColumnRule>,
    /// Columns dropped from catalog metadata everywhere
    #[serde(default)]
    pub fields_to_exclude: Vec<String>,
}

/// Columns identifying a row for idempotency checks, instead of its primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueColumnRule {
    pub table_name: String,
    #[serde(default)]
    pub unique_columns: Vec<String>,
}

impl UniqueColumnRule {
    pub fn new<S: Into<String>>(table_name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table_name: table_name.into(),
            unique_columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// A package: one or more independent extraction scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageConfig {
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,
}

/// Roots and table rules for one output script
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    pub script_name: String,
    #[serde(default)]
    pub root_records: Vec<RootQuery>,
    #[serde(default)]
    pub tables_to_process: Vec<TableRule>,
}

/// Per-table extraction rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRule {
    pub table_name: String,
    #[serde(default)]
    pub unique_columns: Vec<String>,
    /// `onetable`, `fk`, `parents` or `children` (long forms accepted)
    #[serde(default)]
    pub extract_strategy: Option<String>,
    /// Names such as `AsIsInserts`, `NoInserts`, `IdentityInsert`
    #[serde(default)]
    pub sql_build_options: Vec<String>,
    /// Columns left out of generated statements
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub dependency_to_exclude: Vec<String>,
}

impl TableRule {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.extract_strategy = Some(name.into());
        self
    }
}

/// Table name matcher: a literal (case-insensitive) or a `/regex/` pattern
#[derive(Debug, Clone)]
pub enum TablePattern {
    Literal(String),
    Regex(Regex),
}

impl TablePattern {
    /// Whether `text` uses the `/regex/` form
    pub fn is_pattern(text: &str) -> bool {
        let text = text.trim();
        text.len() >= 2 && text.starts_with('/') && text.ends_with('/')
    }

    pub fn parse(text: &str) -> ExtractResult<Self> {
        let trimmed = text.trim();
        if !Self::is_pattern(trimmed) {
            return Ok(TablePattern::Literal(trimmed.to_string()));
        }

        let inner = &trimmed[1..trimmed.len() - 1];
        RegexBuilder::new(inner)
            .case_insensitive(true)
            .build()
            .map(TablePattern::Regex)
            .map_err(|e| ExtractError::invalid_pattern(text, e.to_string()))
    }

    pub fn matches(&self, table: &str) -> bool {
        match self {
            TablePattern::Literal(name) => name.eq_ignore_ascii_case(table),
            TablePattern::Regex(re) => re.is_match(table),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, TablePattern::Regex(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_ignores_case() {
        let p = TablePattern::parse("Orders").unwrap();
        assert!(!p.is_regex());
        assert!(p.matches("ORDERS"));
        assert!(!p.matches("OrdersArchive"));
    }

    #[test]
    fn test_regex_pattern() {
        let p = TablePattern::parse("/^loan.*types$/").unwrap();
        assert!(p.is_regex());
        assert!(p.matches("LoanTypes"));
        assert!(p.matches("loan_sub_types"));
        assert!(!p.matches("Loans"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let err = TablePattern::parse("/([a-z/").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPattern { .. }));
    }

    #[test]
    fn test_single_slash_is_literal() {
        assert!(!TablePattern::is_pattern("/"));
        assert!(TablePattern::is_pattern("//"));
    }

    #[test]
    fn test_table_rule_deserializes() {
        let json = r#"{
            "tableName": "Orders",
            "extractStrategy": "parents",
            "sqlBuildOptions": ["IdentityInsert"],
            "exclude": ["RowVersion"],
            "where": "IsDeleted = 0",
            "dependencyToExclude": ["AuditLog"]
        }"#;
        let rule: TableRule = serde_json::from_str(json).expect("should parse");
        assert_eq!(rule.extract_strategy.as_deref(), Some("parents"));
        assert_eq!(rule.where_clause.as_deref(), Some("IsDeleted = 0"));
        assert_eq!(rule.dependency_to_exclude, vec!["AuditLog"]);
        assert!(rule.unique_columns.is_empty());
    }
}
