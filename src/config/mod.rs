// SPDX-License-Identifier: Apache-2.0

//! Extraction configuration
//!
//! [`ExtractConfig`] holds process-wide defaults and catalog-level rules;
//! [`PackageConfig`] lists the scripts to extract. [`ScriptStrategies`] turns
//! one script's table rules into a [`StrategyResolver`].

pub mod types;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::strategy::{ExtractStrategy, SqlBuildStrategy, StrategyOptions};
use crate::engine::traits::StrategyResolver;

pub use types::{ExtractConfig, PackageConfig, ScriptConfig, TablePattern, TableRule, UniqueColumnRule};

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ExtractResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ExtractError::configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ExtractError::configuration(format!("Failed to parse {}: {}", path.display(), e))
    })
}

impl ExtractConfig {
    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> ExtractResult<Self> {
        if !path.exists() {
            debug!("No extract config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let config: Self = read_json(path)?;
        info!("Loaded extract configuration from {:?}", path);
        Ok(config)
    }
}

impl PackageConfig {
    pub fn load(path: &Path) -> ExtractResult<Self> {
        read_json(path)
    }

    pub fn from_json(json: &str) -> ExtractResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExtractError::configuration(format!("Failed to parse package: {}", e)))
    }
}

/// Picks the unique-column override for `table`.
///
/// A rule naming the table literally wins. Otherwise every `/regex/` rule is
/// tried and more than one match is an error.
pub fn resolve_unique_columns(
    rules: &[UniqueColumnRule],
    table: &str,
) -> ExtractResult<Option<Vec<String>>> {
    let exact = rules
        .iter()
        .filter(|r| !TablePattern::is_pattern(&r.table_name))
        .find(|r| r.table_name.trim().eq_ignore_ascii_case(table));
    if let Some(rule) = exact {
        return Ok(Some(rule.unique_columns.clone()));
    }

    let mut matched = None;
    for rule in rules.iter().filter(|r| TablePattern::is_pattern(&r.table_name)) {
        if TablePattern::parse(&rule.table_name)?.matches(table) {
            if matched.is_some() {
                return Err(ExtractError::ambiguous_unique_rule(table));
            }
            matched = Some(rule.unique_columns.clone());
        }
    }
    Ok(matched)
}

#[derive(Debug)]
struct CompiledRule {
    pattern: TablePattern,
    extract: ExtractStrategy,
    sql_build: SqlBuildStrategy,
    unique_columns: Vec<String>,
}

/// [`StrategyResolver`] over the table rules of one script
#[derive(Debug)]
pub struct ScriptStrategies {
    rules: Vec<CompiledRule>,
    default_extract: ExtractStrategy,
    default_sql_build: SqlBuildStrategy,
}

impl ScriptStrategies {
    pub fn new(script: &ScriptConfig, config: &ExtractConfig) -> ExtractResult<Self> {
        let default_extract = config.default_extract_strategy.clone();
        let mut rules = Vec::with_capacity(script.tables_to_process.len());

        for rule in &script.tables_to_process {
            let options = StrategyOptions {
                dependency_to_exclude: rule.dependency_to_exclude.clone(),
                where_clause: rule.where_clause.clone(),
            };
            let extract = match rule.extract_strategy.as_deref() {
                Some(name) => ExtractStrategy::from_name(name, options.clone()).unwrap_or_else(|| {
                    warn!(
                        table = %rule.table_name,
                        strategy = %name,
                        "Unknown extract strategy, using default"
                    );
                    default_extract.with_options(options)
                }),
                None => default_extract.with_options(options),
            };

            rules.push(CompiledRule {
                pattern: TablePattern::parse(&rule.table_name)?,
                extract,
                sql_build: SqlBuildStrategy::from_options(&rule.sql_build_options, rule.exclude.clone()),
                unique_columns: rule.unique_columns.clone(),
            });
        }

        Ok(Self {
            rules,
            default_extract,
            default_sql_build: config.default_sql_build_strategy.clone(),
        })
    }

    /// A literal rule wins over the first matching pattern rule.
    fn rule_for(&self, table: &str) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .find(|r| !r.pattern.is_regex() && r.pattern.matches(table))
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|r| r.pattern.is_regex() && r.pattern.matches(table))
            })
    }
}

impl StrategyResolver for ScriptStrategies {
    fn extract_strategy_for(&self, table: &str) -> ExtractStrategy {
        self.rule_for(table)
            .map(|r| r.extract.clone())
            .unwrap_or_else(|| self.default_extract.clone())
    }

    fn sql_build_strategy_for(&self, table: &str) -> SqlBuildStrategy {
        self.rule_for(table)
            .map(|r| r.sql_build.clone())
            .unwrap_or_else(|| self.default_sql_build.clone())
    }

    fn is_configured(&self, table: &str) -> bool {
        self.rule_for(table).is_some()
    }

    fn unique_columns_for(&self, table: &str) -> ExtractResult<Vec<String>> {
        Ok(self
            .rule_for(table)
            .map(|r| r.unique_columns.clone())
            .unwrap_or_default())
    }
}
