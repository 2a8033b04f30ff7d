// SPDX-License-Identifier: Apache-2.0

//! Per-table traversal and rendering policies

use serde::{Deserialize, Serialize};

/// Options shared by every extract strategy variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOptions {
    /// Tables never reached through an edge from this table
    #[serde(default)]
    pub dependency_to_exclude: Vec<String>,
    /// Extra filter ANDed onto every related-row fetch of this table
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

/// Traversal direction policy for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractStrategy {
    /// Take the matched rows only, no traversal
    OnlyOneTable(StrategyOptions),
    /// Follow edges in both directions
    FkDependency(StrategyOptions),
    OnlyParents(StrategyOptions),
    OnlyChildren(StrategyOptions),
}

impl Default for ExtractStrategy {
    fn default() -> Self {
        ExtractStrategy::FkDependency(StrategyOptions::default())
    }
}

impl ExtractStrategy {
    /// Parses the short and long names accepted by configuration files.
    pub fn from_name(name: &str, options: StrategyOptions) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "onlyonetable" | "onlyonetableextract" | "onetable" => {
                Some(ExtractStrategy::OnlyOneTable(options))
            }
            "fkdependency" | "fkdependencyextract" | "fk" => {
                Some(ExtractStrategy::FkDependency(options))
            }
            "onlyparents" | "parentsextract" | "parents" => {
                Some(ExtractStrategy::OnlyParents(options))
            }
            "onlychildren" | "childrenextract" | "children" => {
                Some(ExtractStrategy::OnlyChildren(options))
            }
            _ => None,
        }
    }

    /// Same variant carrying different options
    pub fn with_options(&self, options: StrategyOptions) -> Self {
        match self {
            ExtractStrategy::OnlyOneTable(_) => ExtractStrategy::OnlyOneTable(options),
            ExtractStrategy::FkDependency(_) => ExtractStrategy::FkDependency(options),
            ExtractStrategy::OnlyParents(_) => ExtractStrategy::OnlyParents(options),
            ExtractStrategy::OnlyChildren(_) => ExtractStrategy::OnlyChildren(options),
        }
    }

    pub fn options(&self) -> &StrategyOptions {
        match self {
            ExtractStrategy::OnlyOneTable(o)
            | ExtractStrategy::FkDependency(o)
            | ExtractStrategy::OnlyParents(o)
            | ExtractStrategy::OnlyChildren(o) => o,
        }
    }

    pub fn process_parents(&self) -> bool {
        matches!(
            self,
            ExtractStrategy::FkDependency(_) | ExtractStrategy::OnlyParents(_)
        )
    }

    pub fn process_children(&self) -> bool {
        matches!(
            self,
            ExtractStrategy::FkDependency(_) | ExtractStrategy::OnlyChildren(_)
        )
    }

    pub fn excludes(&self, table: &str) -> bool {
        self.options()
            .dependency_to_exclude
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.options()
            .where_clause
            .as_deref()
            .filter(|w| !w.trim().is_empty())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtractStrategy::OnlyOneTable(_) => "only_one_table",
            ExtractStrategy::FkDependency(_) => "fk_dependency",
            ExtractStrategy::OnlyParents(_) => "only_parents",
            ExtractStrategy::OnlyChildren(_) => "only_children",
        }
    }
}

/// Per-table rendering policy handed to the script assembler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlBuildStrategy {
    #[serde(default)]
    pub as_is_inserts: bool,
    #[serde(default)]
    pub no_inserts: bool,
    #[serde(default)]
    pub throw_if_not_exists: bool,
    /// Explicit primary-key values are scripted instead of database-generated ones
    #[serde(default)]
    pub identity_insert: bool,
    /// Columns left out of generated INSERT/UPDATE statements
    #[serde(default)]
    pub fields_to_exclude: Vec<String>,
}

impl SqlBuildStrategy {
    /// Builds a strategy from option names such as `AsIsInserts` or `IdentityInsert`.
    pub fn from_options<S: AsRef<str>>(options: &[S], fields_to_exclude: Vec<String>) -> Self {
        let has = |name: &str| options.iter().any(|o| o.as_ref().eq_ignore_ascii_case(name));
        Self {
            as_is_inserts: has("AsIsInserts"),
            no_inserts: has("NoInserts"),
            throw_if_not_exists: has("ThrowIfNotExists") || has("ThrowExceptionIfNotExists"),
            identity_insert: has("IdentityInsert"),
            fields_to_exclude,
        }
    }

    pub fn excludes_field(&self, column: &str) -> bool {
        self.fields_to_exclude
            .iter()
            .any(|f| f.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_flags_follow_the_variant() {
        let cases = [
            ("onetable", false, false),
            ("fk", true, true),
            ("parents", true, false),
            ("children", false, true),
        ];
        for (name, parents, children) in cases {
            let strategy = ExtractStrategy::from_name(name, StrategyOptions::default())
                .expect("known strategy name");
            assert_eq!(strategy.process_parents(), parents, "{name}");
            assert_eq!(strategy.process_children(), children, "{name}");
        }
    }

    #[test]
    fn unknown_strategy_name_is_rejected() {
        assert!(ExtractStrategy::from_name("sideways", StrategyOptions::default()).is_none());
    }

    #[test]
    fn exclusions_are_case_insensitive() {
        let strategy = ExtractStrategy::FkDependency(StrategyOptions {
            dependency_to_exclude: vec!["AuditLog".into()],
            where_clause: Some("  ".into()),
        });
        assert!(strategy.excludes("auditlog"));
        assert!(!strategy.excludes("Orders"));
        assert_eq!(strategy.where_clause(), None);
    }

    #[test]
    fn sql_build_options_parse_by_name() {
        let s = SqlBuildStrategy::from_options(
            &["identityinsert", "ThrowExceptionIfNotExists"],
            vec!["RowVersion".into()],
        );
        assert!(s.identity_insert);
        assert!(s.throw_if_not_exists);
        assert!(!s.no_inserts);
        assert!(s.excludes_field("rowversion"));
    }

    #[test]
    fn extract_strategy_serializes_as_tagged_variant() {
        let json = r#"{"kind":"only_parents","dependencyToExclude":["Audit"]}"#;
        let strategy: ExtractStrategy = serde_json::from_str(json).expect("should parse");
        assert!(strategy.process_parents());
        assert!(!strategy.process_children());
        assert!(strategy.excludes("audit"));
    }
}
