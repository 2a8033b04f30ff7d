// SPDX-License-Identifier: Apache-2.0

//! Dependency builder
//!
//! Extracts a referentially closed set of rows: root queries seed a FIFO
//! queue, then every dequeued record is expanded along the foreign-key edges
//! its table's [`ExtractStrategy`] allows. Rows are interned into a
//! [`RecordGraph`] as they are fetched, so each (table, key) identity is
//! expanded at most once and cyclic schemas terminate.
//!
//! A run is all-or-nothing: any error or cancellation aborts `prepare` and
//! drops the partial graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::TablePattern;
use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::graph::RecordGraph;
use crate::engine::record::{Record, RecordId};
use crate::engine::sql_text::{quote_ident, value_to_sql_text};
use crate::engine::strategy::{ExtractStrategy, SqlBuildStrategy};
use crate::engine::traits::{RowSource, SchemaCatalog, StrategyResolver};
use crate::engine::types::{ForeignKeyEdge, RootQuery, RunId, TableMetadata};

/// Lifecycle of one `prepare` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    RootExpansion,
    Draining,
    Done,
    Aborted,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Concrete root tables fetched (a pattern root counts once per matching table)
    pub roots_expanded: usize,
    pub fetches: usize,
    pub rows_fetched: usize,
    pub records: usize,
    /// Fetched rows that resolved to an already known record
    pub duplicates_merged: usize,
    pub elapsed_ms: f64,
}

/// Result of a successful run
#[derive(Debug)]
pub struct PreparedGraph {
    pub run_id: RunId,
    pub graph: RecordGraph,
    pub stats: BuildStats,
}

/// `SELECT *` over one table with an optional filter
pub fn select_sql(table: &str, where_clause: Option<&str>) -> String {
    match where_clause.map(str::trim).filter(|w| !w.is_empty()) {
        Some(filter) => format!("SELECT * FROM {} WHERE {}", table, filter),
        None => format!("SELECT * FROM {}", table),
    }
}

pub struct DependencyBuilder {
    catalog: Arc<dyn SchemaCatalog>,
    source: Arc<dyn RowSource>,
    state: BuildState,
}

impl DependencyBuilder {
    /// `catalog` must already be initialized.
    pub fn new(catalog: Arc<dyn SchemaCatalog>, source: Arc<dyn RowSource>) -> Self {
        Self {
            catalog,
            source,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Resolves `roots` and everything reachable from them under `strategies`.
    #[instrument(skip(self, roots, strategies, cancel), fields(roots = roots.len(), run_id))]
    pub async fn prepare(
        &mut self,
        roots: &[RootQuery],
        strategies: &dyn StrategyResolver,
        cancel: &CancellationToken,
    ) -> ExtractResult<PreparedGraph> {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started = Instant::now();

        let mut run = Traversal {
            catalog: self.catalog.as_ref(),
            source: self.source.as_ref(),
            strategies,
            cancel,
            graph: RecordGraph::new(),
            queue: VecDeque::new(),
            processed: HashSet::new(),
            contexts: HashMap::new(),
            stats: BuildStats::default(),
        };

        let outcome = run.execute(roots, &mut self.state).await;
        match outcome {
            Ok(()) => {
                self.state = BuildState::Done;
                let mut stats = run.stats;
                stats.records = run.graph.len();
                stats.elapsed_ms = started.elapsed().as_micros() as f64 / 1000.0;
                info!(
                    records = stats.records,
                    fetches = stats.fetches,
                    rows = stats.rows_fetched,
                    merged = stats.duplicates_merged,
                    elapsed_ms = stats.elapsed_ms,
                    "Dependency graph resolved"
                );
                Ok(PreparedGraph {
                    run_id,
                    graph: run.graph,
                    stats,
                })
            }
            Err(err) => {
                self.state = BuildState::Aborted;
                if err.is_cancelled() {
                    info!("Dependency resolution cancelled");
                } else {
                    warn!(error = %err, "Dependency resolution failed");
                }
                Err(err)
            }
        }
    }
}

/// Which side of an edge is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Parent,
    Child,
}

/// Per-table state resolved once per run
#[derive(Debug)]
struct TableContext {
    metadata: Arc<TableMetadata>,
    extract: Arc<ExtractStrategy>,
    sql_build: Arc<SqlBuildStrategy>,
}

struct Traversal<'a> {
    catalog: &'a dyn SchemaCatalog,
    source: &'a dyn RowSource,
    strategies: &'a dyn StrategyResolver,
    cancel: &'a CancellationToken,
    graph: RecordGraph,
    queue: VecDeque<RecordId>,
    processed: HashSet<RecordId>,
    contexts: HashMap<String, Arc<TableContext>>,
    stats: BuildStats,
}

impl<'a> Traversal<'a> {
    fn check_cancelled(&self) -> ExtractResult<()> {
        if self.cancel.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn execute(&mut self, roots: &[RootQuery], state: &mut BuildState) -> ExtractResult<()> {
        *state = BuildState::RootExpansion;
        info!("Expanding root queries");
        self.expand_roots(roots).await?;

        *state = BuildState::Draining;
        info!(queued = self.queue.len(), "Draining dependency queue");
        self.drain().await
    }

    async fn expand_roots(&mut self, roots: &[RootQuery]) -> ExtractResult<()> {
        let mut ordered: Vec<&RootQuery> = roots.iter().collect();
        ordered.sort_by_key(|r| r.processing_order);

        for root in ordered {
            self.check_cancelled()?;
            for table in self.root_tables(root)? {
                let ctx = self.context(&table)?;
                let sql = select_sql(&ctx.metadata.name, root.where_clause.as_deref());
                for id in self.fetch(&ctx, &sql).await? {
                    if let Some(record) = self.graph.get_mut(id) {
                        record.mark_starting_point();
                    }
                }
                self.stats.roots_expanded += 1;
            }
        }
        Ok(())
    }

    /// Concrete table names a root refers to
    fn root_tables(&self, root: &RootQuery) -> ExtractResult<Vec<String>> {
        let pattern = TablePattern::parse(&root.table_name)?;
        if !pattern.is_regex() {
            return Ok(vec![root.table_name.trim().to_string()]);
        }

        let tables: Vec<String> = self
            .catalog
            .list_tables()?
            .iter()
            .filter(|t| pattern.matches(&t.name))
            .map(|t| t.name.clone())
            .collect();
        if tables.is_empty() {
            warn!(pattern = %root.table_name, "Root pattern matches no table");
        } else {
            debug!(pattern = %root.table_name, ?tables, "Root pattern expanded");
        }
        Ok(tables)
    }

    async fn drain(&mut self) -> ExtractResult<()> {
        while let Some(id) = self.queue.pop_front() {
            self.check_cancelled()?;
            if !self.processed.insert(id) {
                continue;
            }
            self.expand(id).await?;
        }
        Ok(())
    }

    async fn expand(&mut self, id: RecordId) -> ExtractResult<()> {
        let table = match self.graph.get(id) {
            Some(record) => {
                debug!(record = %record, "Expanding record");
                record.table_name().to_string()
            }
            None => return Ok(()),
        };
        let strategy = Arc::clone(&self.context(&table)?.extract);

        let edges: Vec<Arc<ForeignKeyEdge>> = self
            .catalog
            .list_foreign_keys()?
            .iter()
            .filter(|e| e.is_parent(&table) || e.is_referenced(&table))
            .cloned()
            .collect();

        for edge in edges {
            self.check_cancelled()?;
            if edge.is_parent(&table) && strategy.process_parents() {
                self.follow(id, &strategy, &edge, Direction::Parent).await?;
            }
            if edge.is_referenced(&table) && strategy.process_children() {
                self.follow(id, &strategy, &edge, Direction::Child).await?;
            }
        }
        Ok(())
    }

    /// Fetches the rows on the other side of `edge` and links them to `id`.
    async fn follow(
        &mut self,
        id: RecordId,
        strategy: &ExtractStrategy,
        edge: &Arc<ForeignKeyEdge>,
        direction: Direction,
    ) -> ExtractResult<()> {
        let (target, value_column, predicate_column) = match direction {
            Direction::Parent => (&edge.referenced_table, &edge.parent_column, &edge.referenced_column),
            Direction::Child => (&edge.parent_table, &edge.referenced_column, &edge.parent_column),
        };

        if !self.strategies.is_configured(target) {
            trace!(%edge, ?direction, "Skipping edge to unconfigured table");
            return Ok(());
        }
        if strategy.excludes(target) {
            trace!(%edge, ?direction, "Skipping excluded dependency");
            return Ok(());
        }

        let literal = match self.graph.get(id).and_then(|r| r.field(value_column)) {
            Some(field) => value_to_sql_text(field),
            None => {
                trace!(%edge, ?direction, column = %value_column, "No value for correlated column");
                return Ok(());
            }
        };

        let ctx = self.context(target)?;
        let mut predicate = format!("{} = {}", quote_ident(predicate_column), literal);
        if let Some(filter) = ctx.extract.where_clause() {
            predicate.push_str(" AND ");
            predicate.push_str(filter);
        }
        let sql = select_sql(&ctx.metadata.name, Some(&predicate));

        for related in self.fetch(&ctx, &sql).await? {
            match direction {
                Direction::Parent => self.graph.link_parent(id, related, Arc::clone(edge)),
                Direction::Child => self.graph.link_child(id, related, Arc::clone(edge)),
            }
        }
        Ok(())
    }

    /// Runs one query and interns its rows; only new records are enqueued.
    async fn fetch(&mut self, ctx: &TableContext, sql: &str) -> ExtractResult<Vec<RecordId>> {
        self.check_cancelled()?;
        debug!(table = %ctx.metadata.name, %sql, "Fetching rows");

        let result = self.source.query(sql, self.cancel).await?;
        self.stats.fetches += 1;
        self.stats.rows_fetched += result.rows.len();

        let mut ids = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let record = Record::from_row(Arc::clone(&ctx.metadata), &result, row)?
                .with_source(sql.trim())
                .with_strategies(Arc::clone(&ctx.extract), Arc::clone(&ctx.sql_build));
            let (id, inserted) = self.graph.intern(record);
            if inserted {
                self.queue.push_back(id);
            } else {
                self.stats.duplicates_merged += 1;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Metadata and strategies of `table`, resolved on first use.
    fn context(&mut self, table: &str) -> ExtractResult<Arc<TableContext>> {
        let key = table.to_ascii_lowercase();
        if let Some(ctx) = self.contexts.get(&key) {
            return Ok(Arc::clone(ctx));
        }

        let mut metadata = self.catalog.table_metadata(table)?;
        let unique = self.strategies.unique_columns_for(&metadata.name)?;
        if !unique.is_empty() {
            metadata = Arc::new(metadata.with_unique_columns(&unique));
        }

        let ctx = Arc::new(TableContext {
            extract: Arc::new(self.strategies.extract_strategy_for(&metadata.name)),
            sql_build: Arc::new(self.strategies.sql_build_strategy_for(&metadata.name)),
            metadata,
        });
        trace!(table = %ctx.metadata.name, strategy = ctx.extract.name(), "Resolved table context");
        self.contexts.insert(key, Arc::clone(&ctx));
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql() {
        assert_eq!(select_sql("Orders", None), "SELECT * FROM Orders");
        assert_eq!(select_sql("Orders", Some("  ")), "SELECT * FROM Orders");
        assert_eq!(
            select_sql("Orders", Some("Id = 42 ")),
            "SELECT * FROM Orders WHERE Id = 42"
        );
    }

    #[test]
    fn test_build_state_serializes_snake_case() {
        let json = serde_json::to_string(&BuildState::RootExpansion).unwrap();
        assert_eq!(json, "\"root_expansion\"");
    }
}
