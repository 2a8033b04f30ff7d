// SPDX-License-Identifier: Apache-2.0

//! Package-level extraction
//!
//! Each script of a package gets its own [`DependencyBuilder`] and graph, so
//! scripts are resolved in parallel. Results are collected as tasks finish;
//! the first failure cancels the others without waiting for earlier scripts.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::{ExtractConfig, PackageConfig, ScriptStrategies};
use crate::engine::builder::{DependencyBuilder, PreparedGraph};
use crate::engine::error::{ExtractError, ExtractResult};
use crate::engine::traits::{RowSource, SchemaCatalog};

/// Resolved graph of one script
#[derive(Debug)]
pub struct ScriptGraph {
    pub script_name: String,
    pub prepared: PreparedGraph,
}

/// Resolves every script of `package`; results keep the package's script order.
#[instrument(skip_all, fields(scripts = package.scripts.len()))]
pub async fn prepare_package(
    catalog: Arc<dyn SchemaCatalog>,
    source: Arc<dyn RowSource>,
    package: &PackageConfig,
    config: &ExtractConfig,
    cancel: &CancellationToken,
) -> ExtractResult<Vec<ScriptGraph>> {
    let resolvers = package
        .scripts
        .iter()
        .map(|script| ScriptStrategies::new(script, config))
        .collect::<ExtractResult<Vec<_>>>()?;

    let run_cancel = cancel.child_token();
    let mut tasks = JoinSet::new();

    for (index, (script, strategies)) in package.scripts.iter().zip(resolvers).enumerate() {
        let mut builder = DependencyBuilder::new(Arc::clone(&catalog), Arc::clone(&source));
        let roots = script.root_records.clone();
        let script_name = script.script_name.clone();
        let token = run_cancel.clone();

        info!(script = %script_name, roots = roots.len(), "Preparing script");
        tasks.spawn(async move {
            let outcome = builder
                .prepare(&roots, &strategies, &token)
                .await
                .map(|prepared| ScriptGraph {
                    script_name,
                    prepared,
                });
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<ScriptGraph>> = (0..package.scripts.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(|e| ExtractError::internal(format!("Script task panicked: {e}")))
            .and_then(|(index, result)| result.map(|graph| (index, graph)));
        match outcome {
            Ok((index, graph)) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(graph);
                }
            }
            Err(err) => {
                // Remaining builders see the token; dropping the set aborts their tasks.
                run_cancel.cancel();
                warn!(error = %err, "Script failed, cancelling the rest of the package");
                return Err(err);
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}
