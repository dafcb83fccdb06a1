//! Blast-radius analysis for file changes.
//!
//! Answers "what breaks if this file changes": direct dependents from the
//! graph, transitive dependents via depth-capped BFS, and the exported
//! symbols other files actually reference. Results are recomputed on every
//! call and never cached; dependents change too often for a cached blast
//! radius to stay honest.

use std::path::Path;

use crate::graph::{DependencyGraph, MAX_TRAVERSAL_DEPTH};
use crate::index::SymbolIndex;
use crate::types::ImpactResult;

/// Impact score above which a change is flagged high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 10.0;

/// Weight of a transitive dependent relative to a direct one.
const TRANSITIVE_WEIGHT: f64 = 0.5;

/// Computes [`ImpactResult`]s over the current graph and index.
///
/// Borrows both; construct one per query under the session's read lock.
#[derive(Debug)]
pub struct ImpactAnalyzer<'a> {
    graph: &'a DependencyGraph,
    index: &'a SymbolIndex,
}

impl<'a> ImpactAnalyzer<'a> {
    /// Create an analyzer over the given graph and index.
    #[must_use]
    pub fn new(graph: &'a DependencyGraph, index: &'a SymbolIndex) -> Self {
        Self { graph, index }
    }

    /// Analyze the blast radius of changing `path`.
    ///
    /// Total: a file unknown to the graph gets an empty result with score
    /// zero. `impact_score = direct + 0.5 * transitive`: a cheap monotonic
    /// heuristic, deliberately not a graph centrality measure.
    #[must_use]
    pub fn analyze(&self, path: &Path) -> ImpactResult {
        let direct_dependents = self.graph.dependents_of(path);
        let transitive_dependents = self
            .graph
            .transitive_dependents_of(path, MAX_TRAVERSAL_DEPTH);

        #[allow(clippy::cast_precision_loss)]
        let impact_score = direct_dependents.len() as f64
            + TRANSITIVE_WEIGHT * transitive_dependents.len() as f64;

        let affected_symbols: Vec<String> = self
            .index
            .exports_of(path)
            .iter()
            .filter(|def| {
                self.index
                    .find_references(&def.name)
                    .iter()
                    .any(|r| r.from_file != path)
            })
            .map(|def| def.name.clone())
            .collect();

        let result = ImpactResult {
            file_path: path.to_path_buf(),
            impact_score,
            is_high_risk: impact_score > HIGH_RISK_THRESHOLD,
            affects_api: !affected_symbols.is_empty(),
            direct_dependents,
            transitive_dependents,
            affected_symbols,
        };

        tracing::debug!(
            path = %path.display(),
            impact_score = result.impact_score,
            direct = result.direct_dependents.len(),
            transitive = result.transitive_dependents.len(),
            "impact analysis complete"
        );
        result
    }
}
