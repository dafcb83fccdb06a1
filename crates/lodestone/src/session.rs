//! Project session: the engine's front door.
//!
//! A [`ProjectSession`] owns the cache, dependency graph, symbol index, and
//! background reasoner for one project, and exposes the operations a host
//! (editor plugin, MCP server, CLI) calls:
//!
//! - `file_changed` feeds edits to the background queue
//! - `analyze_file` analyzes in the foreground and commits immediately
//! - `build_context` / `impact_of` / `cycles` are read-only queries
//! - `file_removed` retracts a file everywhere
//!
//! Queries take read locks on the graph and index; only the foreground
//! analysis path and `file_removed` take write locks, and the background
//! reasoner is the only other writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use crate::cache::{AnalysisCache, CacheStats, DEFAULT_CAPACITY};
use crate::context::ContextBuilder;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::impact::ImpactAnalyzer;
use crate::index::SymbolIndex;
use crate::parser::FileParser;
use crate::reasoner::{
    BackgroundReasoner, ReasonerEvent, DEFAULT_DEBOUNCE, DEFAULT_TASK_DEADLINE,
};
use crate::storage::DurableStore;
use crate::types::{
    CandidateFile, ContextFile, ContextOptions, ContextQuality, FileAnalysis, ImpactResult,
    Insight, Priority, SymbolDefinition, SymbolReference,
};

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Memory-tier capacity of the analysis cache
    pub cache_capacity: usize,
    /// Quiet window before a queued file is analyzed
    pub debounce: Duration,
    /// Per-task deadline for background analysis
    pub task_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            task_deadline: DEFAULT_TASK_DEADLINE,
        }
    }
}

/// Long-lived engine state for one project.
pub struct ProjectSession {
    cache: Arc<AnalysisCache>,
    graph: Arc<RwLock<DependencyGraph>>,
    index: Arc<RwLock<SymbolIndex>>,
    reasoner: BackgroundReasoner,
    store: Arc<dyn DurableStore>,
}

impl std::fmt::Debug for ProjectSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSession")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ProjectSession {
    /// Open a session over a store and parser, warming the symbol index
    /// from the last persisted snapshot when one exists.
    ///
    /// The dependency graph starts empty and fills as files are analyzed;
    /// the warmed index serves lookups until the first rebuild replaces it.
    /// Must be called within a tokio runtime.
    pub async fn open(
        store: Arc<dyn DurableStore>,
        parser: Arc<dyn FileParser>,
        config: SessionConfig,
    ) -> Result<Self> {
        let cache = Arc::new(AnalysisCache::with_capacity(
            Arc::clone(&store),
            parser,
            config.cache_capacity,
        ));

        let index = match store.load_index_snapshot().await? {
            Some(snapshot) => {
                let index = SymbolIndex::from_snapshot(snapshot);
                tracing::debug!(
                    definition_names = index.definition_count(),
                    "symbol index warmed from snapshot"
                );
                index
            }
            None => SymbolIndex::new(),
        };

        let graph = Arc::new(RwLock::new(DependencyGraph::new()));
        let index = Arc::new(RwLock::new(index));
        let reasoner = BackgroundReasoner::spawn(
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::clone(&graph),
            Arc::clone(&index),
            config.debounce,
            config.task_deadline,
        );

        Ok(Self {
            cache,
            graph,
            index,
            reasoner,
            store,
        })
    }

    /// Report an edit: queue the file for background analysis.
    ///
    /// Rapid successive edits to the same file coalesce; see
    /// [`BackgroundReasoner::queue_analysis`].
    pub fn file_changed(
        &self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        priority: Priority,
    ) {
        self.reasoner.queue_analysis(path, content, priority);
    }

    /// Analyze a file in the foreground and commit the result immediately.
    ///
    /// Bypasses the queue and its debounce; used when a caller needs the
    /// graph current before querying (e.g., impact analysis right after an
    /// edit).
    pub async fn analyze_file(&self, path: &Path, content: &str) -> Result<Arc<FileAnalysis>> {
        let analysis = self.cache.get_or_compute(path, content).await?;

        let mut graph = self.graph.write().await;
        graph.upsert(Arc::clone(&analysis));
        *self.index.write().await = SymbolIndex::build(&graph);
        drop(graph);

        Ok(analysis)
    }

    /// Remove a file from the session: graph, index, cache, and store.
    pub async fn file_removed(&self, path: &Path) -> Result<()> {
        {
            let mut graph = self.graph.write().await;
            graph.remove(path);
            *self.index.write().await = SymbolIndex::build(&graph);
        }
        self.cache.invalidate(path).await?;
        tracing::debug!(path = %path.display(), "file removed from session");
        Ok(())
    }

    /// Assemble ranked context for a query.
    ///
    /// Returns the selected files and a diagnostic quality assessment.
    pub async fn build_context(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        candidates: &[CandidateFile],
        current_file: Option<&Path>,
        options: &ContextOptions,
    ) -> (Vec<ContextFile>, ContextQuality) {
        let graph = self.graph.read().await;
        let index = self.index.read().await;
        let builder = ContextBuilder::new(&graph, &index);
        let files = builder.build_context(query, query_embedding, candidates, current_file, options);
        let quality = ContextBuilder::evaluate_quality(&files);
        (files, quality)
    }

    /// Blast radius of changing `path`.
    pub async fn impact_of(&self, path: &Path) -> ImpactResult {
        let graph = self.graph.read().await;
        let index = self.index.read().await;
        ImpactAnalyzer::new(&graph, &index).analyze(path)
    }

    /// Circular dependency chains in the current graph.
    pub async fn cycles(&self) -> Vec<Vec<PathBuf>> {
        self.graph.read().await.detect_cycles()
    }

    /// First known definition of a symbol name.
    pub async fn definition_of(&self, name: &str) -> Option<SymbolDefinition> {
        self.index.read().await.resolve_definition(name).cloned()
    }

    /// All recorded references to a symbol name.
    pub async fn references_to(&self, name: &str) -> Vec<SymbolReference> {
        self.index.read().await.find_references(name).to_vec()
    }

    /// Insights for a file, hydrating from the durable store when cold.
    pub async fn insights(&self, path: &Path) -> Vec<Insight> {
        self.reasoner.load_insights(path).await
    }

    /// Subscribe to background analysis events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReasonerEvent> {
        self.reasoner.subscribe()
    }

    /// Cache hit/miss counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of background tasks waiting to run.
    #[must_use]
    pub fn pending_analyses(&self) -> usize {
        self.reasoner.pending_count()
    }

    /// The durable store backing this session.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Stop the background worker and wait for it to exit.
    pub async fn shutdown(&self) {
        self.reasoner.shutdown().await;
    }
}
