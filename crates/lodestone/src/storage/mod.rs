//! Durable storage abstraction for analyses, insights, and index snapshots.
//!
//! The engine treats persistence as a pluggable collaborator: a simple
//! key-value durable store addressed by file path. Two backends ship with
//! the crate:
//!
//! - **`MemoryStore`**: ephemeral, for tests and hosts that persist
//!   elsewhere
//! - **`JsonlStore`**: JSON Lines files with atomic temp-file-then-rename
//!   writes and resilient loading (corrupt lines are skipped and surface as
//!   cache misses)
//!
//! # Architecture
//!
//! The trait is async and object-safe so hosts can inject their own backend
//! via `Arc<dyn DurableStore>`. Implementations must be `Send + Sync`; the
//! engine's single-writer discipline means writes only arrive from the
//! background reasoner and the cache's own methods.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FileAnalysis, Insight, SymbolDefinition, SymbolReference};

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// A persisted analysis together with the content hash it was computed from.
///
/// The hash is what makes the durable tier trustworthy: an entry is valid if
/// and only if its hash matches the hash of the file's current content.
/// Staleness is never assumed, always checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    /// The cached parser output
    pub analysis: FileAnalysis,
    /// xxHash64 of the content the analysis was computed from
    pub content_hash: u64,
}

/// Serializable snapshot of the symbol index, keyed by project.
///
/// The index is derived state and always reconstructable from analyses; the
/// snapshot only exists to warm up a fresh session faster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// All recorded definitions
    pub definitions: Vec<SymbolDefinition>,
    /// All recorded references
    pub references: Vec<SymbolReference>,
}

/// Durable key-value store for per-file engine records.
///
/// # Error Handling
///
/// Read methods distinguish "not found" (`Ok(None)` / empty vec) from
/// infrastructure failure (`Err`). Callers treat both storage failure and
/// absence as a cache miss and recompute.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist an analysis together with its content hash.
    async fn save_analysis(&self, path: &Path, record: &StoredAnalysis) -> Result<()>;

    /// Load a persisted analysis, if one exists.
    async fn load_analysis(&self, path: &Path) -> Result<Option<StoredAnalysis>>;

    /// Remove a persisted analysis (e.g., the file was deleted).
    async fn delete_analysis(&self, path: &Path) -> Result<()>;

    /// Persist the insight list for a file, replacing any previous list.
    async fn save_insights(&self, path: &Path, insights: &[Insight]) -> Result<()>;

    /// Load the persisted insight list for a file (empty if none).
    async fn load_insights(&self, path: &Path) -> Result<Vec<Insight>>;

    /// Persist a symbol index snapshot for the project.
    async fn save_index_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()>;

    /// Load the persisted symbol index snapshot, if one exists.
    async fn load_index_snapshot(&self) -> Result<Option<IndexSnapshot>>;
}
