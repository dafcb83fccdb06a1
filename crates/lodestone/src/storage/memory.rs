//! In-memory storage backend.
//!
//! Fast, ephemeral storage backed by `HashMap`s behind an async `RwLock`.
//! Used by tests and by hosts that handle persistence themselves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::Insight;

use super::{DurableStore, IndexSnapshot, StoredAnalysis};

/// Ephemeral [`DurableStore`] implementation.
///
/// All operations are infallible in practice; the `Result` returns exist to
/// satisfy the trait contract shared with real backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    analyses: HashMap<PathBuf, StoredAnalysis>,
    insights: HashMap<PathBuf, Vec<Insight>>,
    index_snapshot: Option<IndexSnapshot>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of analyses currently held.
    pub async fn analysis_count(&self) -> usize {
        self.inner.read().await.analyses.len()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn save_analysis(&self, path: &Path, record: &StoredAnalysis) -> Result<()> {
        self.inner
            .write()
            .await
            .analyses
            .insert(path.to_path_buf(), record.clone());
        Ok(())
    }

    async fn load_analysis(&self, path: &Path) -> Result<Option<StoredAnalysis>> {
        Ok(self.inner.read().await.analyses.get(path).cloned())
    }

    async fn delete_analysis(&self, path: &Path) -> Result<()> {
        self.inner.write().await.analyses.remove(path);
        Ok(())
    }

    async fn save_insights(&self, path: &Path, insights: &[Insight]) -> Result<()> {
        self.inner
            .write()
            .await
            .insights
            .insert(path.to_path_buf(), insights.to_vec());
        Ok(())
    }

    async fn load_insights(&self, path: &Path) -> Result<Vec<Insight>> {
        Ok(self
            .inner
            .read()
            .await
            .insights
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_index_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        self.inner.write().await.index_snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn load_index_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        Ok(self.inner.read().await.index_snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileAnalysis;

    fn record(path: &str, hash: u64) -> StoredAnalysis {
        StoredAnalysis {
            analysis: FileAnalysis::empty(PathBuf::from(path)),
            content_hash: hash,
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_same_record() {
        let store = MemoryStore::new();
        let rec = record("src/a.ts", 42);

        store.save_analysis(Path::new("src/a.ts"), &rec).await.unwrap();
        let loaded = store.load_analysis(Path::new("src/a.ts")).await.unwrap();

        assert_eq!(loaded, Some(rec));
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let store = MemoryStore::new();
        let loaded = store.load_analysis(Path::new("missing.ts")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryStore::new();
        store
            .save_analysis(Path::new("a.ts"), &record("a.ts", 1))
            .await
            .unwrap();
        store.delete_analysis(Path::new("a.ts")).await.unwrap();

        assert!(store.load_analysis(Path::new("a.ts")).await.unwrap().is_none());
        assert_eq!(store.analysis_count().await, 0);
    }

    #[tokio::test]
    async fn insights_default_to_empty() {
        let store = MemoryStore::new();
        let insights = store.load_insights(Path::new("a.ts")).await.unwrap();
        assert!(insights.is_empty());
    }
}
