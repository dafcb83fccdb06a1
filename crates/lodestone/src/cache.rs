//! Two-tier analysis cache with content-hash validation.
//!
//! Lookup order: bounded memory tier, durable store, parser. An entry is
//! valid if and only if its stored content hash equals the hash of the
//! file's current content; staleness is never assumed, always checked, so
//! a stale durable record simply fails the hash comparison and falls
//! through to the parser.
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Hash | xxHash64 | Fast non-cryptographic hashing for change detection |
//! | Eviction | Insertion-order | Deliberately not strict LRU; reads don't reorder |
//! | Parser failure | Propagated, never stored | A bad parse must not mask a later good one |
//! | Store write failure | Degrade with warning | Losing durability beats failing the request |

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use xxhash_rust::xxh64::xxh64;

use crate::error::Result;
use crate::parser::FileParser;
use crate::storage::{DurableStore, StoredAnalysis};
use crate::types::FileAnalysis;

/// Default bound on the memory tier.
pub const DEFAULT_CAPACITY: usize = 500;

/// Hash file content for change detection.
#[must_use]
pub fn content_hash(content: &str) -> u64 {
    xxh64(content.as_bytes(), 0)
}

/// Counters for cache diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the memory tier
    pub memory_hits: u64,
    /// Lookups served from the durable store
    pub durable_hits: u64,
    /// Lookups that reached the parser
    pub misses: u64,
    /// Entries evicted from the memory tier
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    analysis: Arc<FileAnalysis>,
    content_hash: u64,
}

/// Bounded memory tier. Eviction order is insertion order: the
/// oldest-inserted entry goes first, and reads do not reorder.
#[derive(Debug, Default)]
struct MemoryTier {
    map: HashMap<PathBuf, CacheEntry>,
    order: VecDeque<PathBuf>,
}

impl MemoryTier {
    fn get(&self, path: &Path, hash: u64) -> Option<Arc<FileAnalysis>> {
        self.map
            .get(path)
            .filter(|entry| entry.content_hash == hash)
            .map(|entry| Arc::clone(&entry.analysis))
    }

    /// Insert an entry, returning the number of entries evicted to stay
    /// within `capacity`. Re-inserting an existing path counts as a fresh
    /// insertion for eviction ordering.
    fn insert(&mut self, path: PathBuf, entry: CacheEntry, capacity: usize) -> u64 {
        if self.map.insert(path.clone(), entry).is_some() {
            self.order.retain(|p| p != &path);
        }
        self.order.push_back(path);

        let mut evicted = 0;
        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    fn remove(&mut self, path: &Path) {
        if self.map.remove(path).is_some() {
            self.order.retain(|p| p != path);
        }
    }
}

/// Two-tier cache of parser output, keyed by path and validated by hash.
pub struct AnalysisCache {
    memory: Mutex<MemoryTier>,
    capacity: usize,
    store: Arc<dyn DurableStore>,
    parser: Arc<dyn FileParser>,
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AnalysisCache {
    /// Create a cache with the default memory-tier capacity.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>, parser: Arc<dyn FileParser>) -> Self {
        Self::with_capacity(store, parser, DEFAULT_CAPACITY)
    }

    /// Create a cache with an explicit memory-tier capacity.
    #[must_use]
    pub fn with_capacity(
        store: Arc<dyn DurableStore>,
        parser: Arc<dyn FileParser>,
        capacity: usize,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::default()),
            capacity: capacity.max(1),
            store,
            parser,
            memory_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get the analysis for `path` given its current `content`.
    ///
    /// Checks the memory tier, then the durable store (hash must match),
    /// then invokes the parser and persists the result to both tiers.
    ///
    /// # Errors
    ///
    /// Propagates parser failure; a failed parse is never stored. Durable
    /// store read/write failures are logged and treated as misses.
    pub async fn get_or_compute(&self, path: &Path, content: &str) -> Result<Arc<FileAnalysis>> {
        let hash = content_hash(content);

        if let Some(analysis) = self.lock_memory().get(path, hash) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(analysis);
        }

        match self.store.load_analysis(path).await {
            Ok(Some(record)) if record.content_hash == hash => {
                self.durable_hits.fetch_add(1, Ordering::Relaxed);
                let analysis = Arc::new(record.analysis);
                self.insert_memory(path, Arc::clone(&analysis), hash);
                return Ok(analysis);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "durable load failed, treating as miss");
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let analysis = Arc::new(self.parser.parse(path, content).await?);
        self.insert_memory(path, Arc::clone(&analysis), hash);

        let record = StoredAnalysis {
            analysis: (*analysis).clone(),
            content_hash: hash,
        };
        if let Err(e) = self.store.save_analysis(path, &record).await {
            tracing::warn!(path = %path.display(), error = %e, "durable save failed, memory tier only");
        }

        Ok(analysis)
    }

    /// Whether `content` differs from what the cached analysis was computed
    /// from. True for unknown paths. Never invokes the parser.
    pub async fn needs_reanalysis(&self, path: &Path, content: &str) -> bool {
        let hash = content_hash(content);

        if self.lock_memory().get(path, hash).is_some() {
            return false;
        }
        match self.store.load_analysis(path).await {
            Ok(Some(record)) => record.content_hash != hash,
            _ => true,
        }
    }

    /// Fetch from the memory tier without content validation or parsing.
    ///
    /// The returned analysis may be stale relative to unsaved edits; use
    /// [`Self::get_or_compute`] when current content is available.
    #[must_use]
    pub fn get_cached(&self, path: &Path) -> Option<Arc<FileAnalysis>> {
        self.lock_memory()
            .map
            .get(path)
            .map(|entry| Arc::clone(&entry.analysis))
    }

    /// Drop `path` from both tiers.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable delete fails; the memory tier is
    /// cleared regardless.
    pub async fn invalidate(&self, path: &Path) -> Result<()> {
        self.lock_memory().remove(path);
        self.store.delete_analysis(path).await
    }

    /// Snapshot of the diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn insert_memory(&self, path: &Path, analysis: Arc<FileAnalysis>, hash: u64) {
        let evicted = self.lock_memory().insert(
            path.to_path_buf(),
            CacheEntry {
                analysis,
                content_hash: hash,
            },
            self.capacity,
        );
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        // The tier mutex is never held across an await point, so the only
        // poisoning source is a panic mid-insert; recover the data.
        self.memory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::HeuristicParser;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn cache_with_capacity(capacity: usize) -> AnalysisCache {
        AnalysisCache::with_capacity(
            Arc::new(MemoryStore::new()),
            Arc::new(HeuristicParser::new()),
            capacity,
        )
    }

    /// Parser that counts invocations, for verifying cache behavior.
    struct CountingParser {
        calls: AtomicUsize,
    }

    impl CountingParser {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FileParser for CountingParser {
        async fn parse(&self, path: &Path, _content: &str) -> Result<FileAnalysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FileAnalysis::empty(path.to_path_buf()))
        }
    }

    /// Parser that always fails.
    struct BrokenParser;

    #[async_trait]
    impl FileParser for BrokenParser {
        async fn parse(&self, _path: &Path, _content: &str) -> Result<FileAnalysis> {
            Err(crate::error::Error::Parse("simulated".to_string()))
        }
    }

    #[tokio::test]
    async fn repeat_lookup_with_same_content_parses_once() {
        let parser = Arc::new(CountingParser::new());
        let cache = AnalysisCache::new(Arc::new(MemoryStore::new()), Arc::clone(&parser) as _);

        let path = Path::new("src/a.ts");
        cache.get_or_compute(path, "const x = 1;").await.unwrap();
        cache.get_or_compute(path, "const x = 1;").await.unwrap();
        cache.get_or_compute(path, "const x = 1;").await.unwrap();

        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.memory_hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn changed_content_forces_reparse() {
        let parser = Arc::new(CountingParser::new());
        let cache = AnalysisCache::new(Arc::new(MemoryStore::new()), Arc::clone(&parser) as _);

        let path = Path::new("src/a.ts");
        cache.get_or_compute(path, "const x = 1;").await.unwrap();
        cache.get_or_compute(path, "const x = 2;").await.unwrap();

        assert_eq!(parser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn durable_tier_survives_memory_eviction() {
        let store = Arc::new(MemoryStore::new());
        let parser = Arc::new(CountingParser::new());
        let cache =
            AnalysisCache::with_capacity(Arc::clone(&store) as _, Arc::clone(&parser) as _, 1);

        cache.get_or_compute(Path::new("a.ts"), "a").await.unwrap();
        // Evicts a.ts from memory.
        cache.get_or_compute(Path::new("b.ts"), "b").await.unwrap();
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.get_cached(Path::new("a.ts")).is_none());

        // Still served from the durable tier, no reparse.
        cache.get_or_compute(Path::new("a.ts"), "a").await.unwrap();
        assert_eq!(parser.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().durable_hits, 1);
    }

    #[tokio::test]
    async fn parser_failure_propagates_and_is_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let cache = AnalysisCache::new(Arc::clone(&store) as _, Arc::new(BrokenParser));

        let result = cache.get_or_compute(Path::new("a.ts"), "x").await;
        assert!(result.is_err());
        assert!(cache.get_cached(Path::new("a.ts")).is_none());
        assert_eq!(store.analysis_count().await, 0);
    }

    #[tokio::test]
    async fn needs_reanalysis_tracks_content_hash() {
        let cache = cache_with_capacity(DEFAULT_CAPACITY);
        let path = Path::new("src/a.ts");

        assert!(cache.needs_reanalysis(path, "v1").await);
        cache.get_or_compute(path, "v1").await.unwrap();
        assert!(!cache.needs_reanalysis(path, "v1").await);
        assert!(cache.needs_reanalysis(path, "v2").await);
    }

    #[tokio::test]
    async fn invalidate_clears_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let cache = AnalysisCache::new(Arc::clone(&store) as _, Arc::new(HeuristicParser::new()));
        let path = Path::new("src/a.ts");

        cache.get_or_compute(path, "const x = 1;").await.unwrap();
        cache.invalidate(path).await.unwrap();

        assert!(cache.get_cached(path).is_none());
        assert_eq!(store.analysis_count().await, 0);
        assert!(cache.needs_reanalysis(path, "const x = 1;").await);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
