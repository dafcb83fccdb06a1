//! JSON Lines storage backend.
//!
//! Persists engine records as JSONL files inside a store directory:
//!
//! - `analyses.jsonl`: one [`StoredAnalysis`] per line
//! - `insights.jsonl`: one [`Insight`] per line
//! - `index.jsonl`: a single [`IndexSnapshot`] line
//!
//! # Atomicity
//!
//! Every write rewrites the whole file via the temp-file-then-rename
//! pattern: data goes to a `.tmp` sibling first, then an atomic rename
//! replaces the target. A crash mid-write leaves the previous file intact.
//!
//! # Resilience
//!
//! Loading is line-by-line and best effort: a corrupt line is logged at
//! warn level and skipped, so one bad record surfaces as a cache miss for
//! its file instead of poisoning the whole store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::Insight;

use super::{DurableStore, IndexSnapshot, StoredAnalysis};

const ANALYSES_FILE: &str = "analyses.jsonl";
const INSIGHTS_FILE: &str = "insights.jsonl";
const INDEX_FILE: &str = "index.jsonl";

/// File-backed [`DurableStore`] using JSON Lines.
///
/// The full record set is held in memory and mirrored to disk on every
/// mutation. Suitable for project-sized record counts; the write pattern
/// trades write amplification for crash safety and trivially debuggable
/// on-disk files.
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    analyses: HashMap<PathBuf, StoredAnalysis>,
    insights: HashMap<PathBuf, Vec<Insight>>,
    snapshot: Option<IndexSnapshot>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `dir`, loading any existing
    /// records.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// store file cannot be read. Corrupt individual lines do not error;
    /// they are skipped with a warning.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let analyses: Vec<StoredAnalysis> = load_lines(&dir.join(ANALYSES_FILE)).await?;
        let insights: Vec<Insight> = load_lines(&dir.join(INSIGHTS_FILE)).await?;
        let snapshots: Vec<IndexSnapshot> = load_lines(&dir.join(INDEX_FILE)).await?;

        let mut state = State::default();
        for record in analyses {
            state
                .analyses
                .insert(record.analysis.path.clone(), record);
        }
        for insight in insights {
            state
                .insights
                .entry(insight.path.clone())
                .or_default()
                .push(insight);
        }
        state.snapshot = snapshots.into_iter().next();

        tracing::debug!(
            dir = %dir.display(),
            analyses = state.analyses.len(),
            "opened jsonl store"
        );

        Ok(Self {
            dir,
            state: RwLock::new(state),
        })
    }

    /// Directory this store reads and writes.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn flush_analyses(&self, state: &State) -> Result<()> {
        let mut records: Vec<&StoredAnalysis> = state.analyses.values().collect();
        records.sort_by(|a, b| a.analysis.path.cmp(&b.analysis.path));
        write_lines_atomic(&self.dir.join(ANALYSES_FILE), &records).await
    }

    async fn flush_insights(&self, state: &State) -> Result<()> {
        let mut paths: Vec<&PathBuf> = state.insights.keys().collect();
        paths.sort();
        let records: Vec<&Insight> = paths
            .into_iter()
            .filter_map(|p| state.insights.get(p))
            .flatten()
            .collect();
        write_lines_atomic(&self.dir.join(INSIGHTS_FILE), &records).await
    }
}

#[async_trait]
impl DurableStore for JsonlStore {
    async fn save_analysis(&self, path: &Path, record: &StoredAnalysis) -> Result<()> {
        let mut state = self.state.write().await;
        state.analyses.insert(path.to_path_buf(), record.clone());
        self.flush_analyses(&state).await
    }

    async fn load_analysis(&self, path: &Path) -> Result<Option<StoredAnalysis>> {
        Ok(self.state.read().await.analyses.get(path).cloned())
    }

    async fn delete_analysis(&self, path: &Path) -> Result<()> {
        let mut state = self.state.write().await;
        if state.analyses.remove(path).is_some() {
            self.flush_analyses(&state).await?;
        }
        if state.insights.remove(path).is_some() {
            self.flush_insights(&state).await?;
        }
        Ok(())
    }

    async fn save_insights(&self, path: &Path, insights: &[Insight]) -> Result<()> {
        let mut state = self.state.write().await;
        state.insights.insert(path.to_path_buf(), insights.to_vec());
        self.flush_insights(&state).await
    }

    async fn load_insights(&self, path: &Path) -> Result<Vec<Insight>> {
        Ok(self
            .state
            .read()
            .await
            .insights
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_index_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let mut state = self.state.write().await;
        state.snapshot = Some(snapshot.clone());
        write_lines_atomic(&self.dir.join(INDEX_FILE), &[snapshot]).await
    }

    async fn load_index_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        Ok(self.state.read().await.snapshot.clone())
    }
}

/// Load every parseable line of a JSONL file.
///
/// A missing file yields an empty vec. Corrupt lines are skipped with a
/// warning so one bad record cannot poison the store.
async fn load_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    file = %path.display(),
                    line = line_number + 1,
                    error = %e,
                    "skipping corrupt record"
                );
            }
        }
    }
    Ok(records)
}

/// Atomically rewrite a JSONL file: write to a `.tmp` sibling, then rename.
///
/// On POSIX, renames within a filesystem are atomic, so a crash mid-write
/// leaves the previous file intact.
async fn write_lines_atomic<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    let mut buf = String::new();
    for value in values {
        buf.push_str(&serde_json::to_string(value)?);
        buf.push('\n');
    }

    let temp_path = make_temp_path(path);
    if let Err(e) = tokio::fs::write(&temp_path, buf.as_bytes()).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}
