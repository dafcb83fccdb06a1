//! Background analysis queue.
//!
//! A single worker task drains a priority queue of file-analysis requests,
//! keeping the cache, graph, and index warm without blocking the editor.
//! Serial execution is deliberate: one writer means cache and index writes
//! never race.
//!
//! # Scheduling
//!
//! - `High` tasks are inserted ahead of the rest; `Medium`/`Low` append.
//!   Within equal priority the queue is FIFO.
//! - Re-queuing a path with a pending task **coalesces**: content and
//!   priority are updated in place, no duplicate task is created, and the
//!   debounce clock restarts. A task runs only after the debounce window
//!   (default 1.5 s) has been quiet for its path, so rapid edits collapse
//!   to one analysis.
//! - Every request bumps the path's generation counter. A result whose
//!   generation is no longer current is discarded on arrival, so a slow
//!   in-flight analysis can never overwrite a newer one (last-write-wins
//!   by generation, not arrival order).
//!
//! # Events
//!
//! Completion and failure are published on a broadcast channel. A failing
//! file emits `AnalysisError` and the queue moves on; a single file's
//! failure is never fatal to the queue.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::Instant;

use crate::cache::AnalysisCache;
use crate::error::{AnalysisError, AnalysisErrorKind, Error};
use crate::graph::DependencyGraph;
use crate::index::SymbolIndex;
use crate::storage::DurableStore;
use crate::types::{FileAnalysis, Insight, InsightKind, Priority};

/// Default quiet window before a queued path is analyzed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1_500);

/// Default per-task deadline; a task past it emits a timeout error and the
/// queue continues.
pub const DEFAULT_TASK_DEADLINE: Duration = Duration::from_secs(30);

const EVENT_CHANNEL_CAPACITY: usize = 64;

// Insight thresholds.
const COMPLEXITY_THRESHOLD: u32 = 20;
const BLAST_RADIUS_THRESHOLD: usize = 10;
const DEPENDENCY_COUNT_THRESHOLD: usize = 15;
const LARGE_FILE_CHARS: usize = 20_000;

/// Events published by the reasoner.
#[derive(Debug, Clone)]
pub enum ReasonerEvent {
    /// A file's analysis finished and was committed.
    AnalysisComplete {
        /// The analyzed file
        path: PathBuf,
        /// Insights derived from the fresh analysis
        insights: Vec<Insight>,
    },
    /// A file's analysis failed; the queue continues.
    AnalysisError {
        /// The failing file
        path: PathBuf,
        /// What went wrong
        error: AnalysisError,
    },
}

#[derive(Debug)]
struct PendingTask {
    content: String,
    priority: Priority,
    generation: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<PathBuf>,
    pending: HashMap<PathBuf, PendingTask>,
    generations: HashMap<PathBuf, u64>,
    last_queued: HashMap<PathBuf, Instant>,
}

struct Inner {
    cache: Arc<AnalysisCache>,
    store: Arc<dyn DurableStore>,
    graph: Arc<RwLock<DependencyGraph>>,
    index: Arc<RwLock<SymbolIndex>>,
    state: Mutex<QueueState>,
    notify: Notify,
    events: broadcast::Sender<ReasonerEvent>,
    insights: Mutex<HashMap<PathBuf, Vec<Insight>>>,
    debounce: Duration,
    task_deadline: Duration,
    shutdown: AtomicBool,
}

enum PopOutcome {
    Task(PathBuf, PendingTask),
    WaitUntil(Instant),
    Idle,
}

/// Handle to the background analysis worker.
pub struct BackgroundReasoner {
    inner: Arc<Inner>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for BackgroundReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundReasoner")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl BackgroundReasoner {
    /// Spawn the worker task. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        cache: Arc<AnalysisCache>,
        store: Arc<dyn DurableStore>,
        graph: Arc<RwLock<DependencyGraph>>,
        index: Arc<RwLock<SymbolIndex>>,
        debounce: Duration,
        task_deadline: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            cache,
            store,
            graph,
            index,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            events,
            insights: Mutex::new(HashMap::new()),
            debounce,
            task_deadline,
            shutdown: AtomicBool::new(false),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            worker_loop(worker_inner).await;
        });

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a file for analysis.
    ///
    /// Coalesces with any pending task for the same path and restarts its
    /// debounce clock. Returns the task's generation number.
    pub fn queue_analysis(
        &self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        priority: Priority,
    ) -> u64 {
        let path = path.into();
        let content = content.into();
        let generation;
        {
            let mut state = lock(&self.inner.state);
            let counter = state.generations.entry(path.clone()).or_insert(0);
            *counter += 1;
            generation = *counter;
            state.last_queued.insert(path.clone(), Instant::now());

            if let Some(existing) = state.pending.get_mut(&path) {
                existing.content = content;
                existing.generation = generation;
                let upgraded =
                    priority == Priority::High && existing.priority != Priority::High;
                if upgraded {
                    existing.priority = Priority::High;
                }
                if upgraded {
                    move_to_high_section(&mut state, &path);
                }
                tracing::debug!(path = %path.display(), generation, "task coalesced");
            } else {
                state.pending.insert(
                    path.clone(),
                    PendingTask {
                        content,
                        priority,
                        generation,
                    },
                );
                insert_queued(&mut state, path.clone(), priority);
                tracing::debug!(path = %path.display(), generation, ?priority, "task queued");
            }
        }
        self.inner.notify.notify_waiters();
        generation
    }

    /// Subscribe to completion and error events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReasonerEvent> {
        self.inner.events.subscribe()
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    /// Insights for a file: served from memory when warm, hydrated from
    /// the durable store otherwise. Never triggers re-analysis.
    pub async fn load_insights(&self, path: &Path) -> Vec<Insight> {
        if let Some(cached) = lock(&self.inner.insights).get(path).cloned() {
            return cached;
        }
        match self.inner.store.load_insights(path).await {
            Ok(insights) => {
                lock(&self.inner.insights).insert(path.to_path_buf(), insights.clone());
                insights
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "insight load failed");
                Vec::new()
            }
        }
    }

    /// Stop the worker after its current task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // State mutexes are never held across await points; recover from a
    // panic-poisoned lock rather than cascading.
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Insert a newly queued path: high priority goes after the existing high
/// block (FIFO within priority), the rest append.
fn insert_queued(state: &mut QueueState, path: PathBuf, priority: Priority) {
    if priority == Priority::High {
        let insert_at = state
            .queue
            .iter()
            .position(|p| {
                state
                    .pending
                    .get(p)
                    .is_none_or(|t| t.priority != Priority::High)
            })
            .unwrap_or(state.queue.len());
        state.queue.insert(insert_at, path);
    } else {
        state.queue.push_back(path);
    }
}

fn move_to_high_section(state: &mut QueueState, path: &Path) {
    state.queue.retain(|p| p != path);
    insert_queued(state, path.to_path_buf(), Priority::High);
}

// ============================================================================
// Worker
// ============================================================================

async fn worker_loop(inner: Arc<Inner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match pop_ready(&inner) {
            PopOutcome::Task(path, task) => process_task(&inner, path, task).await,
            PopOutcome::WaitUntil(deadline) => {
                tokio::select! {
                    () = inner.notify.notified() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            PopOutcome::Idle => inner.notify.notified().await,
        }
    }
    tracing::debug!("reasoner worker stopped");
}

/// Take the first queued task whose debounce window has elapsed.
fn pop_ready(inner: &Inner) -> PopOutcome {
    let mut state = lock(&inner.state);
    let now = Instant::now();
    let mut earliest: Option<Instant> = None;

    for i in 0..state.queue.len() {
        let path = &state.queue[i];
        let ready_at = state
            .last_queued
            .get(path)
            .map_or(now, |queued| *queued + inner.debounce);
        if ready_at <= now {
            let Some(path) = state.queue.remove(i) else {
                break;
            };
            let Some(task) = state.pending.remove(&path) else {
                continue;
            };
            return PopOutcome::Task(path, task);
        }
        earliest = Some(earliest.map_or(ready_at, |e| e.min(ready_at)));
    }

    match earliest {
        Some(deadline) => PopOutcome::WaitUntil(deadline),
        None => PopOutcome::Idle,
    }
}

async fn process_task(inner: &Inner, path: PathBuf, task: PendingTask) {
    tracing::debug!(path = %path.display(), generation = task.generation, "analyzing");

    let outcome =
        tokio::time::timeout(inner.task_deadline, inner.cache.get_or_compute(&path, &task.content))
            .await;

    let analysis = match outcome {
        Err(_elapsed) => {
            emit_timeout(inner, path);
            return;
        }
        Ok(Err(e)) => {
            let error = match &e {
                Error::Io(_) => {
                    AnalysisError::new(path.clone(), AnalysisErrorKind::IoError, e.to_string())
                }
                Error::Storage(_) => {
                    AnalysisError::new(path.clone(), AnalysisErrorKind::StorageError, e.to_string())
                }
                _ => AnalysisError::parse_failed(path.clone(), e.to_string()),
            };
            tracing::warn!(path = %path.display(), error = %error, "analysis failed");
            let _ = inner.events.send(ReasonerEvent::AnalysisError { path, error });
            return;
        }
        Ok(Ok(analysis)) => analysis,
    };

    // Last-write-wins: discard if a newer task for the path was queued
    // while this one ran.
    let current_generation = lock(&inner.state)
        .generations
        .get(&path)
        .copied()
        .unwrap_or(0);
    if current_generation != task.generation {
        tracing::debug!(
            path = %path.display(),
            stale_generation = task.generation,
            current_generation,
            "stale analysis discarded"
        );
        return;
    }

    commit_analysis(inner, path, &task.content, analysis).await;
}

/// Commit through the single writer path: update the graph, rebuild the
/// index, derive and persist insights, then publish.
async fn commit_analysis(
    inner: &Inner,
    path: PathBuf,
    content: &str,
    analysis: Arc<FileAnalysis>,
) {
    let (insights, snapshot) = {
        let mut graph = inner.graph.write().await;
        graph.upsert(Arc::clone(&analysis));
        let index = SymbolIndex::build(&graph);

        let dependent_count = graph.dependents_of(&path).len();
        let insights = derive_insights(&analysis, dependent_count, content.chars().count());

        let snapshot = index.snapshot();
        *inner.index.write().await = index;
        (insights, snapshot)
    };

    lock(&inner.insights).insert(path.clone(), insights.clone());
    if let Err(e) = inner.store.save_insights(&path, &insights).await {
        tracing::warn!(path = %path.display(), error = %e, "insight save failed");
    }
    if let Err(e) = inner.store.save_index_snapshot(&snapshot).await {
        tracing::warn!(error = %e, "index snapshot save failed");
    }

    tracing::debug!(
        path = %path.display(),
        insight_count = insights.len(),
        "analysis committed"
    );
    let _ = inner
        .events
        .send(ReasonerEvent::AnalysisComplete { path, insights });
}

fn emit_timeout(inner: &Inner, path: PathBuf) {
    let error = AnalysisError::timeout(path.clone(), inner.task_deadline);
    tracing::warn!(path = %path.display(), error = %error, "analysis timed out");
    let _ = inner.events.send(ReasonerEvent::AnalysisError { path, error });
}

/// Derive per-file insights from a fresh analysis.
fn derive_insights(
    analysis: &FileAnalysis,
    dependent_count: usize,
    content_chars: usize,
) -> Vec<Insight> {
    let now = chrono::Utc::now();
    let mut insights = Vec::new();

    if analysis.complexity > COMPLEXITY_THRESHOLD {
        insights.push(Insight {
            path: analysis.path.clone(),
            kind: InsightKind::HighComplexity,
            message: format!(
                "complexity estimate {} exceeds {COMPLEXITY_THRESHOLD}",
                analysis.complexity
            ),
            detected_at: now,
        });
    }
    if dependent_count > BLAST_RADIUS_THRESHOLD {
        insights.push(Insight {
            path: analysis.path.clone(),
            kind: InsightKind::WideBlastRadius,
            message: format!("{dependent_count} files depend on this one; changes are high risk"),
            detected_at: now,
        });
    }
    if analysis.imports.len() > DEPENDENCY_COUNT_THRESHOLD {
        insights.push(Insight {
            path: analysis.path.clone(),
            kind: InsightKind::ManyDependencies,
            message: format!("imports {} modules", analysis.imports.len()),
            detected_at: now,
        });
    }
    if content_chars > LARGE_FILE_CHARS {
        insights.push(Insight {
            path: analysis.path.clone(),
            kind: InsightKind::LargeFile,
            message: format!("{content_chars} characters; consider splitting"),
            detected_at: now,
        });
    }

    insights
}
