//! Lodestone: a code intelligence engine for AI coding assistants.
//!
//! Lodestone keeps a live model of a project (parsed file analyses, a
//! dependency graph, and a symbol index) and answers the questions an
//! assistant asks while editing: *what context does this query need*,
//! *what breaks if this file changes*, *where is this symbol defined*.
//!
//! # Architecture
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Analysis cache | [`cache`] | Two-tier (memory + durable), hash-validated |
//! | Dependency graph | [`graph`] | File-level edges, cycle detection, BFS depth |
//! | Symbol index | [`index`] | Definitions, references, exports by name |
//! | Impact analyzer | [`impact`] | Blast radius of a change |
//! | Context builder | [`context`] | Staged selection, hybrid ranking, token budget |
//! | Background reasoner | [`reasoner`] | Debounced priority queue, event fan-out |
//! | Session | [`session`] | Facade wiring the above together |
//!
//! The parser and embedder are pluggable collaborators ([`parser::FileParser`],
//! [`embed::Embedder`]); a heuristic line-based parser ships with the crate.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use lodestone::parser::HeuristicParser;
//! use lodestone::session::{ProjectSession, SessionConfig};
//! use lodestone::storage::JsonlStore;
//!
//! # async fn example() -> lodestone::error::Result<()> {
//! let store = Arc::new(JsonlStore::open(".lodestone").await?);
//! let session = ProjectSession::open(
//!     store,
//!     Arc::new(HeuristicParser::new()),
//!     SessionConfig::default(),
//! )
//! .await?;
//!
//! session
//!     .analyze_file(Path::new("src/billing.ts"), "export function total() {}")
//!     .await?;
//! let impact = session.impact_of(Path::new("src/billing.ts")).await;
//! println!("{} dependents", impact.direct_dependents.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunk;
pub mod context;
pub mod embed;
pub mod error;
pub mod graph;
pub mod impact;
pub mod index;
pub mod parser;
pub mod query;
pub mod reasoner;
pub mod session;
pub mod storage;
pub mod types;

pub use cache::AnalysisCache;
pub use context::ContextBuilder;
pub use error::{AnalysisError, Error, Result};
pub use graph::DependencyGraph;
pub use impact::ImpactAnalyzer;
pub use index::SymbolIndex;
pub use reasoner::{BackgroundReasoner, ReasonerEvent};
pub use session::{ProjectSession, SessionConfig};
pub use types::{
    CandidateFile, ContextFile, ContextOptions, ContextQuality, FileAnalysis, ImpactResult,
    Insight, InsightKind, Priority, Symbol, SymbolKind,
};
