//! Domain types for the code intelligence engine.
//!
//! These types represent the core domain model:
//! - **Entities**: `Symbol`, `FileAnalysis` (produced by the parser, cached)
//! - **Derived**: `SymbolDefinition`, `SymbolReference` (index entries)
//! - **Results**: `ImpactResult`, `ContextFile`, `ContextQuality` (ephemeral
//!   query output, recomputed on demand and never persisted)
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Symbol kind | Enum not String | Closed set with exhaustive matching |
//! | `FileAnalysis` | Immutable, `Arc`-shared | Replaced wholesale on change, never patched |
//! | Scores | `f64` in `[0, 1]` | Clamped at construction sites |
//! | Reasons | Enum with `as_str` | Distinct-reason counting in quality scoring |

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enums
// ============================================================================

/// Symbol kinds tracked by the engine.
///
/// These are normalized across languages; the parser collaborator maps its
/// own node types onto this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Free function
    Function,
    /// Class declaration
    Class,
    /// Interface declaration
    Interface,
    /// Type alias
    Type,
    /// Mutable binding
    Variable,
    /// Immutable binding
    Constant,
    /// Function associated with a type
    Method,
    /// Field or accessor on a type
    Property,
}

impl SymbolKind {
    /// Convert to the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Method => "method",
            Self::Property => "property",
        }
    }
}

/// Scheduling priority for background analysis tasks.
///
/// `High` tasks are inserted at the front of the queue; `Medium` and `Low`
/// are appended. Among equal priorities the queue is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Jump the queue (e.g., the file the user is actively editing)
    High,
    /// Default priority
    Medium,
    /// Opportunistic work (e.g., warm-up indexing)
    Low,
}

/// Why a file was selected into the context set.
///
/// The distinct-reason count feeds the context quality score, so each
/// selection stage uses its own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// File defines a symbol named in the query
    SymbolDefinition,
    /// File references a symbol named in the query
    SymbolReference,
    /// File currently open in the editor pane the query came from
    CurrentFile,
    /// Selected by the hybrid relevance score
    HybridRelevance,
    /// Direct dependency of the current file
    DirectDependency,
    /// Direct dependent of the current file
    DirectDependent,
    /// Edited recently
    RecentlyEdited,
    /// Open in another editor tab
    OpenInEditor,
}

impl SelectionReason {
    /// Convert to a short human-readable label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymbolDefinition => "defines queried symbol",
            Self::SymbolReference => "references queried symbol",
            Self::CurrentFile => "current file",
            Self::HybridRelevance => "relevance match",
            Self::DirectDependency => "dependency of current file",
            Self::DirectDependent => "dependent of current file",
            Self::RecentlyEdited => "recently edited",
            Self::OpenInEditor => "open in editor",
        }
    }
}

/// Categories of per-file insights derived after analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Cyclomatic-style complexity estimate above threshold
    HighComplexity,
    /// Many files depend on this one; changes are risky
    WideBlastRadius,
    /// File imports an unusually large number of modules
    ManyDependencies,
    /// File is large enough to strain context budgets
    LargeFile,
}

impl InsightKind {
    /// Convert to the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighComplexity => "high_complexity",
            Self::WideBlastRadius => "wide_blast_radius",
            Self::ManyDependencies => "many_dependencies",
            Self::LargeFile => "large_file",
        }
    }
}

// ============================================================================
// Core Entities (parser output, cached)
// ============================================================================

/// A named program element extracted from one file.
///
/// Owned by the [`FileAnalysis`] that declares it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Simple name (e.g., `calculateTotal`)
    pub name: String,
    /// What kind of symbol this is
    pub kind: SymbolKind,
    /// Line number where the symbol is declared (1-indexed)
    pub line: u32,
    /// Column number where the declaration starts (0-indexed)
    pub column: u32,
    /// Declaration signature as written in source, if available
    pub signature: Option<String>,
    /// Attached doc comment, if available
    pub documentation: Option<String>,
    /// Whether the symbol is part of the file's public surface
    pub is_exported: bool,
    /// Names of other symbols this one references (possibly cross-file)
    pub dependencies: Vec<String>,
}

/// Parser output for one file.
///
/// Immutable once created: re-analysis replaces the record wholesale, it is
/// never mutated in place. Shared as `Arc<FileAnalysis>` between the cache,
/// the graph, and query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Path of the analyzed file (unique key, relative to the project root)
    pub path: PathBuf,
    /// Symbols declared in this file
    pub symbols: Vec<Symbol>,
    /// Raw module references as written in source (`./utils`, `std::fmt`, ...)
    pub imports: Vec<String>,
    /// Names of exported symbols
    pub exports: Vec<String>,
    /// Resolved paths of files this one depends on
    pub dependencies: Vec<PathBuf>,
    /// Parser-provided hint of dependent files; the dependency graph's
    /// derived edges are authoritative
    pub dependents: Vec<PathBuf>,
    /// Branch-count complexity estimate
    pub complexity: u32,
    /// When the analyzed content was last modified
    pub last_modified: DateTime<Utc>,
}

impl FileAnalysis {
    /// Create an empty-but-valid analysis for a file.
    ///
    /// Used by parsers to fail closed on unsupported file types: the record
    /// is well-formed, carries no symbols, and participates normally in the
    /// cache and graph.
    #[must_use]
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            complexity: 0,
            last_modified: Utc::now(),
        }
    }

    /// Look up a declared symbol by name (first match).
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Iterate over exported symbols.
    pub fn exported_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_exported)
    }
}

// ============================================================================
// Derived Types (symbol index entries)
// ============================================================================

/// A symbol definition recorded in the symbol index.
///
/// Multiple definitions may share a name across files; the index keeps all
/// of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    /// Symbol name
    pub name: String,
    /// What kind of symbol this is
    pub kind: SymbolKind,
    /// File that declares the symbol
    pub file_path: PathBuf,
    /// Declaration line (1-indexed)
    pub line: u32,
    /// Declaration column (0-indexed)
    pub column: u32,
    /// Declaration signature, if the parser provided one
    pub signature: Option<String>,
    /// Whether the defining file exports the symbol
    pub is_exported: bool,
}

/// A recorded use of a symbol name, pointing back at the referencing site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReference {
    /// The referenced name
    pub name: String,
    /// File containing the reference
    pub from_file: PathBuf,
    /// Symbol whose dependency list produced the reference
    pub from_symbol: String,
    /// Line of the referencing symbol's declaration (1-indexed)
    pub line: u32,
}

/// A per-file observation derived after analysis completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// File the insight applies to
    pub path: PathBuf,
    /// Category of the observation
    pub kind: InsightKind,
    /// Human-readable message
    pub message: String,
    /// When the insight was derived
    pub detected_at: DateTime<Utc>,
}

// ============================================================================
// Query Results (ephemeral, recomputed per query)
// ============================================================================

/// Result of impact analysis for one file.
///
/// Recomputed on demand and never cached: dependents change too frequently
/// for a cached blast radius to stay honest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    /// The file being analyzed
    pub file_path: PathBuf,
    /// `direct + 0.5 * transitive`: a cheap, monotonic heuristic, not a
    /// graph centrality measure
    pub impact_score: f64,
    /// Files that depend on the target directly
    pub direct_dependents: Vec<PathBuf>,
    /// Files that reach the target through other dependents (BFS, depth <= 3)
    pub transitive_dependents: Vec<PathBuf>,
    /// Exported symbols with at least one recorded reference elsewhere
    pub affected_symbols: Vec<String>,
    /// Whether the impact score exceeds the high-risk threshold
    pub is_high_risk: bool,
    /// Whether any exported symbol is referenced from another file
    pub affects_api: bool,
}

/// A ranked snippet of source handed to the language model.
///
/// Ephemeral ranking output; not persisted, recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Source file path
    pub path: PathBuf,
    /// Content to include (possibly chunked or truncated)
    pub content: String,
    /// Relevance score in `[0, 1]`
    pub score: f64,
    /// Why the file was selected
    pub reason: SelectionReason,
    /// Names of all symbols the file declares, when known
    pub symbols: Option<Vec<String>>,
    /// Symbols that matched the query; drives symbol-preserving chunking
    pub relevant_symbols: Option<Vec<String>>,
}

/// Diagnostic quality assessment of an assembled context.
///
/// Drives user-facing suggestions only; never gates whether context is
/// returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextQuality {
    /// Score in `[0, 100]`
    pub score: f64,
    /// Human-readable suggestions ("add more files", "query too vague")
    pub suggestions: Vec<String>,
}

/// Options controlling context assembly.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Maximum number of files to return
    pub max_files: usize,
    /// Token budget for the whole context (tokens estimated as chars/4)
    pub max_tokens: usize,
    /// Include recently edited files (stage 5)
    pub include_recent: bool,
    /// Include dependency neighbors of the current file (stage 4)
    pub include_dependencies: bool,
    /// Include files open in other editor tabs (stage 5)
    pub prioritize_open: bool,
    /// Recently edited files, most recent first
    pub recent_files: Vec<PathBuf>,
    /// Files open in the editor
    pub open_files: Vec<PathBuf>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_tokens: 8_000,
            include_recent: true,
            include_dependencies: true,
            prioritize_open: true,
            recent_files: Vec::new(),
            open_files: Vec::new(),
        }
    }
}

/// A file offered to the context builder as ranking input.
///
/// The builder never reads the filesystem; the host supplies content (and
/// optionally an embedding vector) for every candidate.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Source file path
    pub path: PathBuf,
    /// Full file content
    pub content: String,
    /// Embedding vector for the content, if the host computed one
    pub embedding: Option<Vec<f32>>,
}

impl CandidateFile {
    /// Create a candidate without an embedding.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            embedding: None,
        }
    }

    /// Attach an embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
