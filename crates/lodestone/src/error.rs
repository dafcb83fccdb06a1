//! Error types for engine operations.
//!
//! Errors are categorized into two main types:
//!
//! - **`Error`**: Top-level errors that halt an operation (storage failures,
//!   parser infrastructure failures)
//! - **`AnalysisError`**: File-level errors that are reported via events but
//!   never halt the background queue
//!
//! ## Error Philosophy
//!
//! The engine follows a "best effort" approach:
//! - A single malformed file never prevents analyzing the rest
//! - Query paths (index lookups, ranking, impact) are total: they return
//!   empty results for unknown input rather than erroring
//! - Only infrastructure failures (storage, I/O) propagate to the caller

use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for engine operations.
///
/// These errors represent infrastructure failures that prevent the
/// operation from completing.
#[derive(Debug, Error)]
pub enum Error {
    /// Durable store operation failed
    #[error("storage error: {0}")]
    Storage(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parser collaborator failed on a file it claims to support
    #[error("parse error: {0}")]
    Parse(String),

    /// Persisted record could not be serialized or deserialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),
}

/// Error encountered while analyzing a specific file.
///
/// These errors are surfaced through `analysis-error` events but don't halt
/// the background queue. The reasoner continues with remaining tasks.
#[derive(Debug, Clone)]
pub struct AnalysisError {
    /// Path to the file that failed
    pub path: PathBuf,
    /// Category of the error
    pub kind: AnalysisErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.path.display(),
            self.message,
            self.kind
        )
    }
}

impl std::error::Error for AnalysisError {}

/// Categorization of per-file analysis errors.
///
/// Uses a 4xx/5xx style pattern:
/// - Input problems are issues with the source file (user can fix)
/// - Internal problems are issues with the engine's collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    // === Input Problems (analogous to HTTP 4xx) ===
    /// Source file could not be parsed
    ParseFailed,

    /// Analysis exceeded the per-task deadline
    Timeout,

    // === Internal Problems (analogous to HTTP 5xx) ===
    /// Could not read or persist the file's records
    IoError,

    /// Durable store operation failed for this file
    StorageError,
}

impl std::fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailed => write!(f, "parse failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::IoError => write!(f, "I/O error"),
            Self::StorageError => write!(f, "storage error"),
        }
    }
}

impl AnalysisError {
    /// Create a new analysis error.
    #[must_use]
    pub fn new(path: PathBuf, kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// Create a parse error for a file.
    #[must_use]
    pub fn parse_failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(path, AnalysisErrorKind::ParseFailed, message)
    }

    /// Create a deadline-exceeded error for a file.
    #[must_use]
    pub fn timeout(path: PathBuf, deadline: std::time::Duration) -> Self {
        Self::new(
            path,
            AnalysisErrorKind::Timeout,
            format!("analysis exceeded {deadline:?} deadline"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_error_display_includes_path_and_kind() {
        let error = AnalysisError::parse_failed(PathBuf::from("src/main.ts"), "unexpected token");

        let display = error.to_string();
        assert!(display.contains("src/main.ts"));
        assert!(display.contains("unexpected token"));
        assert!(display.contains("parse failed"));
    }

    #[test]
    fn timeout_error_carries_deadline() {
        let error = AnalysisError::timeout(
            PathBuf::from("huge.min.js"),
            std::time::Duration::from_secs(30),
        );

        assert_eq!(error.kind, AnalysisErrorKind::Timeout);
        assert!(error.message.contains("30"));
    }
}
