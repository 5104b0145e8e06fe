//! Centralized error types for emlshelf.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the emlshelf library.
#[derive(Error, Debug)]
pub enum ShelfError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configured emails root does not exist or is not a directory.
    #[error("Emails directory not found: {0}")]
    RootNotFound(PathBuf),

    /// Walking the emails root failed before any work started.
    #[error("Failed to enumerate '{path}': {reason}")]
    Enumeration { path: PathBuf, reason: String },

    /// A stored relative path would resolve outside the emails root.
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    /// Following `In-Reply-To` links came back to an already visited message.
    #[error("Circular reference detected at message '{message_id}'")]
    CircularReference { message_id: String },

    /// The message file could not be parsed.
    #[error("Failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// A SQLite statement or transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON encoding of a stored column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An indexing thread could not be started.
    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// A record referenced by id does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

/// Convenience alias for `Result<T, ShelfError>`.
pub type Result<T> = std::result::Result<T, ShelfError>;

impl ShelfError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Parse` variant for a root-relative message path.
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the traversal rejection, so callers can treat it as a hard failure.
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::PathTraversal(_))
    }
}
