//! Frame index error types
//!
//! Defines all errors that can occur while building, opening, or
//! querying an index store.
//!
//! Two families of "nothing there" outcomes are deliberately *not*
//! errors: exact-match row lookups return a `(-1, -1)` sentinel, and
//! interval/metadata lookups over an empty result set return
//! `None`/empty. Callers distinguish "no value" from "error"
//! structurally.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the frame index
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No chunk metadata file exists in any supported format
    #[error("could not find chunk index at {} (tried .bin and .json)", .0.display())]
    ChunkIndexNotFound(PathBuf),

    /// Stored index format version disagrees with this build
    #[error("incorrect index version: {found} vs {expected}")]
    VersionMismatch {
        found: String,
        expected: &'static str,
    },

    /// Per-frame metadata for a chunk is malformed (builder-internal:
    /// logged and the chunk skipped, never surfaced from a build)
    #[error("corrupt chunk {chunk}: {reason}")]
    CorruptChunk { chunk: i64, reason: String },

    /// Caller supplied an invalid argument combination
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is undefined on a store with zero frames
    #[error("store contains no frames")]
    EmptyStore,

    /// Index construction could not complete
    #[error("build error: {0}")]
    Build(String),
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
