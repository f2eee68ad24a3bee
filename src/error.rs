//! Error types for the RepTree CRDT implementation

use thiserror::Error;

/// Result type for RepTree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Hard structural errors the engine surfaces to callers.
///
/// Everything else (out-of-order arrivals, cycle-preventing no-ops,
/// LWW losers, duplicate op ids) is resolved silently so replication
/// stays live — see the error handling design in DESIGN.md.
#[derive(Error, Debug)]
pub enum Error {
    #[error("vertex not found: {0}")]
    VertexNotFound(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage-related errors, surfaced only by the optional persistence adapter.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
