//! Error types for the store.

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking task.
    #[error("connection mutex poisoned")]
    Poisoned,

    /// A blocking task failed to complete.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// A stored value could not be interpreted.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// Record validation failed during ingest.
    #[error(transparent)]
    Validation(#[from] axon_core::ValidationError),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
