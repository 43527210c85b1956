//! Error types for the sync engine.

use thiserror::Error;

/// Errors that abort a sync session. A transport or store failure ends
/// the current session cleanly; the node itself keeps running and the
/// next beacon retries.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure talking to the peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with something other than the expected shape.
    #[error("invalid peer response: {0}")]
    InvalidResponse(String),

    /// Backing-store failure (includes validation failures on ingest).
    #[error(transparent)]
    Store(#[from] axon_store::StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
