//! Error types for the sync module.

use thiserror::Error;

use otgraph_core::CommitId;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] otgraph_store::StoreError),

    /// An incoming commit stream or signed record failed validation.
    #[error("validation error: {0}")]
    ValidationError(#[from] otgraph_core::ValidationError),

    /// A commit reachable from local heads is not stored.
    #[error("commit {0} is reachable but not stored")]
    MissingCommit(CommitId),

    /// A peer sent a message that breaks the protocol contract.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A transfer exceeded the configured commit limit.
    #[error("transfer exceeds {limit} commits")]
    TransferTooLarge { limit: usize },

    /// The peer could not be reached.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
