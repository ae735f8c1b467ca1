//! Error types for node operations.

use otgraph_core::{RepoId, ValidationError};
use otgraph_store::StoreError;
use otgraph_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Discovery knows no master for the repository's namespace.
    #[error("no master known for {0}")]
    NoMaster(RepoId),

    /// The node is shutting down.
    #[error("node is shut down")]
    Shutdown,
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
