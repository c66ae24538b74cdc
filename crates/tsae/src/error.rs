//! Error types for the node facade.

use thiserror::Error;
use tsae_core::CoreError;
use tsae_store::StoreError;
use tsae_sync::SyncError;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Clock or log invariant violated.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Replica state error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
