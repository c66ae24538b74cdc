//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur while reading or mutating replica state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Clock or log invariant violated.
    #[error("core error: {0}")]
    Core(#[from] tsae_core::CoreError),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A thread panicked while holding the replica lock.
    #[error("replica lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
