//! Error types for the TSAE core.

use thiserror::Error;

use crate::types::ReplicaId;

/// Errors raised by clock and log operations.
///
/// Every fallible merge validates its input before touching any entry, so an
/// error always leaves the receiver unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A peer referenced a replica outside the local participant set.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ReplicaId),

    /// A peer's clock lacks an entry for a local participant.
    #[error("missing participant: {0}")]
    MissingParticipant(ReplicaId),

    /// Sequence numbers start at 1.
    #[error("invalid sequence number {seq} for origin {origin}")]
    InvalidSequence { origin: ReplicaId, seq: u64 },

    /// The local replica is not part of its own participant set.
    #[error("replica {0} is not a participant")]
    NotAParticipant(ReplicaId),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
