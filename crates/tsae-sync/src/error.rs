//! Error types for the sync module.

use thiserror::Error;

use crate::messages::MsgType;

/// Errors that abort a TSAE session.
///
/// None of them leaves a partial merge behind: replica state is only touched
/// by the commit step, which runs after every I/O step has succeeded.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error (refused, reset, peer gone).
    #[error("transport error: {0}")]
    TransportError(String),

    /// I/O failure on a stream transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection mid-session.
    #[error("connection closed by peer")]
    Closed,

    /// A frame could not be decoded into a message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame exceeded the size limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The peer sent a message out of protocol order.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: MsgType },

    /// The peer sent a message belonging to another session.
    #[error("session mismatch: expected {expected}, got {got}")]
    SessionMismatch { expected: u64, got: u64 },

    /// Replica state rejected the peer's data or could not be read.
    #[error("store error: {0}")]
    StoreError(#[from] tsae_store::StoreError),

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl SyncError {
    /// Whether this is a malformed-message error (subject to
    /// [`DecodePolicy`](crate::protocol::DecodePolicy)).
    pub fn is_decode(&self) -> bool {
        matches!(self, SyncError::Decode(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
