//! Operation: an immutable, timestamped update.
//!
//! The payload is opaque to the anti-entropy machinery; only the application
//! state behind the replica interprets it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{ReplicaId, Timestamp};

/// An update originated by one replica and propagated to all others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Identity of the operation: origin and per-origin sequence number.
    pub timestamp: Timestamp,
    /// Application-defined mutation.
    pub payload: Bytes,
}

impl Operation {
    /// Create a new operation.
    pub fn new(timestamp: Timestamp, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
        }
    }

    /// The replica that originated this operation.
    pub fn origin(&self) -> &ReplicaId {
        &self.timestamp.origin
    }

    /// The origin's sequence number for this operation.
    pub fn seq(&self) -> u64 {
        self.timestamp.seq
    }
}
