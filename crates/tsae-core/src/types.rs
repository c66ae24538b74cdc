//! Strong type definitions for TSAE.
//!
//! Identifiers are newtypes so a replica id cannot be confused with any other
//! string at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::ClockVector;

/// Identifier of a replica taking part in anti-entropy.
///
/// Replica ids are opaque strings (typically `name@host:port`). They are
/// totally ordered so clock vectors iterate deterministically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Create a replica id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({})", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ReplicaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReplicaId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ReplicaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique, comparable identity of an operation: its origin replica and the
/// origin's sequence number for it.
///
/// Sequence numbers start at 1 and increase by one per operation originated
/// by the same replica. A clock vector entry of 0 means nothing was seen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// The replica that originated the operation.
    pub origin: ReplicaId,
    /// Per-origin sequence number (1-indexed).
    pub seq: u64,
}

impl Timestamp {
    /// Create a new timestamp.
    pub fn new(origin: impl Into<ReplicaId>, seq: u64) -> Self {
        Self {
            origin: origin.into(),
            seq,
        }
    }

    /// Whether this timestamp has not yet been observed by `vector`.
    ///
    /// An origin absent from the vector counts as never seen.
    pub fn is_newer_than(&self, vector: &ClockVector) -> bool {
        self.seq > vector.get(&self.origin).unwrap_or(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_id_display() {
        let id = ReplicaId::new("alpha@127.0.0.1:9000");
        assert_eq!(format!("{}", id), "alpha@127.0.0.1:9000");
        assert_eq!(format!("{:?}", id), "ReplicaId(alpha@127.0.0.1:9000)");
    }

    #[test]
    fn test_timestamp_ordering() {
        let a1 = Timestamp::new("a", 1);
        let a2 = Timestamp::new("a", 2);
        let b1 = Timestamp::new("b", 1);

        assert!(a1 < a2);
        assert!(a2 < b1);
    }

    #[test]
    fn test_timestamp_newer_than() {
        let ids = [ReplicaId::new("a"), ReplicaId::new("b")];
        let mut vector = ClockVector::new(&ids);
        vector.update_timestamp(&Timestamp::new("a", 2)).unwrap();

        assert!(!Timestamp::new("a", 1).is_newer_than(&vector));
        assert!(!Timestamp::new("a", 2).is_newer_than(&vector));
        assert!(Timestamp::new("a", 3).is_newer_than(&vector));
        assert!(Timestamp::new("b", 1).is_newer_than(&vector));
        // An origin the vector has never heard of is always newer.
        assert!(Timestamp::new("z", 1).is_newer_than(&vector));
    }
}
