//! In-memory application state.
//!
//! Records every applied operation keyed by its timestamp. Useful for tests
//! and for checking that replicas converge on the same applied set.

use std::collections::BTreeMap;

use bytes::Bytes;
use tsae_core::{Operation, Timestamp};

use crate::error::Result;
use crate::traits::Applier;

/// Applier that keeps applied operations in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplier {
    applied: BTreeMap<Timestamp, Bytes>,
    /// Applications of an operation that was already present.
    repeats: usize,
}

impl MemoryApplier {
    /// Create empty application state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct operations applied.
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Whether nothing has been applied yet.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Whether the operation with this timestamp has been applied.
    pub fn contains(&self, timestamp: &Timestamp) -> bool {
        self.applied.contains_key(timestamp)
    }

    /// Payload of the applied operation with this timestamp.
    pub fn get(&self, timestamp: &Timestamp) -> Option<&Bytes> {
        self.applied.get(timestamp)
    }

    /// Timestamps of all applied operations, in timestamp order.
    pub fn timestamps(&self) -> impl Iterator<Item = &Timestamp> {
        self.applied.keys()
    }

    /// How many times an already-applied operation was handed over again.
    pub fn repeats(&self) -> usize {
        self.repeats
    }
}

impl Applier for MemoryApplier {
    fn apply(&mut self, ops: &[Operation]) -> Result<()> {
        for op in ops {
            if self.applied.contains_key(&op.timestamp) {
                self.repeats += 1;
                continue;
            }
            self.applied.insert(op.timestamp.clone(), op.payload.clone());
        }
        Ok(())
    }
}
