//! Clock vector: how many operations from each origin a replica has seen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{ReplicaId, Timestamp};

/// Per-replica logical clock.
///
/// The key set is fixed at construction to the participant list. Entries only
/// grow under [`update_max`](Self::update_max) and
/// [`update_timestamp`](Self::update_timestamp).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockVector {
    entries: BTreeMap<ReplicaId, u64>,
}

impl ClockVector {
    /// Create an all-zero vector spanning `participants`.
    pub fn new(participants: &[ReplicaId]) -> Self {
        Self {
            entries: participants.iter().map(|id| (id.clone(), 0)).collect(),
        }
    }

    /// Last sequence number seen from `origin`, if it is a participant.
    pub fn get(&self, origin: &ReplicaId) -> Option<u64> {
        self.entries.get(origin).copied()
    }

    /// Iterate over the participants in id order.
    pub fn participants(&self) -> impl Iterator<Item = &ReplicaId> {
        self.entries.keys()
    }

    /// Iterate over `(origin, seq)` entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.entries.iter().map(|(id, seq)| (id, *seq))
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vector spans no participants.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that `other` spans exactly the same participants.
    pub fn check_domain(&self, other: &ClockVector) -> Result<()> {
        if let Some(unknown) = other.participants().find(|id| !self.entries.contains_key(*id)) {
            return Err(CoreError::UnknownParticipant(unknown.clone()));
        }
        if let Some(missing) = self.participants().find(|id| !other.entries.contains_key(*id)) {
            return Err(CoreError::MissingParticipant(missing.clone()));
        }
        Ok(())
    }

    /// Elementwise maximum: `self[k] = max(self[k], other[k])`.
    ///
    /// Fails without modifying `self` if the domains differ.
    pub fn update_max(&mut self, other: &ClockVector) -> Result<()> {
        self.check_domain(other)?;
        for (id, seq) in self.entries.iter_mut() {
            if let Some(theirs) = other.entries.get(id) {
                *seq = (*seq).max(*theirs);
            }
        }
        Ok(())
    }

    /// Elementwise minimum: `self[k] = min(self[k], other[k])`.
    ///
    /// Fails without modifying `self` if the domains differ.
    pub fn merge_min(&mut self, other: &ClockVector) -> Result<()> {
        self.check_domain(other)?;
        self.fold_min(other);
        Ok(())
    }

    /// Minimum over shared keys; a key missing from `other` counts as unseen.
    pub(crate) fn fold_min(&mut self, other: &ClockVector) {
        for (id, seq) in self.entries.iter_mut() {
            *seq = (*seq).min(other.entries.get(id).copied().unwrap_or(0));
        }
    }

    /// Record that the operation at `timestamp` has been seen.
    pub fn update_timestamp(&mut self, timestamp: &Timestamp) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&timestamp.origin)
            .ok_or_else(|| CoreError::UnknownParticipant(timestamp.origin.clone()))?;
        *entry = (*entry).max(timestamp.seq);
        Ok(())
    }

    /// Whether every entry of `self` is at least the matching entry of `other`.
    pub fn dominates(&self, other: &ClockVector) -> bool {
        other
            .iter()
            .all(|(id, seq)| self.get(id).unwrap_or(0) >= seq)
    }
}

impl fmt::Display for ClockVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (id, seq) in &self.entries {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", id, seq)?;
            first = false;
        }
        Ok(())
    }
}
