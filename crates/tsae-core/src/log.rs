//! Operation log: operations not yet known to every replica.
//!
//! The log is partitioned by origin. Within a partition, operations are kept
//! in sequence order and are contiguous: the first retained operation follows
//! the partition's floor (the highest purged sequence number) and each next
//! one follows its predecessor. Operations leave the log only through
//! [`OperationLog::purge_log`], once the acknowledgement matrix shows that
//! every replica has seen them.

use std::collections::{BTreeMap, VecDeque};

use crate::clock::ClockVector;
use crate::error::{CoreError, Result};
use crate::matrix::ClockMatrix;
use crate::operation::Operation;
use crate::types::ReplicaId;

/// Result of adding an operation to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// The operation extended its partition.
    Inserted,
    /// The operation (or a purged one with the same timestamp) was already seen.
    Duplicate,
    /// The operation does not follow the partition's last sequence number.
    Gap {
        /// The sequence number the partition would accept next.
        expected: u64,
    },
}

impl AddResult {
    /// Whether the operation was stored.
    pub fn is_inserted(self) -> bool {
        matches!(self, AddResult::Inserted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Partition {
    ops: VecDeque<Operation>,
    /// Highest sequence number purged from this partition.
    floor: u64,
}

impl Partition {
    fn last_seq(&self) -> u64 {
        self.ops.back().map(Operation::seq).unwrap_or(self.floor)
    }
}

/// Per-origin ordered store of not-yet-stable operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog {
    partitions: BTreeMap<ReplicaId, Partition>,
}

impl OperationLog {
    /// Create an empty log with one partition per participant.
    pub fn new(participants: &[ReplicaId]) -> Self {
        Self {
            partitions: participants
                .iter()
                .map(|id| (id.clone(), Partition::default()))
                .collect(),
        }
    }

    /// Add an operation.
    ///
    /// Idempotent: re-adding an operation that was already stored, or already
    /// purged, returns [`AddResult::Duplicate`] and leaves the log unchanged.
    pub fn add(&mut self, op: Operation) -> Result<AddResult> {
        if op.seq() == 0 {
            return Err(CoreError::InvalidSequence {
                origin: op.origin().clone(),
                seq: 0,
            });
        }
        let partition = self
            .partitions
            .get_mut(op.origin())
            .ok_or_else(|| CoreError::UnknownParticipant(op.origin().clone()))?;

        let last = partition.last_seq();
        if op.seq() <= last {
            return Ok(AddResult::Duplicate);
        }
        if op.seq() != last + 1 {
            return Ok(AddResult::Gap { expected: last + 1 });
        }
        partition.ops.push_back(op);
        Ok(AddResult::Inserted)
    }

    /// Every operation not covered by `summary`, increasing per origin.
    ///
    /// These are exactly the operations a peer reporting `summary` lacks.
    pub fn list_newer(&self, summary: &ClockVector) -> Vec<Operation> {
        let mut newer = Vec::new();
        for (origin, partition) in &self.partitions {
            let seen = summary.get(origin).unwrap_or(0);
            let start = partition.ops.partition_point(|op| op.seq() <= seen);
            newer.extend(partition.ops.range(start..).cloned());
        }
        newer
    }

    /// Remove every operation that all replicas have acknowledged according
    /// to `ack`. Returns the number of operations removed.
    pub fn purge_log(&mut self, ack: &ClockMatrix) -> usize {
        let known_by_all = ack.min_timestamp_vector();
        let mut purged = 0;
        for (origin, partition) in self.partitions.iter_mut() {
            let bound = known_by_all.get(origin).unwrap_or(0);
            while partition.ops.front().is_some_and(|op| op.seq() <= bound) {
                if let Some(op) = partition.ops.pop_front() {
                    partition.floor = op.seq();
                    purged += 1;
                }
            }
        }
        purged
    }

    /// Highest sequence number stored or purged for `origin`.
    pub fn last_seq(&self, origin: &ReplicaId) -> Option<u64> {
        self.partitions.get(origin).map(Partition::last_seq)
    }

    /// Highest purged sequence number for `origin`.
    pub fn floor(&self, origin: &ReplicaId) -> Option<u64> {
        self.partitions.get(origin).map(|p| p.floor)
    }

    /// Whether an operation with this origin and sequence number is retained.
    pub fn contains(&self, origin: &ReplicaId, seq: u64) -> bool {
        self.partitions
            .get(origin)
            .is_some_and(|p| p.ops.iter().any(|op| op.seq() == seq))
    }

    /// Iterate over retained operations, partition by partition.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.partitions.values().flat_map(|p| p.ops.iter())
    }

    /// Number of retained operations.
    pub fn len(&self) -> usize {
        self.partitions.values().map(|p| p.ops.len()).sum()
    }

    /// Whether no operation is retained.
    pub fn is_empty(&self) -> bool {
        self.partitions.values().all(|p| p.ops.is_empty())
    }
}
