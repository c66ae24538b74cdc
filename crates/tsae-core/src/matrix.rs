//! Clock matrix: a replica's belief about every replica's clock vector.
//!
//! Row `r` is the latest clock vector of replica `r` that this replica has
//! heard about. The column-wise minimum is what every replica is known to have
//! seen, which is what drives log garbage collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::clock::ClockVector;
use crate::error::{CoreError, Result};
use crate::types::ReplicaId;

/// One [`ClockVector`] row per participant, every row spanning all participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockMatrix {
    rows: BTreeMap<ReplicaId, ClockVector>,
}

impl ClockMatrix {
    /// Create an all-zero matrix over `participants`.
    pub fn new(participants: &[ReplicaId]) -> Self {
        Self {
            rows: participants
                .iter()
                .map(|id| (id.clone(), ClockVector::new(participants)))
                .collect(),
        }
    }

    /// The row for `node`.
    pub fn get(&self, node: &ReplicaId) -> Option<&ClockVector> {
        self.rows.get(node)
    }

    /// Iterate over the participants (row keys) in id order.
    pub fn participants(&self) -> impl Iterator<Item = &ReplicaId> {
        self.rows.keys()
    }

    /// Iterate over `(node, row)` pairs in id order.
    pub fn rows(&self) -> impl Iterator<Item = (&ReplicaId, &ClockVector)> {
        self.rows.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that `other` has the same rows, each spanning the same participants.
    pub fn check_domain(&self, other: &ClockMatrix) -> Result<()> {
        if let Some(unknown) = other.participants().find(|id| !self.rows.contains_key(*id)) {
            return Err(CoreError::UnknownParticipant(unknown.clone()));
        }
        for (node, row) in &self.rows {
            let theirs = other
                .rows
                .get(node)
                .ok_or_else(|| CoreError::MissingParticipant(node.clone()))?;
            row.check_domain(theirs)?;
        }
        Ok(())
    }

    /// Replace the row of `node` wholesale.
    ///
    /// Used to stamp the local replica's own summary into its matrix before
    /// the matrix is sent to a peer.
    pub fn update(&mut self, node: &ReplicaId, vector: ClockVector) -> Result<()> {
        let row = self
            .rows
            .get_mut(node)
            .ok_or_else(|| CoreError::UnknownParticipant(node.clone()))?;
        row.check_domain(&vector)?;
        *row = vector;
        Ok(())
    }

    /// Row-wise [`ClockVector::update_max`] against `other`.
    ///
    /// The whole matrix is validated first; on error nothing is merged.
    pub fn update_max(&mut self, other: &ClockMatrix) -> Result<()> {
        self.check_domain(other)?;
        for (node, row) in self.rows.iter_mut() {
            if let Some(theirs) = other.rows.get(node) {
                row.update_max(theirs)?;
            }
        }
        Ok(())
    }

    /// For every origin, the minimum sequence number across all rows: the
    /// operations known by every participant.
    ///
    /// An empty matrix yields an empty vector.
    pub fn min_timestamp_vector(&self) -> ClockVector {
        let mut rows = self.rows.values();
        let Some(first) = rows.next() else {
            return ClockVector::default();
        };
        let mut min = first.clone();
        for row in rows {
            min.fold_min(row);
        }
        min
    }
}

impl fmt::Display for ClockMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, row) in &self.rows {
            writeln!(f, "{}:   {}", node, row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use proptest::prelude::*;

    fn ids() -> Vec<ReplicaId> {
        vec![ReplicaId::new("a"), ReplicaId::new("b"), ReplicaId::new("c")]
    }

    fn row(seqs: [u64; 3]) -> ClockVector {
        let mut v = ClockVector::new(&ids());
        for (id, seq) in ids().into_iter().zip(seqs) {
            v.update_timestamp(&Timestamp::new(id, seq)).unwrap();
        }
        v
    }

    fn matrix(rows: [[u64; 3]; 3]) -> ClockMatrix {
        let mut m = ClockMatrix::new(&ids());
        for (id, seqs) in ids().iter().zip(rows) {
            m.update(id, row(seqs)).unwrap();
        }
        m
    }

    #[test]
    fn test_min_timestamp_vector() {
        let m = matrix([[3, 1, 4], [2, 5, 4], [9, 2, 0]]);
        assert_eq!(m.min_timestamp_vector(), row([2, 1, 0]));
    }

    #[test]
    fn test_min_timestamp_vector_empty() {
        let m = ClockMatrix::new(&[]);
        assert!(m.min_timestamp_vector().is_empty());
    }

    #[test]
    fn test_update_replaces_row() {
        let mut m = matrix([[3, 3, 3], [1, 1, 1], [0, 0, 0]]);
        m.update(&ReplicaId::new("a"), row([1, 0, 0])).unwrap();
        assert_eq!(m.get(&ReplicaId::new("a")), Some(&row([1, 0, 0])));
    }

    #[test]
    fn test_update_unknown_node() {
        let mut m = ClockMatrix::new(&ids());
        let err = m.update(&ReplicaId::new("zz"), row([0, 0, 0])).unwrap_err();
        assert_eq!(err, CoreError::UnknownParticipant(ReplicaId::new("zz")));
    }

    #[test]
    fn test_update_max_rowwise() {
        let mut m = matrix([[3, 0, 0], [0, 1, 0], [0, 0, 2]]);
        m.update_max(&matrix([[1, 1, 1], [2, 0, 0], [0, 0, 3]]))
            .unwrap();
        assert_eq!(m, matrix([[3, 1, 1], [2, 1, 0], [0, 0, 3]]));
    }

    #[test]
    fn test_update_max_rejects_foreign_matrix_without_partial_merge() {
        let mut m = matrix([[1, 1, 1], [1, 1, 1], [1, 1, 1]]);
        let before = m.clone();

        let mut other_ids = ids();
        other_ids.push(ReplicaId::new("d"));
        let foreign = ClockMatrix::new(&other_ids);

        assert!(m.update_max(&foreign).is_err());
        assert_eq!(m, before);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut m = matrix([[1, 0, 0], [0, 0, 0], [0, 0, 0]]);
        let snapshot = m.clone();
        m.update(&ReplicaId::new("b"), row([4, 4, 4])).unwrap();
        assert_ne!(m, snapshot);
        assert_eq!(snapshot.get(&ReplicaId::new("b")), Some(&row([0, 0, 0])));
    }

    fn arb_matrix() -> impl Strategy<Value = [[u64; 3]; 3]> {
        any::<[[u8; 3]; 3]>().prop_map(|m| m.map(|r| r.map(u64::from)))
    }

    proptest! {
        #[test]
        fn test_min_is_columnwise_minimum(rows in arb_matrix()) {
            let m = matrix(rows);
            let min = m.min_timestamp_vector();
            for (col, id) in ids().iter().enumerate() {
                let expected = rows.iter().map(|r| r[col]).min().unwrap();
                prop_assert_eq!(min.get(id), Some(expected));
            }
        }
    }
}
