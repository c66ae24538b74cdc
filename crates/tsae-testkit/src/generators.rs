//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tsae_core::{ClockMatrix, ClockVector, Operation, ReplicaId, Timestamp};

/// Generate a replica id.
pub fn replica_id() -> impl Strategy<Value = ReplicaId> {
    "[a-z][a-z0-9]{0,7}".prop_map(ReplicaId::new)
}

/// Generate a sorted, non-empty set of up to `max` distinct participants.
pub fn participant_set(max: usize) -> impl Strategy<Value = Vec<ReplicaId>> {
    prop::collection::btree_set(replica_id(), 1..=max.max(1))
        .prop_map(|ids| ids.into_iter().collect())
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a clock vector over `participants` with entries up to `max_seq`.
pub fn clock_vector(participants: Vec<ReplicaId>, max_seq: u64) -> impl Strategy<Value = ClockVector> {
    prop::collection::vec(0..=max_seq, participants.len())
        .prop_map(move |seqs| vector_from(&participants, &seqs))
}

/// Generate a clock matrix over `participants`, one random row per participant.
pub fn clock_matrix(participants: Vec<ReplicaId>, max_seq: u64) -> impl Strategy<Value = ClockMatrix> {
    let n = participants.len();
    prop::collection::vec(prop::collection::vec(0..=max_seq, n), n).prop_map(move |rows| {
        let mut matrix = ClockMatrix::new(&participants);
        for (node, seqs) in participants.iter().zip(rows) {
            matrix
                .update(node, vector_from(&participants, &seqs))
                .expect("row spans the participant set");
        }
        matrix
    })
}

/// Generate a contiguous batch of operations: for each participant, seqs
/// `1..=k` with `k` up to `max_per_origin`.
pub fn operation_batch(
    participants: Vec<ReplicaId>,
    max_per_origin: u64,
) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(0..=max_per_origin, participants.len()).prop_map(move |counts| {
        participants
            .iter()
            .zip(counts)
            .flat_map(|(origin, count)| {
                (1..=count).map(move |seq| {
                    Operation::new(
                        Timestamp::new(origin.clone(), seq),
                        format!("{}:{}", origin, seq).into_bytes(),
                    )
                })
            })
            .collect()
    })
}

fn vector_from(participants: &[ReplicaId], seqs: &[u64]) -> ClockVector {
    let mut vector = ClockVector::new(participants);
    for (origin, &seq) in participants.iter().zip(seqs) {
        vector
            .update_timestamp(&Timestamp::new(origin.clone(), seq))
            .expect("origin is a participant");
    }
    vector
}
