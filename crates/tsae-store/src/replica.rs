//! Replica: the shared state of one TSAE node.
//!
//! All mutable state sits behind a single mutex. Each public method is one
//! short critical section; none of them performs I/O.

use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tsae_core::{
    AddResult, ClockMatrix, ClockVector, CoreError, Operation, OperationLog, ReplicaId, Timestamp,
};

use crate::error::{Result, StoreError};
use crate::traits::Applier;

/// Peer state collected by a session, merged in one step at commit time.
#[derive(Debug, Clone)]
pub struct Commit {
    /// The peer's summary vector from its request.
    pub summary: ClockVector,
    /// The peer's acknowledgement matrix from its request.
    pub ack: ClockMatrix,
    /// Operations received from the peer, in arrival order.
    pub operations: Vec<Operation>,
}

/// What a commit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Operations newly admitted to the log.
    pub inserted: usize,
    /// Operations already present (or already purged).
    pub duplicates: usize,
    /// Operations rejected because they did not extend their partition.
    pub gaps: usize,
    /// Operations garbage-collected after the merge.
    pub purged: usize,
}

/// Point-in-time copy of the clocks and log, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub summary: ClockVector,
    pub ack: ClockMatrix,
    pub log: OperationLog,
    pub pending_operations: bool,
}

struct ReplicaInner<A> {
    summary: ClockVector,
    ack: ClockMatrix,
    log: OperationLog,
    pending_operations: bool,
    applier: A,
}

/// Shared Replica State.
///
/// Wrap it in an `Arc` to share it between the originator scheduler and the
/// partner tasks.
pub struct Replica<A: Applier> {
    id: ReplicaId,
    participants: Vec<ReplicaId>,
    inner: Mutex<ReplicaInner<A>>,
}

impl<A: Applier> Replica<A> {
    /// Create a replica with all-zero clocks and an empty log.
    ///
    /// `participants` must include `id`.
    pub fn new(id: ReplicaId, mut participants: Vec<ReplicaId>, applier: A) -> Result<Self> {
        participants.sort();
        participants.dedup();
        if !participants.contains(&id) {
            return Err(CoreError::NotAParticipant(id).into());
        }

        Ok(Self {
            inner: Mutex::new(ReplicaInner {
                summary: ClockVector::new(&participants),
                ack: ClockMatrix::new(&participants),
                log: OperationLog::new(&participants),
                pending_operations: false,
                applier,
            }),
            id,
            participants,
        })
    }

    /// The local replica id.
    pub fn local_id(&self) -> &ReplicaId {
        &self.id
    }

    /// All participants, sorted.
    pub fn participants(&self) -> &[ReplicaId] {
        &self.participants
    }

    fn lock(&self) -> Result<MutexGuard<'_, ReplicaInner<A>>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session critical sections
    // ─────────────────────────────────────────────────────────────────────────

    /// Clone the summary and the ack matrix, with the summary stamped into
    /// the local row of the cloned matrix.
    ///
    /// The returned values are what a session sends in its request. Shared
    /// state is not modified; the local row is stamped for real at commit.
    pub fn snapshot(&self) -> Result<(ClockVector, ClockMatrix)> {
        let inner = self.lock()?;
        let summary = inner.summary.clone();
        let mut ack = inner.ack.clone();
        ack.update(&self.id, summary.clone())?;
        Ok((summary, ack))
    }

    /// Operations a peer reporting `summary` has not seen, together with a
    /// [`snapshot`](Self::snapshot), both taken under one lock.
    ///
    /// The returned summary covers exactly the local log the operations were
    /// listed from, so a commit landing in between cannot make the summary
    /// claim operations that were never listed.
    pub fn newer_with_snapshot(
        &self,
        summary: &ClockVector,
    ) -> Result<(Vec<Operation>, ClockVector, ClockMatrix)> {
        let inner = self.lock()?;
        let newer = inner.log.list_newer(summary);
        let local = inner.summary.clone();
        let mut ack = inner.ack.clone();
        ack.update(&self.id, local.clone())?;
        Ok((newer, local, ack))
    }

    /// Operations in the log that a peer reporting `summary` has not seen.
    pub fn list_newer(&self, summary: &ClockVector) -> Result<Vec<Operation>> {
        let inner = self.lock()?;
        Ok(inner.log.list_newer(summary))
    }

    /// Validate a peer's clocks against the local participant set.
    pub fn check_peer_clocks(&self, summary: &ClockVector, ack: &ClockMatrix) -> Result<()> {
        let inner = self.lock()?;
        inner.summary.check_domain(summary)?;
        inner.ack.check_domain(ack)?;
        Ok(())
    }

    /// Merge a completed session into the replica.
    ///
    /// The merge is computed on copies of summary, ack and log: admit the
    /// received operations, merge summary and ack, stamp the merged summary
    /// into the local ack row and purge with the merged ack. The admitted
    /// batch is then applied, and the copies replace the live state only if
    /// that succeeds. A rejected commit leaves the replica untouched.
    ///
    /// Operations rejected as gaps are not applied.
    pub fn commit(&self, commit: Commit) -> Result<CommitReport> {
        let mut inner = self.lock()?;

        inner.summary.check_domain(&commit.summary)?;
        inner.ack.check_domain(&commit.ack)?;
        for op in &commit.operations {
            if inner.summary.get(op.origin()).is_none() {
                return Err(CoreError::UnknownParticipant(op.origin().clone()).into());
            }
            if op.seq() == 0 {
                return Err(CoreError::InvalidSequence {
                    origin: op.origin().clone(),
                    seq: 0,
                }
                .into());
            }
        }

        let mut report = CommitReport::default();
        let mut log = inner.log.clone();
        let mut accepted = Vec::with_capacity(commit.operations.len());
        for op in commit.operations {
            match log.add(op.clone())? {
                AddResult::Inserted => {
                    report.inserted += 1;
                    accepted.push(op);
                }
                AddResult::Duplicate => {
                    report.duplicates += 1;
                    accepted.push(op);
                }
                AddResult::Gap { expected } => {
                    tracing::warn!(
                        replica = %self.id,
                        timestamp = %op.timestamp,
                        expected,
                        "operation does not extend its log partition"
                    );
                    report.gaps += 1;
                }
            }
        }

        let mut summary = inner.summary.clone();
        let mut ack = inner.ack.clone();
        summary.update_max(&commit.summary)?;
        ack.update_max(&commit.ack)?;
        ack.update(&self.id, summary.clone())?;
        report.purged = log.purge_log(&ack);

        inner.applier.apply(&accepted)?;

        let received = report.inserted + report.duplicates + report.gaps;
        inner.summary = summary;
        inner.ack = ack;
        inner.log = log;
        if received > 0 {
            inner.pending_operations = true;
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Originate a new local operation: stamp it with the next local sequence
    /// number, log it, advance the summary and apply it.
    pub fn originate(&self, payload: impl Into<Bytes>) -> Result<Operation> {
        let mut inner = self.lock()?;
        let seq = inner.summary.get(&self.id).unwrap_or(0) + 1;
        let op = Operation::new(Timestamp::new(self.id.clone(), seq), payload);

        // Applied first; a failed apply leaves the clocks and log untouched.
        inner.applier.apply(std::slice::from_ref(&op))?;
        inner.log.add(op.clone())?;
        inner.summary.update_timestamp(&op.timestamp)?;
        Ok(op)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy of the local summary vector.
    pub fn summary(&self) -> Result<ClockVector> {
        Ok(self.lock()?.summary.clone())
    }

    /// Copy of the local acknowledgement matrix.
    pub fn ack(&self) -> Result<ClockMatrix> {
        Ok(self.lock()?.ack.clone())
    }

    /// Copy of summary, ack, log and pending flag taken under one lock.
    pub fn snapshot_state(&self) -> Result<ReplicaSnapshot> {
        let inner = self.lock()?;
        Ok(ReplicaSnapshot {
            summary: inner.summary.clone(),
            ack: inner.ack.clone(),
            log: inner.log.clone(),
            pending_operations: inner.pending_operations,
        })
    }

    /// Whether operations have been received and not yet reported consumed.
    pub fn pending_operations(&self) -> Result<bool> {
        Ok(self.lock()?.pending_operations)
    }

    /// Set or clear the pending-operations flag.
    pub fn set_pending_operations(&self, pending: bool) -> Result<()> {
        self.lock()?.pending_operations = pending;
        Ok(())
    }

    /// Run `f` against the application state.
    pub fn with_applier<R>(&self, f: impl FnOnce(&A) -> R) -> Result<R> {
        let inner = self.lock()?;
        Ok(f(&inner.applier))
    }
}
