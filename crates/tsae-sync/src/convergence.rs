//! Convergence verification.
//!
//! Two replicas have converged when they report the same summary and retain
//! the same not-yet-stable operations. The digest lets replicas compare that
//! state without exchanging it.

use std::fmt;

use tsae_core::{ClockVector, OperationLog};
use tsae_store::{Applier, Replica};

use crate::error::Result;

/// Blake3 digest of a replica's summary and retained log.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", self.to_hex())
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the state digest of `replica`.
///
/// Algorithm:
/// 1. Hash every summary entry in participant order
/// 2. Hash every retained operation as returned by `list_newer(zero)`
///    (origin, sequence number, payload), each field length-prefixed
pub fn state_digest<A: Applier>(replica: &Replica<A>) -> Result<StateDigest> {
    let state = replica.snapshot_state()?;
    Ok(digest_of(&state.summary, &state.log))
}

fn digest_of(summary: &ClockVector, log: &OperationLog) -> StateDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tsae-state-v0:");

    for (origin, seq) in summary.iter() {
        update_prefixed(&mut hasher, origin.as_str().as_bytes());
        hasher.update(&seq.to_be_bytes());
    }

    hasher.update(b"log:");
    for op in log.list_newer(&ClockVector::default()) {
        update_prefixed(&mut hasher, op.origin().as_str().as_bytes());
        hasher.update(&op.seq().to_be_bytes());
        update_prefixed(&mut hasher, &op.payload);
    }

    StateDigest(*hasher.finalize().as_bytes())
}

fn update_prefixed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both replicas have identical summaries and retained logs.
    Converged,
    /// The replicas have not converged yet (more sessions needed).
    NotConverged { reason: String },
}

impl ConvergenceResult {
    /// Check if the replicas have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two replicas' summaries and state digests.
pub fn verify_convergence<A: Applier, B: Applier>(
    local: &Replica<A>,
    remote: &Replica<B>,
) -> Result<ConvergenceResult> {
    let local_state = local.snapshot_state()?;
    let remote_state = remote.snapshot_state()?;

    if local_state.summary != remote_state.summary {
        return Ok(ConvergenceResult::NotConverged {
            reason: format!(
                "summary mismatch: local=[{}], remote=[{}]",
                local_state.summary, remote_state.summary
            ),
        });
    }

    let local_digest = digest_of(&local_state.summary, &local_state.log);
    let remote_digest = digest_of(&remote_state.summary, &remote_state.log);
    if local_digest != remote_digest {
        return Ok(ConvergenceResult::NotConverged {
            reason: format!(
                "retained log mismatch: local {} ops, remote {} ops",
                local_state.log.len(),
                remote_state.log.len()
            ),
        });
    }

    Ok(ConvergenceResult::Converged)
}
