//! Applier trait: the seam between anti-entropy and application state.

use tsae_core::Operation;

use crate::error::Result;

/// Applies accepted operations to application state.
///
/// Called with the replica lock held, once per locally originated operation
/// and once per committed session with the batch received from the peer.
///
/// # Design Notes
///
/// - **Idempotent**: a batch may contain operations applied before (a retried
///   session, or the same operation received from two peers). Implementations
///   must make repeated application a no-op.
/// - **Synchronous**: the lock is a plain mutex; implementations must not block
///   on network I/O.
pub trait Applier: Send {
    /// Apply a batch of operations, in order.
    fn apply(&mut self, ops: &[Operation]) -> Result<()>;
}

impl<A: Applier + ?Sized> Applier for Box<A> {
    fn apply(&mut self, ops: &[Operation]) -> Result<()> {
        (**self).apply(ops)
    }
}
