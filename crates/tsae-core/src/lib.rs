//! # TSAE Core
//!
//! Pure data structures for Timestamped Anti-Entropy replication: the logical
//! clocks that track what each replica has seen and acknowledged, and the
//! operation log that holds updates until every replica has acknowledged them.
//!
//! This crate contains no I/O, no locking, no networking.
//!
//! ## Key Types
//!
//! - [`ReplicaId`] - Identifier of a participating replica
//! - [`Timestamp`] - `(origin, seq)` identity of an operation
//! - [`Operation`] - An immutable update with an opaque payload
//! - [`ClockVector`] - Per-origin count of observed operations
//! - [`ClockMatrix`] - One clock vector per replica ("who has acknowledged what")
//! - [`OperationLog`] - Not-yet-stable operations, partitioned by origin
//!
//! ## Lattice Semantics
//!
//! [`ClockVector::update_max`] and [`ClockMatrix::update_max`] are joins on the
//! per-entry natural order: commutative, associative and idempotent. Merging
//! a peer's clocks any number of times, in any order, yields the same result.

pub mod clock;
pub mod error;
pub mod log;
pub mod matrix;
pub mod operation;
pub mod types;

pub use clock::ClockVector;
pub use error::{CoreError, Result};
pub use log::{AddResult, OperationLog};
pub use matrix::ClockMatrix;
pub use operation::Operation;
pub use types::{ReplicaId, Timestamp};
