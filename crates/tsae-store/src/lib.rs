//! # TSAE Store
//!
//! The shared Replica State of a TSAE node and the seam to application state.
//!
//! ## Overview
//!
//! A [`Replica`] owns the local clock vector ("summary"), the local clock
//! matrix ("ack"), the operation log, the pending-operations flag and an
//! [`Applier`] that mutates application state. Everything sits behind one
//! coarse lock, and every critical section is a single method call, so no
//! caller can hold the lock across network I/O.
//!
//! ## Key Types
//!
//! - [`Replica`] - Shared Replica State
//! - [`Applier`] - Applies accepted operations to application state
//! - [`MemoryApplier`] - In-memory application state for tests
//! - [`SqliteApplier`] - SQLite-backed application state
//!
//! ## Usage
//!
//! ```rust
//! use tsae_core::ReplicaId;
//! use tsae_store::{MemoryApplier, Replica};
//!
//! let ids = vec![ReplicaId::new("a"), ReplicaId::new("b")];
//! let replica = Replica::new(ReplicaId::new("a"), ids, MemoryApplier::new()).unwrap();
//!
//! let op = replica.originate(b"add recipe".to_vec()).unwrap();
//! assert_eq!(op.seq(), 1);
//! ```
//!
//! ## Design Notes
//!
//! - **Commit is the only merge point**: peer clocks and operations received
//!   during a session are validated and applied in one critical section.
//! - **Idempotent application**: appliers must tolerate operations they have
//!   already applied; delivery across retried sessions is at-least-once.

pub mod error;
pub mod memory;
pub mod migration;
pub mod replica;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryApplier;
pub use replica::{Commit, CommitReport, Replica, ReplicaSnapshot};
pub use sqlite::SqliteApplier;
pub use traits::Applier;
