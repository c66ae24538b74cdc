//! # TSAE
//!
//! Timestamped Anti-Entropy replication: replicas holding an operation-based
//! data structure reach eventual consistency by periodically exchanging the
//! operations they miss with randomly chosen peers.
//!
//! ## Overview
//!
//! A [`Node`] bundles:
//!
//! - **Replica**: summary vector, acknowledgement matrix, operation log and
//!   application state behind one lock
//! - **Originator**: periodic rounds of sessions with random partners
//! - **Partner**: one task per inbound session
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsae::{Node, NodeConfig};
//! use tsae::core::ReplicaId;
//! use tsae::store::{MemoryApplier, Replica};
//! use tsae::sync::{MemoryNetwork, PeerAddr, StaticPeers};
//!
//! async fn example() {
//!     let ids = vec![ReplicaId::new("a"), ReplicaId::new("b")];
//!     let network = MemoryNetwork::new();
//!
//!     let replica = Replica::new(ids[0].clone(), ids.clone(), MemoryApplier::new()).unwrap();
//!     let node = Node::new(
//!         Arc::new(replica),
//!         network.connector(),
//!         StaticPeers::new(vec![PeerAddr::from("b")]),
//!         NodeConfig::default(),
//!     )
//!     .unwrap();
//!
//!     node.originate(b"add recipe".to_vec()).unwrap();
//!     let round = node.sync_round().await;
//!     println!("{} sessions failed", round.failed);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tsae::core` - Clocks, operations and the operation log
//! - `tsae::store` - Replica state and appliers
//! - `tsae::sync` - Session protocol, transports and scheduling

pub mod error;
pub mod node;

// Re-export component crates
pub use tsae_core as core;
pub use tsae_store as store;
pub use tsae_sync as sync;

// Re-export main types for convenience
pub use error::{NodeError, Result};
pub use node::{Node, NodeConfig};

// Re-export commonly used types
pub use tsae_core::{ClockMatrix, ClockVector, Operation, ReplicaId, Timestamp};
pub use tsae_store::{Applier, MemoryApplier, Replica, SqliteApplier};
pub use tsae_sync::{
    ConvergenceResult, PeerAddr, RoundReport, SessionReport, StateDigest, StaticPeers, SyncConfig,
};
