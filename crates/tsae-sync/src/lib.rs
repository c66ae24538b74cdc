//! # TSAE Sync
//!
//! The Timestamped Anti-Entropy session protocol.
//!
//! ## Overview
//!
//! Two replicas reconcile over one ordered, bidirectional connection. Each side
//! learns the other's summary once and pushes exactly the operations the other
//! lacks, so a session costs O(missing operations) messages. Clocks are merged
//! with lattice joins, so the result does not depend on session order.
//!
//! ## Key Properties
//!
//! - **Idempotent**: re-running a session between converged replicas sends no
//!   operations and changes nothing
//! - **All-or-nothing**: replica state changes only at commit, after all I/O of
//!   the round succeeded; an aborted session is equivalent to no session
//! - **Lock discipline**: the replica lock is never held across network I/O
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsae_core::ReplicaId;
//! use tsae_store::{MemoryApplier, Replica};
//! use tsae_sync::{AntiEntropy, MemoryNetwork, PeerAddr, StaticPeers, SyncConfig};
//!
//! async fn example() {
//!     let ids = vec![ReplicaId::new("a"), ReplicaId::new("b")];
//!     let replica = Arc::new(Replica::new(ids[0].clone(), ids, MemoryApplier::new()).unwrap());
//!
//!     let network = MemoryNetwork::new();
//!     let peers = StaticPeers::new(vec![PeerAddr::from("b")]);
//!     let anti_entropy = AntiEntropy::new(replica, network.connector(), peers, SyncConfig::default());
//!
//!     let round = anti_entropy.session_with_n(1).await;
//!     println!("{} sessions completed", round.completed.len());
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Originator                            Partner
//!   |-------- AE_REQUEST -------------->|
//!   |<------- OPERATION* ---------------|
//!   |<------- AE_REQUEST ---------------|
//!   |-------- OPERATION* -------------->|
//!   |-------- END_TSAE ---------------->|   commit
//!   |<------- END_TSAE -----------------|
//!  commit
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod peers;
pub mod protocol;
pub mod scheduler;
pub mod transport;

pub use convergence::{state_digest, verify_convergence, ConvergenceResult, StateDigest};
pub use error::{Result, SyncError};
pub use messages::{limits, MessageBody, MsgType, TsaeMessage};
pub use peers::{PeerAddr, PeerSelector, StaticPeers};
pub use protocol::{
    next_session_number, run_originator, run_partner, DecodePolicy, Role, SessionReport,
    SyncConfig,
};
pub use scheduler::{serve, AntiEntropy, RoundReport};
pub use transport::{
    memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryNetwork},
    tcp::{TcpConnection, TcpConnector, TcpListener},
    Connection, Connector, Listener,
};
