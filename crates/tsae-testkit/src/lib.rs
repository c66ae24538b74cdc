//! # TSAE Testkit
//!
//! Testing utilities for TSAE.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Generators**: Proptest strategies for clocks, matrices and operation batches
//! - **Fixtures**: In-memory clusters of served replicas
//! - **Scenarios**: Data-driven write/session sequences with their expected outcome
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tsae_testkit::generators::{clock_vector, participant_set};
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_idempotent(v in participant_set(4).prop_flat_map(|ids| clock_vector(ids, 10))) {
//!         let mut merged = v.clone();
//!         merged.update_max(&v).unwrap();
//!         prop_assert_eq!(merged, v);
//!     }
//! }
//! ```
//!
//! ## Clusters
//!
//! ```rust,no_run
//! use tsae_sync::SyncConfig;
//! use tsae_testkit::fixtures::Cluster;
//!
//! async fn example() {
//!     let cluster = Cluster::start(&["a", "b", "c"], SyncConfig::default()).await;
//!     cluster.replica("a").unwrap().originate(b"hello".to_vec()).unwrap();
//!     cluster.gossip_until_converged(5).await;
//!     assert!(cluster.is_converged());
//!     cluster.shutdown().await;
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod scenarios;

pub use fixtures::{participants, Cluster};
pub use generators::{clock_matrix, clock_vector, operation_batch, payload};
pub use scenarios::{all_scenarios, run_scenario, Scenario};
