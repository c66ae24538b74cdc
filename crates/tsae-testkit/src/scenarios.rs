//! Data-driven scenarios.
//!
//! A scenario names a participant set, the writes each replica originates and
//! the sessions to run, in order, together with whether the replicas must
//! have converged afterwards. Scenarios are stored as JSON so new cases can be
//! added without code.

use serde::{Deserialize, Serialize};
use tsae_sync::SyncConfig;

use crate::fixtures::Cluster;

/// A local write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    /// Originating replica.
    pub replica: String,
    /// Operation payload.
    pub payload: String,
}

/// A scripted sequence of writes and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Human-readable name for the scenario.
    pub name: String,
    /// Participant names.
    pub participants: Vec<String>,
    /// Writes, performed before any session.
    pub writes: Vec<Write>,
    /// Sessions as `[originator, partner]`, run in order.
    pub sessions: Vec<[String; 2]>,
    /// Whether every replica must have converged at the end.
    pub expect_converged: bool,
}

const SCENARIOS: &str = r#"[
  {
    "name": "two replicas, one session each way",
    "participants": ["a", "b"],
    "writes": [
      { "replica": "a", "payload": "a1" },
      { "replica": "a", "payload": "a2" },
      { "replica": "b", "payload": "b1" }
    ],
    "sessions": [["a", "b"], ["b", "a"]],
    "expect_converged": true
  },
  {
    "name": "two replicas, one session leaves acknowledgements behind",
    "participants": ["a", "b"],
    "writes": [
      { "replica": "a", "payload": "a1" },
      { "replica": "b", "payload": "b1" }
    ],
    "sessions": [["a", "b"]],
    "expect_converged": false
  },
  {
    "name": "three replicas, two ring cycles",
    "participants": ["a", "b", "c"],
    "writes": [
      { "replica": "a", "payload": "a1" },
      { "replica": "b", "payload": "b1" },
      { "replica": "c", "payload": "c1" }
    ],
    "sessions": [
      ["a", "b"], ["b", "c"], ["c", "a"],
      ["a", "b"], ["b", "c"], ["c", "a"]
    ],
    "expect_converged": true
  },
  {
    "name": "three replicas, isolated writer",
    "participants": ["a", "b", "c"],
    "writes": [
      { "replica": "c", "payload": "c1" }
    ],
    "sessions": [["a", "b"], ["b", "a"]],
    "expect_converged": false
  },
  {
    "name": "no writes",
    "participants": ["a", "b", "c"],
    "writes": [],
    "sessions": [["a", "c"]],
    "expect_converged": true
  }
]"#;

/// Get all built-in scenarios.
pub fn all_scenarios() -> serde_json::Result<Vec<Scenario>> {
    serde_json::from_str(SCENARIOS)
}

/// Run `scenario` on a fresh cluster and return the cluster, still serving.
///
/// Panics if a write names an unknown replica or a session fails; scenarios
/// describe healthy networks.
pub async fn run_scenario(scenario: &Scenario, config: SyncConfig) -> Cluster {
    let names: Vec<&str> = scenario.participants.iter().map(String::as_str).collect();
    let cluster = Cluster::start(&names, config).await;

    for write in &scenario.writes {
        cluster
            .replica(&write.replica)
            .unwrap_or_else(|| panic!("{}: unknown replica {}", scenario.name, write.replica))
            .originate(write.payload.clone().into_bytes())
            .unwrap_or_else(|e| panic!("{}: write failed: {}", scenario.name, e));
    }
    for [from, to] in &scenario.sessions {
        cluster
            .session(from, to)
            .await
            .unwrap_or_else(|e| panic!("{}: session {} -> {} failed: {}", scenario.name, from, to, e));
    }
    cluster
}
