//! Test fixtures and helpers.
//!
//! A [`Cluster`] is a set of replicas over one in-memory network, each with
//! its partner role served in the background.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tsae_core::ReplicaId;
use tsae_store::{MemoryApplier, Replica};
use tsae_sync::{
    next_session_number, run_originator, serve, verify_convergence, AntiEntropy, Connector,
    MemoryConnector, MemoryNetwork, PeerAddr, SessionReport, StaticPeers, SyncConfig, SyncError,
};

/// Build a participant list from names.
pub fn participants(names: &[&str]) -> Vec<ReplicaId> {
    names.iter().map(|name| ReplicaId::new(*name)).collect()
}

/// Replicas `a` and `b` sharing a two-member participant set.
pub fn replica_pair() -> (Replica<MemoryApplier>, Replica<MemoryApplier>) {
    let ids = participants(&["a", "b"]);
    (
        Replica::new(ReplicaId::new("a"), ids.clone(), MemoryApplier::new())
            .expect("a is a participant"),
        Replica::new(ReplicaId::new("b"), ids, MemoryApplier::new()).expect("b is a participant"),
    )
}

/// In-memory cluster. Each replica listens under its own name.
pub struct Cluster {
    network: Arc<MemoryNetwork>,
    replicas: BTreeMap<String, Arc<Replica<MemoryApplier>>>,
    config: SyncConfig,
    shutdown: watch::Sender<bool>,
    servers: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Create one replica per name and start serving each of them.
    pub async fn start(names: &[&str], config: SyncConfig) -> Self {
        let ids = participants(names);
        let network = MemoryNetwork::new();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut replicas = BTreeMap::new();
        let mut servers = Vec::new();
        for name in names {
            let replica = Arc::new(
                Replica::new(ReplicaId::new(*name), ids.clone(), MemoryApplier::new())
                    .expect("every name is a participant"),
            );
            let listener = network.listen(*name).await;
            servers.push(tokio::spawn(serve(
                Arc::clone(&replica),
                listener,
                config.clone(),
                shutdown_rx.clone(),
            )));
            replicas.insert(name.to_string(), replica);
        }

        Self {
            network,
            replicas,
            config,
            shutdown,
            servers,
        }
    }

    /// The replica named `name`.
    pub fn replica(&self, name: &str) -> Option<&Arc<Replica<MemoryApplier>>> {
        self.replicas.get(name)
    }

    /// All replicas, by name.
    pub fn replicas(&self) -> impl Iterator<Item = (&str, &Arc<Replica<MemoryApplier>>)> {
        self.replicas.iter().map(|(name, r)| (name.as_str(), r))
    }

    /// The cluster's network.
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    /// A scheduler for `name` whose peers are all other replicas.
    pub fn anti_entropy(
        &self,
        name: &str,
    ) -> Option<AntiEntropy<MemoryApplier, MemoryConnector, StaticPeers>> {
        let replica = self.replica(name)?;
        let peers = self.replicas.keys().map(|n| PeerAddr::from(n.as_str())).collect();
        Some(AntiEntropy::new(
            Arc::clone(replica),
            self.network.connector(),
            StaticPeers::excluding(peers, &PeerAddr::from(name)),
            self.config.clone(),
        ))
    }

    /// Run one session originated by `from` against `to`.
    ///
    /// When this returns `Ok`, both sides have committed.
    pub async fn session(&self, from: &str, to: &str) -> tsae_sync::Result<SessionReport> {
        let replica = self
            .replica(from)
            .ok_or_else(|| SyncError::TransportError(format!("no replica named {}", from)))?;
        let mut conn = self.network.connector().connect(&PeerAddr::from(to)).await?;
        run_originator(replica, &mut conn, next_session_number(), &self.config).await
    }

    /// One session for every ordered pair of replicas. Returns the number of
    /// failed sessions.
    pub async fn full_round(&self) -> usize {
        let names: Vec<&str> = self.replicas.keys().map(String::as_str).collect();
        let mut failed = 0;
        for from in &names {
            for to in names.iter().filter(|to| *to != from) {
                if self.session(from, to).await.is_err() {
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Run full rounds until the cluster converges. Returns the number of
    /// rounds it took, or `None` if it had not converged after `max_rounds`.
    pub async fn gossip_until_converged(&self, max_rounds: usize) -> Option<usize> {
        for round in 0..=max_rounds {
            if self.is_converged() {
                return Some(round);
            }
            if round < max_rounds {
                self.full_round().await;
            }
        }
        None
    }

    /// Whether every replica has the same summary and retained log.
    pub fn is_converged(&self) -> bool {
        let mut replicas = self.replicas.values();
        let Some(first) = replicas.next() else {
            return true;
        };
        replicas.all(|other| {
            verify_convergence(first, other)
                .map(|result| result.is_converged())
                .unwrap_or(false)
        })
    }

    /// Stop every server and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for server in self.servers {
            let _ = server.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsae_core::Timestamp;

    fn applied(replica: &Replica<MemoryApplier>) -> Vec<Timestamp> {
        replica
            .with_applier(|a| a.timestamps().cloned().collect())
            .unwrap()
    }

    #[test]
    fn test_replica_pair() {
        let (a, b) = replica_pair();
        assert_eq!(a.participants(), b.participants());
        assert_ne!(a.local_id(), b.local_id());
    }

    #[tokio::test]
    async fn test_two_replicas_converge_in_one_round() {
        let cluster = Cluster::start(&["a", "b"], SyncConfig::default()).await;
        let a = cluster.replica("a").unwrap();
        let b = cluster.replica("b").unwrap();
        a.originate(b"a1".to_vec()).unwrap();
        a.originate(b"a2".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();

        assert_eq!(cluster.full_round().await, 0);
        assert!(cluster.is_converged());
        assert_eq!(applied(a), applied(b));
        assert!(a.snapshot_state().unwrap().log.is_empty());

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_three_replicas_converge() {
        let cluster = Cluster::start(&["a", "b", "c"], SyncConfig::default()).await;
        for (name, replica) in cluster.replicas() {
            replica.originate(name.as_bytes().to_vec()).unwrap();
        }

        let rounds = cluster.gossip_until_converged(5).await;
        assert!(rounds.is_some());

        let expected = applied(cluster.replica("a").unwrap());
        assert_eq!(expected.len(), 3);
        for (_, replica) in cluster.replicas() {
            assert_eq!(applied(replica), expected);
        }

        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_with_missing_replica() {
        let cluster = Cluster::start(&["a", "b"], SyncConfig::default()).await;
        assert!(cluster.session("a", "zz").await.is_err());
        assert!(cluster.session("zz", "a").await.is_err());
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_anti_entropy_excludes_self() {
        let cluster = Cluster::start(&["a", "b"], SyncConfig::default()).await;
        cluster.replica("b").unwrap().originate(b"b1".to_vec()).unwrap();

        let scheduler = cluster.anti_entropy("a").unwrap();
        let round = scheduler.session_with_n(2).await;
        assert_eq!(round.completed.len(), 1);
        assert_eq!(round.received(), 1);

        cluster.shutdown().await;
    }
}
