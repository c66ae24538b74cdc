//! The Node: one replica plus everything needed to keep it in sync.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tsae_core::Operation;
use tsae_store::{Applier, Replica};
use tsae_sync::{
    state_digest, verify_convergence, AntiEntropy, Connector, ConvergenceResult, Listener,
    PeerAddr, PeerSelector, RoundReport, SessionReport, StateDigest, StaticPeers, SyncConfig,
};

use crate::error::{NodeError, Result};

/// Configuration for a [`Node`].
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Session and scheduling configuration.
    pub sync: SyncConfig,
}

impl NodeConfig {
    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sync.message_timeout.is_zero() {
            return Err(NodeError::InvalidConfig("message_timeout must be positive".into()));
        }
        if self.sync.session_period.is_zero() {
            return Err(NodeError::InvalidConfig("session_period must be positive".into()));
        }
        if self.sync.sessions_per_round == 0 {
            return Err(NodeError::InvalidConfig(
                "sessions_per_round must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A TSAE node.
///
/// Provides a unified API for:
/// - Originating local operations
/// - Running anti-entropy sessions, one-off or periodically
/// - Serving partner sessions
/// - Checking convergence against another replica
pub struct Node<A: Applier, C: Connector, P: PeerSelector = StaticPeers> {
    anti_entropy: AntiEntropy<A, C, P>,
    config: NodeConfig,
}

impl<A, C, P> Node<A, C, P>
where
    A: Applier + 'static,
    C: Connector,
    P: PeerSelector,
{
    /// Create a node.
    pub fn new(replica: Arc<Replica<A>>, connector: C, peers: P, config: NodeConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            replica = %replica.local_id(),
            participants = replica.participants().len(),
            "node created"
        );
        Ok(Self {
            anti_entropy: AntiEntropy::new(replica, connector, peers, config.sync.clone()),
            config,
        })
    }

    /// The node's replica.
    pub fn replica(&self) -> &Arc<Replica<A>> {
        self.anti_entropy.replica()
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Originate a local operation. It reaches other replicas through later
    /// sessions.
    pub fn originate(&self, payload: impl Into<Bytes>) -> Result<Operation> {
        let op = self.replica().originate(payload)?;
        tracing::trace!(timestamp = %op.timestamp, "originated");
        Ok(op)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one round: `sessions_per_round` sessions with random partners.
    pub async fn sync_round(&self) -> RoundReport {
        self.anti_entropy
            .session_with_n(self.config.sync.sessions_per_round)
            .await
    }

    /// Run one session with a specific peer.
    pub async fn sync_with(&self, peer: &PeerAddr) -> Result<SessionReport> {
        Ok(self.anti_entropy.session_with(peer).await?)
    }

    /// Run rounds periodically until `shutdown` turns true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.anti_entropy.run(shutdown).await
    }

    /// Serve partner sessions on `listener` until `shutdown` turns true.
    pub async fn serve<L: Listener>(&self, listener: L, shutdown: watch::Receiver<bool>) {
        tsae_sync::serve(
            Arc::clone(self.replica()),
            listener,
            self.config.sync.clone(),
            shutdown,
        )
        .await
    }

    /// Mark the node connected or disconnected. Rounds are skipped while
    /// disconnected; inbound sessions are still served.
    pub fn set_connected(&self, connected: bool) {
        self.anti_entropy.set_connected(connected);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convergence
    // ─────────────────────────────────────────────────────────────────────────

    /// Digest of the replica's summary and retained log.
    pub fn digest(&self) -> Result<StateDigest> {
        Ok(state_digest(self.replica())?)
    }

    /// Compare this node's replica with `other`.
    pub fn converged_with<B: Applier>(&self, other: &Replica<B>) -> Result<ConvergenceResult> {
        Ok(verify_convergence(self.replica(), other)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tsae_core::ReplicaId;
    use tsae_store::MemoryApplier;
    use tsae_sync::{MemoryConnector, MemoryNetwork};

    fn ids() -> Vec<ReplicaId> {
        vec![ReplicaId::new("a"), ReplicaId::new("b")]
    }

    fn node(network: &Arc<MemoryNetwork>, id: &str, peer: &str) -> Node<MemoryApplier, MemoryConnector> {
        let replica = Replica::new(ReplicaId::new(id), ids(), MemoryApplier::new()).unwrap();
        Node::new(
            Arc::new(replica),
            network.connector(),
            StaticPeers::new(vec![PeerAddr::from(peer)]),
            NodeConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(NodeConfig::default().validate().is_ok());

        let mut config = NodeConfig::default();
        config.sync.sessions_per_round = 0;
        assert!(matches!(config.validate(), Err(NodeError::InvalidConfig(_))));

        let mut config = NodeConfig::default();
        config.sync.message_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_sync_with_served_peer() {
        let network = MemoryNetwork::new();
        let a = Arc::new(node(&network, "a", "b"));
        let b = Arc::new(node(&network, "b", "a"));
        a.originate(b"a1".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = network.listen("b").await;
        let server = tokio::spawn({
            let b = Arc::clone(&b);
            async move { b.serve(listener, stop_rx).await }
        });

        let report = a.sync_with(&PeerAddr::from("b")).await.unwrap();
        assert_eq!((report.sent, report.received), (1, 1));
        assert_eq!(
            a.replica().summary().unwrap(),
            b.replica().summary().unwrap()
        );

        stop_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_with_unknown_peer_fails() {
        let network = MemoryNetwork::new();
        let a = node(&network, "a", "b");

        let result = a.sync_with(&PeerAddr::from("b")).await;
        assert!(matches!(result, Err(NodeError::Sync(_))));
        assert_eq!(a.sync_round().await.failed, 1);
    }
}
