//! Session scheduling.
//!
//! [`AntiEntropy`] drives the originator role: every round it picks random
//! partners and runs one session with each, one after another. [`serve`] drives
//! the partner role: one task per accepted connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tsae_store::{Applier, Replica};

use crate::error::{Result, SyncError};
use crate::peers::{PeerAddr, PeerSelector};
use crate::protocol::{next_session_number, run_originator, run_partner, SessionReport, SyncConfig};
use crate::transport::{Connector, Listener};

/// First wait after a failed accept; doubled on each consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Upper bound on the wait between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Outcome of one anti-entropy round.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// Sessions that committed.
    pub completed: Vec<SessionReport>,
    /// Sessions that aborted (connect failure included).
    pub failed: usize,
}

impl RoundReport {
    /// Total operations sent across completed sessions.
    pub fn sent(&self) -> usize {
        self.completed.iter().map(|r| r.sent).sum()
    }

    /// Total operations received across completed sessions.
    pub fn received(&self) -> usize {
        self.completed.iter().map(|r| r.received).sum()
    }
}

/// Originator-side scheduler.
pub struct AntiEntropy<A: Applier, C: Connector, P: PeerSelector> {
    replica: Arc<Replica<A>>,
    connector: C,
    peers: P,
    config: SyncConfig,
    connected: AtomicBool,
}

impl<A, C, P> AntiEntropy<A, C, P>
where
    A: Applier,
    C: Connector,
    P: PeerSelector,
{
    /// Create a scheduler. It starts connected.
    pub fn new(replica: Arc<Replica<A>>, connector: C, peers: P, config: SyncConfig) -> Self {
        Self {
            replica,
            connector,
            peers,
            config,
            connected: AtomicBool::new(true),
        }
    }

    /// The replica this scheduler synchronizes.
    pub fn replica(&self) -> &Arc<Replica<A>> {
        &self.replica
    }

    /// The scheduler's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Mark the node connected or disconnected. Rounds are skipped while
    /// disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Whether rounds currently run.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Run sessions with up to `n` random partners, sequentially.
    ///
    /// Failed sessions are logged and counted; they never stop the round.
    pub async fn session_with_n(&self, n: usize) -> RoundReport {
        let mut round = RoundReport::default();
        if !self.is_connected() {
            tracing::debug!(replica = %self.replica.local_id(), "disconnected, skipping round");
            return round;
        }

        for peer in self.peers.random_partners(n) {
            match self.session_with(&peer).await {
                Ok(report) => round.completed.push(report),
                Err(_) => round.failed += 1,
            }
        }
        round
    }

    /// Run one session with `peer`.
    pub async fn session_with(&self, peer: &PeerAddr) -> Result<SessionReport> {
        let session_number = next_session_number();
        tracing::debug!(session = session_number, %peer, "connecting");

        let mut conn = match self.connector.connect(peer).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(session = session_number, %peer, error = %e, "connect failed");
                return Err(e);
            }
        };
        run_originator(&self.replica, &mut conn, session_number, &self.config).await
    }

    /// Run a round every `session_period` until `shutdown` turns true or its
    /// sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.session_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let round = self.session_with_n(self.config.sessions_per_round).await;
                    tracing::debug!(
                        replica = %self.replica.local_id(),
                        completed = round.completed.len(),
                        failed = round.failed,
                        "round finished"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

/// Accept connections on `listener` and run the partner role on each, in its
/// own task, until `shutdown` turns true or the listener closes.
pub async fn serve<A, L>(
    replica: Arc<Replica<A>>,
    mut listener: L,
    config: SyncConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    A: Applier + 'static,
    L: Listener,
{
    let config = Arc::new(config);
    let mut backoff = ACCEPT_BACKOFF_MIN;
    'accept: loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(mut conn) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    let replica = Arc::clone(&replica);
                    let config = Arc::clone(&config);
                    tokio::spawn(async move {
                        // The session logs its own outcome.
                        let _ = run_partner(&replica, &mut conn, &config).await;
                    });
                }
                Err(SyncError::Closed) => break,
                Err(e) => {
                    tracing::warn!(
                        replica = %replica.local_id(),
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "accept failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break 'accept;
                            }
                        }
                    }
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(replica = %replica.local_id(), "listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::StaticPeers;
    use crate::transport::memory::MemoryNetwork;
    use std::time::Duration;
    use tsae_core::ReplicaId;
    use tsae_store::MemoryApplier;

    fn ids() -> Vec<ReplicaId> {
        vec![ReplicaId::new("a"), ReplicaId::new("b")]
    }

    fn replica(id: &str) -> Arc<Replica<MemoryApplier>> {
        Arc::new(Replica::new(ReplicaId::new(id), ids(), MemoryApplier::new()).unwrap())
    }

    fn config() -> SyncConfig {
        SyncConfig {
            message_timeout: Duration::from_secs(2),
            session_period: Duration::from_millis(20),
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_round_with_served_partner() {
        let network = MemoryNetwork::new();
        let a = replica("a");
        let b = replica("b");
        a.originate(b"a1".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = network.listen("b").await;
        let server = tokio::spawn(serve(Arc::clone(&b), listener, config(), stop_rx));

        let scheduler = AntiEntropy::new(
            Arc::clone(&a),
            network.connector(),
            StaticPeers::new(vec![PeerAddr::from("b")]),
            config(),
        );
        let round = scheduler.session_with_n(3).await;

        assert_eq!(round.completed.len(), 1);
        assert_eq!(round.failed, 0);
        assert_eq!((round.sent(), round.received()), (1, 1));
        assert_eq!(a.summary().unwrap(), b.summary().unwrap());

        stop_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_round_is_skipped() {
        let network = MemoryNetwork::new();
        let scheduler = AntiEntropy::new(
            replica("a"),
            network.connector(),
            StaticPeers::new(vec![PeerAddr::from("b")]),
            config(),
        );
        scheduler.set_connected(false);

        let round = scheduler.session_with_n(1).await;
        assert!(round.completed.is_empty());
        assert_eq!(round.failed, 0);
    }

    #[tokio::test]
    async fn test_unreachable_partner_counts_as_failed() {
        let network = MemoryNetwork::new();
        let scheduler = AntiEntropy::new(
            replica("a"),
            network.connector(),
            StaticPeers::new(vec![PeerAddr::from("nowhere")]),
            config(),
        );

        let round = scheduler.session_with_n(1).await;
        assert!(round.completed.is_empty());
        assert_eq!(round.failed, 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let network = MemoryNetwork::new();
        let a = replica("a");
        let b = replica("b");
        b.originate(b"b1".to_vec()).unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let listener = network.listen("b").await;
        let server = tokio::spawn(serve(Arc::clone(&b), listener, config(), stop_rx.clone()));

        let scheduler = Arc::new(AntiEntropy::new(
            Arc::clone(&a),
            network.connector(),
            StaticPeers::new(vec![PeerAddr::from("b")]),
            config(),
        ));
        let runner = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run(stop_rx).await }
        });

        // The first tick fires immediately; give a few rounds time to run.
        tokio::time::sleep(Duration::from_millis(150)).await;
        stop_tx.send(true).unwrap();
        runner.await.unwrap();
        server.await.unwrap();

        assert_eq!(a.summary().unwrap().get(&ReplicaId::new("b")), Some(1));
    }

    /// A listener whose every accept fails.
    struct BrokenListener {
        attempts: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Listener for BrokenListener {
        type Conn = crate::transport::memory::MemoryConnection;

        async fn accept(&mut self) -> Result<Self::Conn> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::TransportError("too many open files".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_accept_backs_off() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let listener = BrokenListener {
            attempts: Arc::clone(&attempts),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let server = tokio::spawn(serve(replica("b"), listener, config(), stop_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        server.await.unwrap();

        // 10 + 20 + 40 + 80 ms of waiting fits about five attempts.
        let attempts = attempts.load(Ordering::SeqCst);
        assert!(attempts >= 2, "attempts: {}", attempts);
        assert!(attempts <= 10, "attempts: {}", attempts);
    }
}
