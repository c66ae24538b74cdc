//! TSAE session state machines.
//!
//! [`run_originator`] and [`run_partner`] drive the two sides of one session
//! over an established [`Connection`]. Operations received during a session
//! are staged and only reach the replica in the final commit, so a session
//! that fails at any earlier step leaves the replica exactly as it found it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tsae_core::Operation;
use tsae_store::{Applier, Commit, CommitReport, Replica};

use crate::error::{Result, SyncError};
use crate::messages::{MessageBody, TsaeMessage};
use crate::transport::Connection;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate the next process-wide session number. The first one is 1.
pub fn next_session_number() -> u64 {
    SESSION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// What to do when a peer sends a frame that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Log the error and abort the offending session only.
    #[default]
    AbortSession,
    /// Log the error and terminate the process with exit status 1.
    Terminate,
}

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for waiting for each peer message.
    pub message_timeout: Duration,
    /// Interval between anti-entropy rounds.
    pub session_period: Duration,
    /// Number of random partners contacted per round.
    pub sessions_per_round: usize,
    /// Reaction to malformed peer messages.
    pub decode_policy: DecodePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(30),
            session_period: Duration::from_secs(10),
            sessions_per_round: 1,
            decode_policy: DecodePolicy::AbortSession,
        }
    }
}

/// Side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The side that opened the connection.
    Originator,
    /// The side that accepted it.
    Partner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Originator => "originator",
            Role::Partner => "partner",
        })
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session number shared by both sides.
    pub session_number: u64,
    /// Local role.
    pub role: Role,
    /// `OPERATION` messages sent.
    pub sent: usize,
    /// `OPERATION` messages received.
    pub received: usize,
    /// What the commit changed locally.
    pub commit: CommitReport,
}

/// Run the originator side of session `session_number` over `conn`.
///
/// The connection is closed when the session ends, successfully or not.
pub async fn run_originator<A, C>(
    replica: &Replica<A>,
    conn: &mut C,
    session_number: u64,
    config: &SyncConfig,
) -> Result<SessionReport>
where
    A: Applier,
    C: Connection,
{
    let mut session = Session::new(conn, session_number, Role::Originator, config);
    let result = session.originate(replica).await;
    session.finish(result).await
}

/// Run the partner side of a session over an accepted `conn`.
///
/// The session number is taken from the originator's request. The connection
/// is closed when the session ends, successfully or not.
pub async fn run_partner<A, C>(
    replica: &Replica<A>,
    conn: &mut C,
    config: &SyncConfig,
) -> Result<SessionReport>
where
    A: Applier,
    C: Connection,
{
    let mut session = Session::new(conn, 0, Role::Partner, config);
    let result = session.respond(replica).await;
    session.finish(result).await
}

/// Session-local state. Shares nothing with other sessions.
struct Session<'a, C> {
    conn: &'a mut C,
    session_number: u64,
    role: Role,
    config: &'a SyncConfig,
    sent: usize,
}

impl<'a, C: Connection> Session<'a, C> {
    fn new(conn: &'a mut C, session_number: u64, role: Role, config: &'a SyncConfig) -> Self {
        Self {
            conn,
            session_number,
            role,
            config,
            sent: 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Originator
    // ─────────────────────────────────────────────────────────────────────────

    async fn originate<A: Applier>(&mut self, replica: &Replica<A>) -> Result<SessionReport> {
        tracing::debug!(session = self.session_number, role = %self.role, "session started");

        let (summary, ack) = replica.snapshot()?;
        self.send(TsaeMessage::ae_request(self.session_number, summary, ack))
            .await?;

        let mut staged = Vec::new();
        let terminator = self.receive_operations(&mut staged).await?;
        let (partner_summary, partner_ack) = match terminator.body {
            MessageBody::AeRequest { summary, ack } => (summary, ack),
            _ => {
                return Err(SyncError::UnexpectedMessage {
                    expected: "AE_REQUEST",
                    got: terminator.msg_type(),
                })
            }
        };
        replica.check_peer_clocks(&partner_summary, &partner_ack)?;

        let missing = replica.list_newer(&partner_summary)?;
        self.send_operations(missing).await?;
        self.send(TsaeMessage::end_tsae(self.session_number)).await?;

        let end = self.recv("END_TSAE").await?;
        if end.body != MessageBody::EndTsae {
            return Err(SyncError::UnexpectedMessage {
                expected: "END_TSAE",
                got: end.msg_type(),
            });
        }

        let received = staged.len();
        let commit = replica.commit(Commit {
            summary: partner_summary,
            ack: partner_ack,
            operations: staged,
        })?;
        Ok(self.report(received, commit))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Partner
    // ─────────────────────────────────────────────────────────────────────────

    async fn respond<A: Applier>(&mut self, replica: &Replica<A>) -> Result<SessionReport> {
        let request = self.recv_first().await?;
        let (originator_summary, originator_ack) = match request.body {
            MessageBody::AeRequest { summary, ack } => (summary, ack),
            _ => {
                return Err(SyncError::UnexpectedMessage {
                    expected: "AE_REQUEST",
                    got: request.msg_type(),
                })
            }
        };
        tracing::debug!(session = self.session_number, role = %self.role, "session started");
        replica.check_peer_clocks(&originator_summary, &originator_ack)?;

        // The request must not advertise anything committed after the
        // operations were listed.
        let (missing, summary, ack) = replica.newer_with_snapshot(&originator_summary)?;
        self.send_operations(missing).await?;
        self.send(TsaeMessage::ae_request(self.session_number, summary, ack))
            .await?;

        let mut staged = Vec::new();
        let terminator = self.receive_operations(&mut staged).await?;
        if terminator.body != MessageBody::EndTsae {
            return Err(SyncError::UnexpectedMessage {
                expected: "END_TSAE",
                got: terminator.msg_type(),
            });
        }

        let received = staged.len();
        let commit = replica.commit(Commit {
            summary: originator_summary,
            ack: originator_ack,
            operations: staged,
        })?;

        self.send(TsaeMessage::end_tsae(self.session_number)).await?;
        Ok(self.report(received, commit))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Message helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn send(&mut self, message: TsaeMessage) -> Result<()> {
        tracing::trace!(session = self.session_number, role = %self.role, %message, "send");
        self.conn.send(&message).await
    }

    async fn send_operations(&mut self, ops: Vec<Operation>) -> Result<()> {
        for op in ops {
            self.send(TsaeMessage::operation(self.session_number, op))
                .await?;
            self.sent += 1;
        }
        Ok(())
    }

    /// Receive one message within the configured timeout, without checking
    /// its session number.
    async fn recv_any(&mut self, expecting: &str) -> Result<TsaeMessage> {
        let message = tokio::time::timeout(self.config.message_timeout, self.conn.recv())
            .await
            .map_err(|_| SyncError::Timeout(format!("waiting for {}", expecting)))??;
        tracing::trace!(session = self.session_number, role = %self.role, %message, "recv");
        Ok(message)
    }

    /// Receive the opening request and adopt its session number.
    async fn recv_first(&mut self) -> Result<TsaeMessage> {
        let message = self.recv_any("AE_REQUEST").await?;
        self.session_number = message.session_number;
        Ok(message)
    }

    async fn recv(&mut self, expecting: &str) -> Result<TsaeMessage> {
        let message = self.recv_any(expecting).await?;
        if message.session_number != self.session_number {
            return Err(SyncError::SessionMismatch {
                expected: self.session_number,
                got: message.session_number,
            });
        }
        Ok(message)
    }

    /// Stage operations until the first non-`OPERATION` message, which is
    /// returned.
    async fn receive_operations(&mut self, staged: &mut Vec<Operation>) -> Result<TsaeMessage> {
        loop {
            let message = self.recv("OPERATION").await?;
            match message.body {
                MessageBody::Operation(op) => staged.push(op),
                _ => return Ok(message),
            }
        }
    }

    fn report(&self, received: usize, commit: CommitReport) -> SessionReport {
        SessionReport {
            session_number: self.session_number,
            role: self.role,
            sent: self.sent,
            received,
            commit,
        }
    }

    /// Log the outcome, apply the decode policy and close the connection.
    async fn finish(&mut self, result: Result<SessionReport>) -> Result<SessionReport> {
        match &result {
            Ok(report) => tracing::debug!(
                session = self.session_number,
                role = %self.role,
                sent = report.sent,
                received = report.received,
                purged = report.commit.purged,
                "session complete"
            ),
            Err(e) if e.is_decode() => {
                tracing::error!(
                    session = self.session_number,
                    role = %self.role,
                    error = %e,
                    "malformed message from peer"
                );
                if self.config.decode_policy == DecodePolicy::Terminate {
                    std::process::exit(1);
                }
            }
            Err(e) => tracing::warn!(
                session = self.session_number,
                role = %self.role,
                error = %e,
                "session aborted"
            ),
        }

        if let Err(e) = self.conn.close().await {
            tracing::trace!(session = self.session_number, error = %e, "close failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MsgType;
    use crate::transport::memory::MemoryConnection;
    use tsae_core::{ReplicaId, Timestamp};
    use tsae_store::{MemoryApplier, ReplicaSnapshot};

    fn ids() -> Vec<ReplicaId> {
        vec![ReplicaId::new("a"), ReplicaId::new("b")]
    }

    fn replica(id: &str) -> Replica<MemoryApplier> {
        Replica::new(ReplicaId::new(id), ids(), MemoryApplier::new()).unwrap()
    }

    fn quick_config() -> SyncConfig {
        SyncConfig {
            message_timeout: Duration::from_millis(200),
            ..SyncConfig::default()
        }
    }

    async fn session(
        originator: &Replica<MemoryApplier>,
        partner: &Replica<MemoryApplier>,
    ) -> (SessionReport, SessionReport) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = SyncConfig::default();
        let (mut left, mut right) = MemoryConnection::pair();
        let n = next_session_number();
        let (o, p) = tokio::join!(
            run_originator(originator, &mut left, n, &config),
            run_partner(partner, &mut right, &config),
        );
        (o.unwrap(), p.unwrap())
    }

    fn state(r: &Replica<MemoryApplier>) -> ReplicaSnapshot {
        r.snapshot_state().unwrap()
    }

    #[test]
    fn test_session_numbers_increase() {
        let first = next_session_number();
        let second = next_session_number();
        assert!(first >= 1);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_session_converges() {
        let a = replica("a");
        let b = replica("b");
        a.originate(b"a1".to_vec()).unwrap();
        a.originate(b"a2".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();

        let (o, p) = session(&a, &b).await;
        assert_eq!(o.session_number, p.session_number);
        assert_eq!((o.sent, o.received), (2, 1));
        assert_eq!((p.sent, p.received), (1, 2));
        assert_eq!(a.summary().unwrap(), b.summary().unwrap());

        session(&b, &a).await;

        let summary = a.summary().unwrap();
        assert_eq!(summary.get(&ReplicaId::new("a")), Some(2));
        assert_eq!(summary.get(&ReplicaId::new("b")), Some(1));
        assert_eq!(state(&a).log, state(&b).log);
        assert!(state(&a).log.is_empty());

        let applied = |r: &Replica<MemoryApplier>| {
            r.with_applier(|ap| ap.timestamps().cloned().collect::<Vec<_>>())
                .unwrap()
        };
        let (applied_a, applied_b) = (applied(&a), applied(&b));
        assert_eq!(applied_a, applied_b);
        assert_eq!(applied_a.len(), 3);
    }

    #[tokio::test]
    async fn test_resync_sends_nothing() {
        let a = replica("a");
        let b = replica("b");
        a.originate(b"a1".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();
        session(&a, &b).await;

        let (o, p) = session(&a, &b).await;
        assert_eq!((o.sent, o.received), (0, 0));
        assert_eq!((p.sent, p.received), (0, 0));
    }

    #[tokio::test]
    async fn test_partner_abort_leaves_state_untouched() {
        let a = replica("a");
        let b = replica("b");
        a.originate(b"a1".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();
        let before = state(&b);

        let (mut left, mut right) = MemoryConnection::pair();
        let config = quick_config();
        let fake_originator = async {
            let (summary, ack) = a.snapshot().unwrap();
            left.send(&TsaeMessage::ae_request(5, summary, ack)).await.unwrap();
            while left.recv().await.unwrap().msg_type() != MsgType::AeRequest {}

            // One operation reaches the partner, then the originator vanishes.
            let a1 = a.list_newer(&b.summary().unwrap()).unwrap().remove(0);
            left.send(&TsaeMessage::operation(5, a1)).await.unwrap();
            left.close().await.unwrap();
        };
        let (_, result) = tokio::join!(fake_originator, run_partner(&b, &mut right, &config));

        assert!(matches!(result, Err(SyncError::Closed)));
        assert_eq!(state(&b), before);
        assert!(!b.with_applier(|ap| ap.contains(&Timestamp::new("a", 1))).unwrap());
    }

    #[tokio::test]
    async fn test_originator_abort_leaves_state_untouched() {
        let a = replica("a");
        let b = replica("b");
        a.originate(b"a1".to_vec()).unwrap();
        b.originate(b"b1".to_vec()).unwrap();
        let before = state(&a);

        let (mut left, mut right) = MemoryConnection::pair();
        let config = quick_config();
        let fake_partner = async {
            let request = right.recv().await.unwrap();
            let n = request.session_number;
            for op in b.list_newer(&a.summary().unwrap()).unwrap() {
                right.send(&TsaeMessage::operation(n, op)).await.unwrap();
            }
            let (summary, ack) = b.snapshot().unwrap();
            right.send(&TsaeMessage::ae_request(n, summary, ack)).await.unwrap();
            // Swallow the originator's operations and END, then vanish.
            while let Ok(msg) = right.recv().await {
                if msg.body == MessageBody::EndTsae {
                    break;
                }
            }
            right.close().await.unwrap();
        };
        let (result, _) = tokio::join!(run_originator(&a, &mut left, 77, &config), fake_partner);

        assert!(matches!(result, Err(SyncError::Closed)));
        assert_eq!(state(&a), before);
    }

    #[tokio::test]
    async fn test_session_mismatch_aborts() {
        let a = replica("a");
        let b = replica("b");
        let before = state(&a);

        let (mut left, mut right) = MemoryConnection::pair();
        let config = quick_config();
        let fake_partner = async {
            right.recv().await.unwrap();
            let (summary, ack) = b.snapshot().unwrap();
            right.send(&TsaeMessage::ae_request(999, summary, ack)).await.unwrap();
        };
        let (result, _) = tokio::join!(run_originator(&a, &mut left, 3, &config), fake_partner);

        assert!(matches!(
            result,
            Err(SyncError::SessionMismatch { expected: 3, got: 999 })
        ));
        assert_eq!(state(&a), before);
    }

    #[tokio::test]
    async fn test_partner_rejects_out_of_order_message() {
        let b = replica("b");
        let (mut left, mut right) = MemoryConnection::pair();
        let config = quick_config();

        left.send(&TsaeMessage::end_tsae(4)).await.unwrap();
        let result = run_partner(&b, &mut right, &config).await;

        assert!(matches!(
            result,
            Err(SyncError::UnexpectedMessage {
                expected: "AE_REQUEST",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_aborts_session_only() {
        let b = replica("b");
        b.originate(b"b1".to_vec()).unwrap();
        let before = state(&b);

        let (mut left, mut right) = MemoryConnection::pair();
        left.send_raw(vec![0xff, 0xfe, 0xfd]).await.unwrap();
        let result = run_partner(&b, &mut right, &quick_config()).await;

        assert!(result.unwrap_err().is_decode());
        assert_eq!(state(&b), before);
    }

    #[tokio::test]
    async fn test_stalled_peer_times_out() {
        let a = replica("a");
        let (mut left, _right) = MemoryConnection::pair();
        let config = SyncConfig {
            message_timeout: Duration::from_millis(50),
            ..SyncConfig::default()
        };

        let result = run_originator(&a, &mut left, 8, &config).await;
        assert!(matches!(result, Err(SyncError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_foreign_participant_set_rejected() {
        let a = replica("a");
        let foreign_ids = vec![ReplicaId::new("b"), ReplicaId::new("z")];
        let z = Replica::new(ReplicaId::new("z"), foreign_ids, MemoryApplier::new()).unwrap();
        z.originate(b"z1".to_vec()).unwrap();
        let before = state(&a);

        let config = quick_config();
        let (mut left, mut right) = MemoryConnection::pair();
        let (o, p) = tokio::join!(
            run_originator(&z, &mut left, next_session_number(), &config),
            run_partner(&a, &mut right, &config),
        );

        assert!(matches!(p, Err(SyncError::StoreError(_))));
        assert!(o.is_err());
        assert_eq!(state(&a), before);
    }

    /// Commits `pending` into `replica` while the first OPERATION goes out.
    struct CommitDuringSend<'a> {
        conn: MemoryConnection,
        replica: &'a Replica<MemoryApplier>,
        pending: Option<Commit>,
    }

    #[async_trait::async_trait]
    impl Connection for CommitDuringSend<'_> {
        async fn send(&mut self, message: &TsaeMessage) -> Result<()> {
            if message.msg_type() == MsgType::Operation {
                if let Some(commit) = self.pending.take() {
                    self.replica.commit(commit)?;
                }
            }
            self.conn.send(message).await
        }

        async fn recv(&mut self) -> Result<TsaeMessage> {
            self.conn.recv().await
        }

        async fn close(&mut self) -> Result<()> {
            self.conn.close().await
        }
    }

    #[tokio::test]
    async fn test_partner_request_covers_only_listed_operations() {
        let trio = vec![ReplicaId::new("a"), ReplicaId::new("b"), ReplicaId::new("c")];
        let make = |id: &str| {
            Replica::new(ReplicaId::new(id), trio.clone(), MemoryApplier::new()).unwrap()
        };
        let (a, b, c) = (make("a"), make("b"), make("c"));
        b.originate(b"b1".to_vec()).unwrap();
        let c1 = c.originate(b"c1".to_vec()).unwrap();
        let (c_summary, c_ack) = c.snapshot().unwrap();

        let config = SyncConfig::default();
        let (mut left, right) = MemoryConnection::pair();
        let mut right = CommitDuringSend {
            conn: right,
            replica: &b,
            pending: Some(Commit {
                summary: c_summary,
                ack: c_ack,
                operations: vec![c1.clone()],
            }),
        };
        let (o, p) = tokio::join!(
            run_originator(&a, &mut left, next_session_number(), &config),
            run_partner(&b, &mut right, &config),
        );
        assert_eq!(o.unwrap().received, 1);
        assert_eq!(p.unwrap().sent, 1);

        // b held c1 before its request went out, but had not listed it.
        let c_id = ReplicaId::new("c");
        assert!(b.with_applier(|ap| ap.contains(&c1.timestamp)).unwrap());
        assert_eq!(a.summary().unwrap().get(&c_id), Some(0));

        let (report, _) = session(&a, &b).await;
        assert_eq!(report.received, 1);
        assert!(a.with_applier(|ap| ap.contains(&c1.timestamp)).unwrap());
        assert_eq!(a.summary().unwrap().get(&c_id), Some(1));
    }
}
