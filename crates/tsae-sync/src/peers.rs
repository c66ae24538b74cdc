//! Peer addressing and random partner selection.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a peer's anti-entropy listener.
///
/// For TCP this is a `host:port` string; for the in-memory network it is any
/// registered name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddr(String);

impl PeerAddr {
    /// Create a peer address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Borrow the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddr {
    fn from(addr: &str) -> Self {
        Self(addr.to_owned())
    }
}

impl From<String> for PeerAddr {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

impl From<std::net::SocketAddr> for PeerAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

/// Chooses the partners of an anti-entropy round.
pub trait PeerSelector: Send + Sync {
    /// Up to `n` distinct partners, chosen at random.
    fn random_partners(&self, n: usize) -> Vec<PeerAddr>;
}

/// A fixed set of peers, sampled without replacement.
#[derive(Debug, Clone, Default)]
pub struct StaticPeers {
    peers: Vec<PeerAddr>,
}

impl StaticPeers {
    /// Create a selector over `peers`.
    pub fn new(peers: Vec<PeerAddr>) -> Self {
        Self { peers }
    }

    /// Create a selector over `peers` without the local listener address.
    pub fn excluding(peers: Vec<PeerAddr>, local: &PeerAddr) -> Self {
        Self {
            peers: peers.into_iter().filter(|p| p != local).collect(),
        }
    }

    /// All known peers.
    pub fn peers(&self) -> &[PeerAddr] {
        &self.peers
    }
}

impl PeerSelector for StaticPeers {
    fn random_partners(&self, n: usize) -> Vec<PeerAddr> {
        let mut rng = rand::thread_rng();
        self.peers.choose_multiple(&mut rng, n).cloned().collect()
    }
}
