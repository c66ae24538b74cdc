//! Transport abstraction for the TSAE protocol.
//!
//! A session runs over one [`Connection`]: a reliable, ordered, bidirectional
//! message channel. Originators obtain connections from a [`Connector`];
//! partners accept them from a [`Listener`].

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::messages::TsaeMessage;
use crate::peers::PeerAddr;

/// One end of a session connection.
#[async_trait]
pub trait Connection: Send {
    /// Send a message to the other end.
    async fn send(&mut self, message: &TsaeMessage) -> Result<()>;

    /// Receive the next message.
    ///
    /// Returns [`SyncError::Closed`] once the other end is gone and
    /// [`SyncError::Decode`] for a malformed frame.
    async fn recv(&mut self) -> Result<TsaeMessage>;

    /// Close this end of the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to peers (originator side).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced.
    type Conn: Connection + 'static;

    /// Connect to `peer`.
    async fn connect(&self, peer: &PeerAddr) -> Result<Self::Conn>;
}

/// Accepts inbound connections (partner side).
#[async_trait]
pub trait Listener: Send {
    /// Connection type produced.
    type Conn: Connection + 'static;

    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> Result<Self::Conn>;
}

/// An in-memory transport for testing.
///
/// Connections are pairs of channels carrying encoded frames, so malformed
/// input and abrupt disconnects can be simulated exactly as on a socket.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};

    const CHANNEL_CAPACITY: usize = 1000;

    /// One end of an in-memory connection.
    pub struct MemoryConnection {
        tx: Option<mpsc::Sender<Vec<u8>>>,
        rx: mpsc::Receiver<Vec<u8>>,
    }

    impl MemoryConnection {
        /// Create two connected ends.
        pub fn pair() -> (Self, Self) {
            let (tx_a, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
            let (tx_b, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
            (
                Self {
                    tx: Some(tx_a),
                    rx: rx_a,
                },
                Self {
                    tx: Some(tx_b),
                    rx: rx_b,
                },
            )
        }

        /// Send an arbitrary frame, bypassing encoding.
        pub async fn send_raw(&mut self, frame: Vec<u8>) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SyncError::TransportError("connection closed".into()))?;
            tx.send(frame)
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        async fn send(&mut self, message: &TsaeMessage) -> Result<()> {
            let frame = message.encode()?;
            self.send_raw(frame).await
        }

        async fn recv(&mut self) -> Result<TsaeMessage> {
            match self.rx.recv().await {
                Some(frame) => TsaeMessage::decode(&frame),
                None => Err(SyncError::Closed),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.tx = None;
            self.rx.close();
            Ok(())
        }
    }

    /// Registry of in-memory listeners.
    pub struct MemoryNetwork {
        listeners: RwLock<HashMap<PeerAddr, mpsc::Sender<MemoryConnection>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register a listener at `addr`, replacing any previous one.
        pub async fn listen(self: &Arc<Self>, addr: impl Into<PeerAddr>) -> MemoryListener {
            let addr = addr.into();
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            self.listeners.write().await.insert(addr.clone(), tx);
            MemoryListener { addr, rx }
        }

        /// A connector dialing into this network.
        pub fn connector(self: &Arc<Self>) -> MemoryConnector {
            MemoryConnector {
                network: Arc::clone(self),
            }
        }

        /// Unregister the listener at `addr`. Returns whether one existed.
        pub async fn disconnect(&self, addr: &PeerAddr) -> bool {
            self.listeners.write().await.remove(addr).is_some()
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                listeners: RwLock::new(HashMap::new()),
            }
        }
    }

    /// Connector for a [`MemoryNetwork`].
    #[derive(Clone)]
    pub struct MemoryConnector {
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Conn = MemoryConnection;

        async fn connect(&self, peer: &PeerAddr) -> Result<MemoryConnection> {
            let listener = self
                .network
                .listeners
                .read()
                .await
                .get(peer)
                .cloned()
                .ok_or_else(|| SyncError::TransportError(format!("connection refused: {}", peer)))?;

            let (client, server) = MemoryConnection::pair();
            listener
                .send(server)
                .await
                .map_err(|_| SyncError::TransportError(format!("listener gone: {}", peer)))?;
            Ok(client)
        }
    }

    /// Listener registered on a [`MemoryNetwork`].
    pub struct MemoryListener {
        addr: PeerAddr,
        rx: mpsc::Receiver<MemoryConnection>,
    }

    impl MemoryListener {
        /// The address this listener is registered under.
        pub fn addr(&self) -> &PeerAddr {
            &self.addr
        }
    }

    #[async_trait]
    impl Listener for MemoryListener {
        type Conn = MemoryConnection;

        async fn accept(&mut self) -> Result<MemoryConnection> {
            self.rx.recv().await.ok_or(SyncError::Closed)
        }
    }
}

/// TCP transport.
///
/// Frames are a 4-byte big-endian length followed by the CBOR-encoded message.
pub mod tcp {
    use super::*;
    use crate::messages::limits;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// A session connection over TCP.
    pub struct TcpConnection {
        stream: TcpStream,
        peer: PeerAddr,
    }

    impl TcpConnection {
        /// Wrap an established stream.
        pub fn new(stream: TcpStream, peer: PeerAddr) -> Self {
            Self { stream, peer }
        }

        /// Address of the other end.
        pub fn peer(&self) -> &PeerAddr {
            &self.peer
        }
    }

    #[async_trait]
    impl Connection for TcpConnection {
        async fn send(&mut self, message: &TsaeMessage) -> Result<()> {
            let frame = message.encode()?;
            self.stream.write_u32(frame.len() as u32).await?;
            self.stream.write_all(&frame).await?;
            self.stream.flush().await?;
            Ok(())
        }

        async fn recv(&mut self) -> Result<TsaeMessage> {
            let len = match self.stream.read_u32().await {
                Ok(len) => len as usize,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(SyncError::Closed)
                }
                Err(e) => return Err(e.into()),
            };
            if len > limits::MAX_FRAME_LEN {
                return Err(SyncError::FrameTooLarge {
                    len,
                    max: limits::MAX_FRAME_LEN,
                });
            }

            let mut frame = vec![0u8; len];
            self.stream.read_exact(&mut frame).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    SyncError::Closed
                } else {
                    e.into()
                }
            })?;
            TsaeMessage::decode(&frame)
        }

        async fn close(&mut self) -> Result<()> {
            self.stream.shutdown().await?;
            Ok(())
        }
    }

    /// Dials peers over TCP. Peer addresses are `host:port` strings.
    #[derive(Debug, Clone, Default)]
    pub struct TcpConnector;

    #[async_trait]
    impl Connector for TcpConnector {
        type Conn = TcpConnection;

        async fn connect(&self, peer: &PeerAddr) -> Result<TcpConnection> {
            let stream = TcpStream::connect(peer.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(TcpConnection::new(stream, peer.clone()))
        }
    }

    /// Accepts TSAE sessions over TCP.
    pub struct TcpListener {
        inner: tokio::net::TcpListener,
    }

    impl TcpListener {
        /// Bind to `addr` (`host:port`; port 0 picks a free port).
        pub async fn bind(addr: &str) -> Result<Self> {
            Ok(Self {
                inner: tokio::net::TcpListener::bind(addr).await?,
            })
        }

        /// The bound address.
        pub fn local_addr(&self) -> Result<PeerAddr> {
            Ok(self.inner.local_addr()?.into())
        }
    }

    #[async_trait]
    impl Listener for TcpListener {
        type Conn = TcpConnection;

        async fn accept(&mut self) -> Result<TcpConnection> {
            let (stream, addr) = self.inner.accept().await?;
            stream.set_nodelay(true)?;
            Ok(TcpConnection::new(stream, addr.into()))
        }
    }
}
