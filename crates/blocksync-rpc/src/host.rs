//! Host abstraction: capability queries and outbound streams.
//!
//! The engine only needs two things from the networking host: whether a
//! peer speaks a protocol, and a bidirectional byte stream for it.
//! Implementations may sit on libp2p, QUIC, or anything else.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CodecError;
use crate::protocol::{PeerId, ProtocolId};

/// A bidirectional stream to a peer.
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Owned, type-erased peer stream.
pub type BoxedStream = Box<dyn PeerStream>;

/// Host trait for opening request/response streams.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PeerHost: Send + Sync {
    /// Whether `peer` advertises `protocol` (exact id, including any
    /// compression suffix).
    async fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> bool;

    /// Open a new outbound stream to `peer` for `protocol`.
    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<BoxedStream>;
}

#[async_trait]
impl<H: PeerHost + ?Sized> PeerHost for Arc<H> {
    async fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> bool {
        (**self).supports_protocol(peer, protocol).await
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<BoxedStream> {
        (**self).open_stream(peer, protocol).await
    }
}

/// Serves inbound streams for one protocol.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one inbound stream from `peer`. The handler owns the stream
    /// and closes it by dropping it.
    async fn handle(&self, peer: PeerId, stream: BoxedStream) -> Result<(), CodecError>;
}

/// An in-memory host for testing.
///
/// Streams are `tokio::io::duplex` pairs; the remote end is handed to the
/// peer's registered [`InboundHandler`] on a spawned task.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;
    use tracing::{debug, warn};

    /// Default duplex buffer size per direction.
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    /// In-memory host implementation.
    pub struct MemoryHost {
        local: PeerId,
        peers: RwLock<HashMap<PeerId, HashMap<ProtocolId, Arc<dyn InboundHandler>>>>,
        buffer_size: usize,
    }

    impl MemoryHost {
        /// Create a host for the local peer `local`.
        pub fn new(local: PeerId) -> Arc<Self> {
            Self::with_buffer_size(local, DEFAULT_BUFFER_SIZE)
        }

        /// Create a host whose streams buffer `buffer_size` bytes per
        /// direction.
        pub fn with_buffer_size(local: PeerId, buffer_size: usize) -> Arc<Self> {
            Arc::new(Self {
                local,
                peers: RwLock::new(HashMap::new()),
                buffer_size,
            })
        }

        /// The local peer ID, as seen by inbound handlers.
        pub fn local_peer(&self) -> PeerId {
            self.local
        }

        /// Make `peer` serve `protocol` with `handler`.
        pub async fn register(
            &self,
            peer: PeerId,
            protocol: ProtocolId,
            handler: Arc<dyn InboundHandler>,
        ) {
            self.peers
                .write()
                .await
                .entry(peer)
                .or_default()
                .insert(protocol, handler);
        }

        /// Remove a peer and all of its protocols.
        pub async fn disconnect(&self, peer: &PeerId) -> bool {
            self.peers.write().await.remove(peer).is_some()
        }

        /// Protocols a peer serves.
        pub async fn protocols(&self, peer: &PeerId) -> Vec<ProtocolId> {
            self.peers
                .read()
                .await
                .get(peer)
                .map(|protocols| protocols.keys().cloned().collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl PeerHost for MemoryHost {
        async fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> bool {
            self.peers
                .read()
                .await
                .get(peer)
                .is_some_and(|protocols| protocols.contains_key(protocol))
        }

        async fn open_stream(
            &self,
            peer: &PeerId,
            protocol: &ProtocolId,
        ) -> io::Result<BoxedStream> {
            let handler = {
                let peers = self.peers.read().await;
                let protocols = peers
                    .get(peer)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "peer not found"))?;
                protocols.get(protocol).cloned().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "protocol not served")
                })?
            };

            let (local, remote) = tokio::io::duplex(self.buffer_size);
            let from = self.local;
            let peer = *peer;
            let protocol = protocol.clone();
            tokio::spawn(async move {
                debug!(%peer, %protocol, "inbound stream");
                if let Err(e) = handler.handle(from, Box::new(remote)).await {
                    warn!(%peer, %protocol, error = %e, "inbound handler failed");
                }
            });

            Ok(Box::new(local))
        }
    }

    impl std::fmt::Debug for MemoryHost {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MemoryHost")
                .field("local", &self.local)
                .field("buffer_size", &self.buffer_size)
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryHost;
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Echo;

    #[async_trait]
    impl InboundHandler for Echo {
        async fn handle(&self, _peer: PeerId, mut stream: BoxedStream) -> Result<(), CodecError> {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            stream.write_all(&buf).await?;
            stream.shutdown().await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_memory_host_capabilities() {
        let host = MemoryHost::new(PeerId::from_bytes([0xaa; 32]));
        let peer = PeerId::from_bytes([0xbb; 32]);
        let echo = ProtocolId::new("/test/echo/1/raw");

        assert!(!host.supports_protocol(&peer, &echo).await);
        host.register(peer, echo.clone(), Arc::new(Echo)).await;
        assert!(host.supports_protocol(&peer, &echo).await);
        assert!(
            !host
                .supports_protocol(&peer, &ProtocolId::new("/test/other/1/raw"))
                .await
        );
        assert_eq!(host.protocols(&peer).await, vec![echo.clone()]);

        assert!(host.disconnect(&peer).await);
        assert!(!host.supports_protocol(&peer, &echo).await);
        let err = host.open_stream(&peer, &echo).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    struct WhoAmI;

    #[async_trait]
    impl InboundHandler for WhoAmI {
        async fn handle(&self, peer: PeerId, mut stream: BoxedStream) -> Result<(), CodecError> {
            stream.write_all(peer.as_bytes()).await?;
            stream.shutdown().await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_inbound_handler_sees_local_peer() {
        let host = MemoryHost::new(PeerId::from_bytes([0xaa; 32]));
        let peer = PeerId::from_bytes([0xbb; 32]);
        let whoami = ProtocolId::new("/test/whoami/1/raw");
        host.register(peer, whoami.clone(), Arc::new(WhoAmI)).await;

        let mut stream = host.open_stream(&peer, &whoami).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, host.local_peer().as_bytes());
    }

    #[tokio::test]
    async fn test_memory_host_stream() {
        let host = MemoryHost::new(PeerId::from_bytes([0xaa; 32]));
        let peer = PeerId::from_bytes([0xbb; 32]);
        let echo = ProtocolId::new("/test/echo/1/raw");
        host.register(peer, echo.clone(), Arc::new(Echo)).await;

        let mut stream = host.open_stream(&peer, &echo).await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"ping");
    }
}
