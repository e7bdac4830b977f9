//! Request/response engine.
//!
//! [`RpcMethod::run_request`] drives one exchange:
//!
//! ```text
//! Idle -> StreamOpened -> RequestWritten -> AwaitingChunk <-> ChunkHandled -> Closed
//!   \__________________________ any error ___________________________/ -> Failed
//! ```
//!
//! The stream is owned by the exchange and dropped exactly once, whatever
//! the outcome. One deadline covers opening, writing and every read.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::codec::{write_request, ResponseChunk, ResponseReader};
use crate::compression::Compression;
use crate::error::{HandlerError, Result, RpcError};
use crate::host::{BoxedStream, PeerHost};
use crate::protocol::{PeerId, ProtocolId};

/// How many response chunks to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCount {
    /// At most this many; a clean close at a chunk boundary ends early.
    Exact(u64),
    /// Until the peer closes the stream.
    UntilClose,
}

/// Where an exchange is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    StreamOpened,
    RequestWritten,
    AwaitingChunk,
    ChunkHandled,
    Closed,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestPhase::Idle => "opening stream",
            RequestPhase::StreamOpened => "writing request",
            RequestPhase::RequestWritten => "waiting for response",
            RequestPhase::AwaitingChunk => "reading chunk",
            RequestPhase::ChunkHandled => "handling chunk",
            RequestPhase::Closed => "closed",
            RequestPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Receives response chunks in order.
#[async_trait]
pub trait ChunkHandler: Send {
    /// Handle one chunk. An error aborts the exchange.
    async fn on_chunk(
        &mut self,
        chunk: ResponseChunk<'_, BoxedStream>,
    ) -> std::result::Result<(), HandlerError>;
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    /// Chunks handed to the handler.
    pub chunks: u64,
    /// The peer closed before the expected number of chunks.
    pub closed_early: bool,
    /// Wall time of the exchange.
    pub elapsed: Duration,
}

/// A request/response method: protocol id and size limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMethod {
    /// Base protocol id, without compression suffix.
    pub protocol: ProtocolId,
    /// Largest request a responder accepts (uncompressed).
    pub max_request_len: usize,
    /// Largest response chunk payload (uncompressed).
    pub max_chunk_len: usize,
    /// Default number of response chunks.
    pub chunk_count: ChunkCount,
}

impl RpcMethod {
    /// The protocol id for the given compression.
    pub fn protocol_for(&self, compression: Option<&dyn Compression>) -> ProtocolId {
        self.protocol.with_compression(compression)
    }

    /// Run one request against `peer` and feed every response chunk to
    /// `handler`.
    ///
    /// A zero `timeout` means no deadline.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_request<H, C>(
        &self,
        host: &H,
        peer: &PeerId,
        compression: Option<Arc<dyn Compression>>,
        request: &[u8],
        chunk_count: ChunkCount,
        timeout: Duration,
        handler: &mut C,
    ) -> Result<ResponseSummary>
    where
        H: PeerHost + ?Sized,
        C: ChunkHandler + ?Sized,
    {
        let protocol = self.protocol_for(compression.as_deref());
        let started = Instant::now();
        let mut phase = RequestPhase::Idle;

        let result = if timeout.is_zero() {
            self.exchange(
                host,
                peer,
                &protocol,
                compression,
                request,
                chunk_count,
                handler,
                &mut phase,
            )
            .await
        } else {
            let exchange = self.exchange(
                host,
                peer,
                &protocol,
                compression,
                request,
                chunk_count,
                handler,
                &mut phase,
            );
            let outcome = tokio::time::timeout(timeout, exchange).await;
            match outcome {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout {
                    phase,
                    after: timeout,
                }),
            }
        };

        match result {
            Ok(chunks) => {
                let closed_early = matches!(chunk_count, ChunkCount::Exact(n) if chunks < n);
                debug!(%peer, %protocol, chunks, closed_early, "request complete");
                Ok(ResponseSummary {
                    chunks,
                    closed_early,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => {
                debug!(%peer, %protocol, failed_in = %phase, error = %e, "request failed");
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange<H, C>(
        &self,
        host: &H,
        peer: &PeerId,
        protocol: &ProtocolId,
        compression: Option<Arc<dyn Compression>>,
        request: &[u8],
        chunk_count: ChunkCount,
        handler: &mut C,
        phase: &mut RequestPhase,
    ) -> Result<u64>
    where
        H: PeerHost + ?Sized,
        C: ChunkHandler + ?Sized,
    {
        if !host.supports_protocol(peer, protocol).await {
            return Err(RpcError::UnsupportedProtocol {
                peer: *peer,
                protocol: protocol.clone(),
            });
        }

        let mut stream = host
            .open_stream(peer, protocol)
            .await
            .map_err(|source| RpcError::Host { peer: *peer, source })?;
        *phase = RequestPhase::StreamOpened;
        trace!(%peer, %protocol, request_len = request.len(), "stream opened");

        write_request(&mut stream, request, compression.as_deref()).await?;
        stream.shutdown().await?;
        *phase = RequestPhase::RequestWritten;

        let mut reader = ResponseReader::new(stream, compression, self.max_chunk_len);
        let mut handled = 0u64;
        loop {
            if let ChunkCount::Exact(n) = chunk_count {
                if handled >= n {
                    break;
                }
            }

            *phase = RequestPhase::AwaitingChunk;
            let Some(chunk) = reader.next_chunk().await? else {
                break;
            };
            let chunk_index = chunk.index();
            trace!(
                %peer,
                chunk_index,
                chunk_size = chunk.declared_len(),
                result_code = %chunk.result_code(),
                "chunk received"
            );

            handler
                .on_chunk(chunk)
                .await
                .map_err(|source| RpcError::Handler {
                    chunk_index,
                    source,
                })?;
            *phase = RequestPhase::ChunkHandled;
            handled += 1;
        }

        *phase = RequestPhase::Closed;
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        read_request, write_error_chunk, write_success_chunk, ResultCode,
    };
    use crate::compression::ZstdCompression;
    use crate::error::CodecError;
    use crate::host::memory::MemoryHost;
    use crate::host::InboundHandler;
    use tokio::io::AsyncWriteExt;

    const PROTOCOL: &str = "/test/chunks/1/raw";

    fn method() -> RpcMethod {
        RpcMethod {
            protocol: ProtocolId::new(PROTOCOL),
            max_request_len: 64,
            max_chunk_len: 1024,
            chunk_count: ChunkCount::UntilClose,
        }
    }

    /// Answers every request with a fixed list of chunks.
    struct Scripted {
        chunks: Vec<(ResultCode, Vec<u8>)>,
        compression: Option<Arc<dyn Compression>>,
        stall: bool,
    }

    #[async_trait]
    impl InboundHandler for Scripted {
        async fn handle(&self, _peer: PeerId, mut stream: BoxedStream) -> std::result::Result<(), CodecError> {
            let request = read_request(&mut stream, 64, self.compression.as_deref()).await?;
            assert_eq!(request, b"req");
            for (code, payload) in &self.chunks {
                if code.is_success() {
                    write_success_chunk(&mut stream, payload, self.compression.as_deref()).await?;
                } else {
                    let message = String::from_utf8_lossy(payload);
                    write_error_chunk(&mut stream, *code, &message, self.compression.as_deref())
                        .await?;
                }
            }
            if self.stall {
                std::future::pending::<()>().await;
            }
            stream.shutdown().await?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Collect {
        payloads: Vec<(u64, ResultCode, Vec<u8>)>,
        fail_at: Option<u64>,
    }

    #[async_trait]
    impl ChunkHandler for Collect {
        async fn on_chunk(
            &mut self,
            chunk: ResponseChunk<'_, BoxedStream>,
        ) -> std::result::Result<(), HandlerError> {
            let index = chunk.index();
            if self.fail_at == Some(index) {
                return Err("rejected".into());
            }
            let code = chunk.result_code();
            let mut payload = Vec::new();
            chunk.read_payload(&mut payload).await?;
            self.payloads.push((index, code, payload));
            Ok(())
        }
    }

    async fn host_with(script: Scripted, protocol: ProtocolId) -> (Arc<MemoryHost>, PeerId) {
        let host = MemoryHost::new(PeerId::from_bytes([1; 32]));
        let peer = PeerId::from_bytes([2; 32]);
        host.register(peer, protocol, Arc::new(script)).await;
        (host, peer)
    }

    fn chunks(n: u8) -> Vec<(ResultCode, Vec<u8>)> {
        (0..n).map(|i| (ResultCode::Success, vec![i; 4])).collect()
    }

    #[tokio::test]
    async fn test_reads_until_close() {
        let script = Scripted { chunks: chunks(3), compression: None, stall: false };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect::default();
        let summary = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::UntilClose, Duration::from_secs(5), &mut handler)
            .await
            .unwrap();

        assert_eq!(summary.chunks, 3);
        assert!(!summary.closed_early);
        let indices: Vec<_> = handler.payloads.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(handler.payloads[2].2, vec![2; 4]);
    }

    #[tokio::test]
    async fn test_exact_count_stops_reading() {
        let script = Scripted { chunks: chunks(5), compression: None, stall: true };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect::default();
        let summary = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::Exact(2), Duration::from_secs(5), &mut handler)
            .await
            .unwrap();

        assert_eq!(summary.chunks, 2);
        assert!(!summary.closed_early);
        assert_eq!(handler.payloads.len(), 2);
    }

    #[tokio::test]
    async fn test_exact_count_closed_early() {
        let script = Scripted { chunks: chunks(1), compression: None, stall: false };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect::default();
        let summary = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::Exact(4), Duration::ZERO, &mut handler)
            .await
            .unwrap();

        assert_eq!(summary.chunks, 1);
        assert!(summary.closed_early);
    }

    #[tokio::test]
    async fn test_compressed_protocol() {
        let zstd: Arc<dyn Compression> = Arc::new(ZstdCompression::default());
        let script = Scripted {
            chunks: vec![(ResultCode::Success, vec![9; 600]), (ResultCode::ServerError, b"boom".to_vec())],
            compression: Some(Arc::clone(&zstd)),
            stall: false,
        };
        let protocol = method().protocol_for(Some(&*zstd));
        assert_eq!(protocol.as_str(), "/test/chunks/1/raw_zstd");
        let (host, peer) = host_with(script, protocol).await;

        let mut handler = Collect::default();
        method()
            .run_request(&*host, &peer, Some(zstd), b"req", ChunkCount::UntilClose, Duration::from_secs(5), &mut handler)
            .await
            .unwrap();

        assert_eq!(handler.payloads[0].2, vec![9; 600]);
        assert_eq!(handler.payloads[1].1, ResultCode::ServerError);
        assert_eq!(handler.payloads[1].2, b"boom");
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let script = Scripted { chunks: chunks(1), compression: None, stall: false };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;
        let zstd: Arc<dyn Compression> = Arc::new(ZstdCompression::default());

        let mut handler = Collect::default();
        let err = method()
            .run_request(&*host, &peer, Some(zstd), b"req", ChunkCount::UntilClose, Duration::from_secs(5), &mut handler)
            .await
            .unwrap_err();

        match err {
            RpcError::UnsupportedProtocol { peer: p, protocol } => {
                assert_eq!(p, peer);
                assert_eq!(protocol.as_str(), "/test/chunks/1/raw_zstd");
            }
            other => panic!("expected unsupported protocol, got {other:?}"),
        }
        assert!(handler.payloads.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_aborts() {
        let script = Scripted { chunks: chunks(4), compression: None, stall: false };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect { fail_at: Some(1), ..Default::default() };
        let err = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::UntilClose, Duration::from_secs(5), &mut handler)
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Handler { chunk_index: 1, .. }));
        assert_eq!(handler.payloads.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_phase() {
        let script = Scripted { chunks: chunks(1), compression: None, stall: true };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect::default();
        let err = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::UntilClose, Duration::from_secs(2), &mut handler)
            .await
            .unwrap_err();

        match err {
            RpcError::Timeout { phase, after } => {
                assert_eq!(phase, RequestPhase::AwaitingChunk);
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(handler.payloads.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_protocol_violation() {
        let script = Scripted {
            chunks: vec![(ResultCode::Success, vec![0; 2000])],
            compression: None,
            stall: false,
        };
        let (host, peer) = host_with(script, ProtocolId::new(PROTOCOL)).await;

        let mut handler = Collect::default();
        let err = method()
            .run_request(&*host, &peer, None, b"req", ChunkCount::UntilClose, Duration::from_secs(5), &mut handler)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Protocol(CodecError::TooLarge { .. })));
    }
}
