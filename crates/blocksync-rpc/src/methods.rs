//! Method catalogue: blocks-by-root and ping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blocksync_core::{decode_value, encode_value, BlockRoot, Canonical, CoreError, SignedBlock};
use ciborium::value::Value;
use tokio::io::AsyncWriteExt;

use crate::codec::{read_request, write_error_chunk, write_success_chunk, ResponseChunk, ResultCode};
use crate::compression::Compression;
use crate::error::{CodecError, HandlerError, Result};
use crate::host::{BoxedStream, InboundHandler, PeerHost};
use crate::method::{ChunkCount, ChunkHandler, RpcMethod};
use crate::protocol::{PeerId, ProtocolId};

/// Largest number of roots a responder serves in one request.
pub const MAX_REQUEST_BLOCKS: usize = 1024;

/// Base protocol id of blocks-by-root v1.
pub const BLOCKS_BY_ROOT_V1: &str = "/blocksync/req/blocks_by_root/1/cbor";

/// Base protocol id of ping v1.
pub const PING_V1: &str = "/blocksync/req/ping/1/cbor";

/// Encoded size of one root in a request: 2-byte header + 32 bytes.
const ENCODED_ROOT_LEN: usize = 2 + BlockRoot::LEN;

/// Blocks by root: request a list of roots, receive one chunk per block.
pub fn blocks_by_root_v1() -> RpcMethod {
    RpcMethod {
        protocol: ProtocolId::new(BLOCKS_BY_ROOT_V1),
        max_request_len: BlocksByRootRequest::max_encoded_len(MAX_REQUEST_BLOCKS),
        max_chunk_len: SignedBlock::MAX_ENCODED_LEN,
        chunk_count: ChunkCount::UntilClose,
    }
}

/// Ping: exchange sequence numbers, one chunk.
pub fn ping_v1() -> RpcMethod {
    RpcMethod {
        protocol: ProtocolId::new(PING_V1),
        max_request_len: 9,
        max_chunk_len: 9,
        chunk_count: ChunkCount::Exact(1),
    }
}

/// A blocks-by-root request: a CBOR array of 32-byte byte strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlocksByRootRequest {
    pub roots: Vec<BlockRoot>,
}

impl BlocksByRootRequest {
    pub fn new(roots: Vec<BlockRoot>) -> Self {
        Self { roots }
    }

    /// Encoded size of a request carrying `count` roots.
    pub const fn max_encoded_len(count: usize) -> usize {
        // Array headers are at most 9 bytes.
        9 + count * ENCODED_ROOT_LEN
    }

    /// Canonical encoding.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, CoreError> {
        let items = self
            .roots
            .iter()
            .map(|root| Value::Bytes(root.as_bytes().to_vec()))
            .collect();
        encode_value(&Value::Array(items))
    }

    /// Decode a request, rejecting trailing or non-canonical bytes.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, CoreError> {
        let (value, consumed) = decode_value(bytes)?;
        if consumed != bytes.len() {
            return Err(CoreError::DecodingError(format!(
                "{} trailing bytes after request",
                bytes.len() - consumed
            )));
        }
        let Value::Array(items) = value else {
            return Err(CoreError::DecodingError("expected array of roots".into()));
        };

        let roots = items
            .iter()
            .map(|item| match item {
                Value::Bytes(b) => BlockRoot::try_from(b.as_slice())
                    .map_err(|_| CoreError::DecodingError(format!("root of {} bytes", b.len()))),
                _ => Err(CoreError::DecodingError("expected byte string".into())),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let request = Self { roots };
        if request.encode()? != bytes {
            return Err(CoreError::NonCanonical);
        }
        Ok(request)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ping
// ─────────────────────────────────────────────────────────────────────────────

/// Ping request: the sender's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping(pub u64);

/// Ping response: the responder's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong(pub u64);

fn encode_seq(seq: u64) -> std::result::Result<Vec<u8>, CoreError> {
    encode_value(&Value::Integer(seq.into()))
}

fn decode_seq(bytes: &[u8]) -> std::result::Result<u64, CoreError> {
    match decode_value(bytes)? {
        (Value::Integer(i), consumed) if consumed == bytes.len() => u64::try_from(i)
            .map_err(|_| CoreError::DecodingError("sequence number out of range".into())),
        _ => Err(CoreError::DecodingError("expected unsigned integer".into())),
    }
}

impl Ping {
    pub fn encode(&self) -> std::result::Result<Vec<u8>, CoreError> {
        encode_seq(self.0)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, CoreError> {
        decode_seq(bytes).map(Ping)
    }
}

impl Pong {
    pub fn encode(&self) -> std::result::Result<Vec<u8>, CoreError> {
        encode_seq(self.0)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, CoreError> {
        decode_seq(bytes).map(Pong)
    }
}

#[derive(Default)]
struct PongHandler {
    pong: Option<Pong>,
}

#[async_trait]
impl ChunkHandler for PongHandler {
    async fn on_chunk(
        &mut self,
        chunk: ResponseChunk<'_, BoxedStream>,
    ) -> std::result::Result<(), HandlerError> {
        let code = chunk.result_code();
        if !code.is_success() {
            let message = chunk.read_error_message().await?;
            return Err(format!("peer answered ping with {code}: {message}").into());
        }
        let mut payload = Vec::new();
        chunk.read_payload(&mut payload).await?;
        self.pong = Some(Pong::decode(&payload)?);
        Ok(())
    }
}

/// Ping `peer`, returning its pong if it answered.
pub async fn ping<H>(
    host: &H,
    peer: &PeerId,
    compression: Option<Arc<dyn Compression>>,
    ping: Ping,
    timeout: Duration,
) -> Result<Option<Pong>>
where
    H: PeerHost + ?Sized,
{
    let method = ping_v1();
    let request = ping.encode().map_err(CodecError::Encode)?;
    let mut handler = PongHandler::default();
    method
        .run_request(
            host,
            peer,
            compression,
            &request,
            method.chunk_count,
            timeout,
            &mut handler,
        )
        .await?;
    Ok(handler.pong)
}

/// Answers pings with a local sequence number.
#[derive(Debug)]
pub struct PingResponder {
    seq: AtomicU64,
    compression: Option<Arc<dyn Compression>>,
}

impl PingResponder {
    pub fn new(seq: u64, compression: Option<Arc<dyn Compression>>) -> Self {
        Self {
            seq: AtomicU64::new(seq),
            compression,
        }
    }

    /// The protocol id this responder serves.
    pub fn protocol(&self) -> ProtocolId {
        ping_v1().protocol_for(self.compression.as_deref())
    }

    /// Change the advertised sequence number.
    pub fn set_seq(&self, seq: u64) {
        self.seq.store(seq, Ordering::Relaxed);
    }
}

#[async_trait]
impl InboundHandler for PingResponder {
    async fn handle(&self, peer: PeerId, mut stream: BoxedStream) -> std::result::Result<(), CodecError> {
        let compression = self.compression.as_deref();
        let request = read_request(&mut stream, ping_v1().max_request_len, compression).await;
        match request.and_then(|bytes| Ping::decode(&bytes).map_err(CodecError::Decode)) {
            Ok(Ping(theirs)) => {
                tracing::trace!(%peer, seq = theirs, "ping");
                let pong = Pong(self.seq.load(Ordering::Relaxed))
                    .encode()
                    .map_err(CodecError::Encode)?;
                write_success_chunk(&mut stream, &pong, compression).await?;
            }
            Err(CodecError::Io(e)) => return Err(CodecError::Io(e)),
            Err(e) => {
                write_error_chunk(&mut stream, ResultCode::InvalidRequest, &e.to_string(), compression)
                    .await?;
            }
        }
        stream.shutdown().await?;
        Ok(())
    }
}
