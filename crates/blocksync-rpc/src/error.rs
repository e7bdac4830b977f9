//! Error types for the rpc module.

use std::io;
use std::time::Duration;

use blocksync_core::CoreError;
use thiserror::Error;

use crate::method::RequestPhase;
use crate::protocol::{PeerId, ProtocolId};

/// Error returned by a [`ChunkHandler`](crate::ChunkHandler).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while framing or unframing chunks.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying stream failed or ended mid-frame.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A uvarint ran past ten bytes or beyond `u64::MAX`.
    #[error("uvarint overflows u64")]
    VarintOverflow,

    /// A uvarint used more bytes than needed.
    #[error("non-minimal uvarint encoding")]
    VarintOverlong,

    /// A declared length is above its limit.
    #[error("{what} of {len} bytes exceeds limit of {max}")]
    TooLarge {
        what: &'static str,
        len: u64,
        max: u64,
    },

    /// The stream closed before the declared payload arrived.
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// Decompressed payload length differs from the declared length.
    #[error("decompressed length {actual} does not match declared length {declared}")]
    LengthMismatch { declared: u64, actual: u64 },

    /// The compressor or decompressor failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// No compression is known by this name.
    #[error("unknown compression {0:?}")]
    UnknownCompression(String),

    /// The payload is not a valid value of the expected type.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] CoreError),

    /// The payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] CoreError),
}

/// Errors from running a request against a peer.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The peer does not advertise the protocol. Never retried.
    #[error("peer {peer} does not support protocol {protocol}")]
    UnsupportedProtocol { peer: PeerId, protocol: ProtocolId },

    /// The request did not complete within its deadline.
    #[error("request timed out after {after:?} while {phase}")]
    Timeout { phase: RequestPhase, after: Duration },

    /// The peer violated the framing rules.
    #[error("protocol violation: {0}")]
    Protocol(CodecError),

    /// Stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// The chunk handler rejected a chunk.
    #[error("chunk {chunk_index} rejected: {source}")]
    Handler {
        chunk_index: u64,
        #[source]
        source: HandlerError,
    },

    /// The host could not open a stream.
    #[error("failed to open stream to {peer}: {source}")]
    Host {
        peer: PeerId,
        #[source]
        source: io::Error,
    },
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => RpcError::Io(e),
            other => RpcError::Protocol(other),
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        RpcError::Io(err)
    }
}

/// Result type for rpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;
