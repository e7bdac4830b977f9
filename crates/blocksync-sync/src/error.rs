//! Error types for the sync module.

use std::time::Duration;

use blocksync_core::{BlockRoot, CoreError};
use blocksync_rpc::{CodecError, PeerId, ProtocolId, RequestPhase, ResultCode, RpcError};
use blocksync_store::StoreError;
use thiserror::Error;

use crate::chain::ChainError;

/// Errors that can occur during a sync-by-root run.
///
/// Chunk indices are zero-based positions in the response, which match
/// positions in the requested root list.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The peer does not speak the blocks-by-root protocol we asked for.
    #[error("peer {peer} does not support protocol {protocol}")]
    UnsupportedProtocol { peer: PeerId, protocol: ProtocolId },

    /// The request did not complete in time.
    #[error("request timed out after {after:?} while {phase}")]
    Timeout { phase: RequestPhase, after: Duration },

    /// A returned block does not hash to the root requested at its position.
    #[error("block {index} has root {actual}, expected {expected}")]
    RootMismatch {
        index: usize,
        expected: BlockRoot,
        actual: BlockRoot,
    },

    /// The peer answered with an error chunk.
    #[error("peer reported {code} at chunk {index}: {message}")]
    PeerReported {
        index: usize,
        code: ResultCode,
        message: String,
    },

    /// The peer used a result code we do not know.
    #[error("chunk {index} ({size} bytes) has unknown result code {code}")]
    UnknownResultCode { index: usize, size: u64, code: u8 },

    /// A success chunk could not be read or decoded.
    #[error("invalid block in chunk {index}: {source}")]
    InvalidChunk {
        index: usize,
        #[source]
        source: CodecError,
    },

    /// Storing a block failed.
    #[error("failed to store block {index}: {source}")]
    Store {
        index: usize,
        #[source]
        source: StoreError,
    },

    /// The chain rejected a block.
    #[error("failed to process block {index}: {source}")]
    Chain {
        index: usize,
        #[source]
        source: ChainError,
    },

    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CoreError),

    /// Any other request failure.
    #[error(transparent)]
    Rpc(RpcError),
}

impl From<RpcError> for SyncError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::UnsupportedProtocol { peer, protocol } => {
                SyncError::UnsupportedProtocol { peer, protocol }
            }
            RpcError::Timeout { phase, after } => SyncError::Timeout { phase, after },
            RpcError::Handler {
                chunk_index,
                source,
            } => match source.downcast::<SyncError>() {
                Ok(err) => *err,
                Err(source) => SyncError::Rpc(RpcError::Handler {
                    chunk_index,
                    source,
                }),
            },
            other => SyncError::Rpc(other),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
