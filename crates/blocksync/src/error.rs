//! Error types for the client.

use blocksync_core::CoreError;
use blocksync_rpc::{CodecError, RpcError};
use blocksync_store::StoreError;
use blocksync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Encoding or decoding error.
    #[error("encoding error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Framing or compression error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Request error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
