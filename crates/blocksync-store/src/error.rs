//! Error types for the store module.

use blocksync_core::{BlockRoot, CoreError, Ed25519Signature};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The block could not be serialized.
    #[error("failed to encode block {root}: {source}")]
    Encode {
        root: BlockRoot,
        #[source]
        source: CoreError,
    },

    /// The input bytes are not a valid block.
    #[error("failed to decode block: {0}")]
    Decode(#[source] CoreError),

    /// A block with this root exists with a different signature. The stored
    /// block is kept.
    #[error("block {root} already exists, but its signature {existing} does not match new signature {incoming}")]
    Conflict {
        root: BlockRoot,
        existing: Ed25519Signature,
        incoming: Ed25519Signature,
    },

    /// I/O error while reading or writing block bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this is a signature conflict (which implies the root existed).
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
