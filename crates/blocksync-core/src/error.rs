//! Error types for blocksync core.

use thiserror::Error;

/// Errors that can occur while encoding or decoding blocks and requests.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("block body of {size} bytes exceeds maximum of {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("encoded value of {size} bytes exceeds maximum of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("non-canonical encoding")]
    NonCanonical,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
