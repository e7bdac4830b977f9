//! # Blocksync Core
//!
//! Pure primitives for blocksync: signed blocks, block roots, and canonical
//! encoding.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the block data model.
//!
//! ## Key Types
//!
//! - [`SignedBlock`] - An immutable block message plus its signature
//! - [`BlockRoot`] - Content-addressed identifier of the unsigned message
//! - [`BlockWithRoot`] - A block paired with its recomputed root
//! - [`Canonical`] - Deterministic encoding with a static size bound
//!
//! ## Canonicalization
//!
//! Block messages are encoded using deterministic CBOR. See [`canonical`] module.
//! The root covers the message only, so two blocks that differ only in their
//! signature share a root.

pub mod block;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod types;

pub use block::{BlockBuilder, BlockMessage, BlockWithRoot, SignedBlock, MAX_BODY_BYTES};
pub use canonical::{
    canonical_bytes, canonical_message_bytes, decode_signed_block, decode_value, encode_value,
    Canonical,
};
pub use crypto::{Blake3Hash, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use types::BlockRoot;
