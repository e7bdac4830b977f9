//! Signed blocks: the records synced between peers.
//!
//! A block is an immutable message plus a signature over it. The block root
//! is derived from the message alone, so the signature never affects the
//! identity of a block.

use bytes::Bytes;

use crate::canonical::{canonical_message_bytes, ROOT_DOMAIN};
use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::types::BlockRoot;

/// Maximum size of a block body in bytes.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// The unsigned part of a block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockMessage {
    /// Slot the block was proposed in.
    pub slot: u64,

    /// Index of the proposing validator.
    pub proposer_index: u64,

    /// Root of the parent block.
    pub parent_root: BlockRoot,

    /// Post-state commitment.
    pub state_root: Blake3Hash,

    /// Opaque block body (at most [`MAX_BODY_BYTES`]).
    pub body: Bytes,
}

impl BlockMessage {
    /// Compute the block root: Blake3 over the domain tag and canonical bytes.
    pub fn root(&self) -> BlockRoot {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ROOT_DOMAIN);
        hasher.update(&canonical_message_bytes(self));
        BlockRoot(*hasher.finalize().as_bytes())
    }
}

/// A complete block: message + signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedBlock {
    /// The block message.
    pub message: BlockMessage,

    /// Ed25519 signature over the canonical message bytes.
    pub signature: Ed25519Signature,
}

impl SignedBlock {
    /// Compute the block root of the message.
    pub fn root(&self) -> BlockRoot {
        self.message.root()
    }

    /// Get the slot.
    pub fn slot(&self) -> u64 {
        self.message.slot
    }

    /// Get the parent root.
    pub fn parent_root(&self) -> &BlockRoot {
        &self.message.parent_root
    }
}

/// A block together with its root.
///
/// The root is always recomputed from the message; there is no constructor
/// taking a root from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWithRoot {
    root: BlockRoot,
    block: SignedBlock,
}

impl BlockWithRoot {
    /// Pair a block with its freshly computed root.
    pub fn new(block: SignedBlock) -> Self {
        let root = block.root();
        Self { root, block }
    }

    /// The block root.
    pub fn root(&self) -> BlockRoot {
        self.root
    }

    /// The block.
    pub fn block(&self) -> &SignedBlock {
        &self.block
    }

    /// Take the block back out.
    pub fn into_block(self) -> SignedBlock {
        self.block
    }
}

impl From<SignedBlock> for BlockWithRoot {
    fn from(block: SignedBlock) -> Self {
        Self::new(block)
    }
}

/// Builder for creating blocks.
pub struct BlockBuilder {
    slot: u64,
    proposer_index: u64,
    parent_root: BlockRoot,
    state_root: Blake3Hash,
    body: Bytes,
}

impl BlockBuilder {
    /// Start building a block for a slot.
    pub fn new(slot: u64) -> Self {
        Self {
            slot,
            proposer_index: 0,
            parent_root: BlockRoot::ZERO,
            state_root: Blake3Hash::ZERO,
            body: Bytes::new(),
        }
    }

    /// Set the proposer index.
    pub fn proposer(mut self, index: u64) -> Self {
        self.proposer_index = index;
        self
    }

    /// Set the parent root.
    pub fn parent(mut self, parent: BlockRoot) -> Self {
        self.parent_root = parent;
        self
    }

    /// Set the state root.
    pub fn state_root(mut self, state_root: Blake3Hash) -> Self {
        self.state_root = state_root;
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the unsigned message.
    pub fn message(self) -> BlockMessage {
        BlockMessage {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body: self.body,
        }
    }

    /// Build and sign the block.
    pub fn sign(self, keypair: &Keypair) -> SignedBlock {
        let message = self.message();
        let signature = keypair.sign(&canonical_message_bytes(&message));
        SignedBlock { message, signature }
    }
}
