//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use blocksync_core::{BlockBuilder, BlockRoot, BlockWithRoot, Keypair, SignedBlock};
use blocksync_rpc::{
    BlocksByRootResponder, Compression, InboundHandler, MemoryHost, PeerId, PingResponder,
};
use blocksync_store::{BlockStore, MemoryBlockStore};
use blocksync_sync::{Chain, ChainError};

/// A test fixture holding a signing keypair.
pub struct TestFixture {
    pub keypair: Keypair,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
        }
    }

    /// Sign a block for `slot` with `parent` and `body`.
    pub fn block(&self, slot: u64, parent: BlockRoot, body: &[u8]) -> SignedBlock {
        BlockBuilder::new(slot)
            .parent(parent)
            .body(body.to_vec())
            .sign(&self.keypair)
    }

    /// A chain of `len` blocks, slots `0..len`, each linked to the previous.
    pub fn chain(&self, len: u64) -> Vec<SignedBlock> {
        let mut parent = BlockRoot::ZERO;
        (0..len)
            .map(|slot| {
                let block = self.block(slot, parent, &slot.to_be_bytes());
                parent = block.root();
                block
            })
            .collect()
    }

    /// Re-sign `block` with a different key: same root, different signature.
    pub fn resign(&self, block: &SignedBlock, seed: [u8; 32]) -> SignedBlock {
        let other = Keypair::from_seed(&seed);
        SignedBlock {
            message: block.message.clone(),
            signature: other.sign(&blocksync_core::canonical_message_bytes(&block.message)),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures with distinct deterministic keys.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Roots of `blocks`, in order.
pub fn roots(blocks: &[SignedBlock]) -> Vec<BlockRoot> {
    blocks.iter().map(SignedBlock::root).collect()
}

/// Put `blocks` into `store`.
pub async fn seed_store<S: BlockStore + ?Sized>(store: &S, blocks: &[SignedBlock]) {
    for block in blocks {
        if let Err(e) = store.store(&BlockWithRoot::new(block.clone())).await {
            panic!("seeding store failed: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chain view
// ─────────────────────────────────────────────────────────────────────────────

/// A chain view that records every block handed to it.
#[derive(Default)]
pub struct RecordingChain {
    blocks: Mutex<Vec<SignedBlock>>,
    reject_slot: Option<u64>,
}

impl RecordingChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A chain that refuses the block at `slot`.
    pub fn rejecting(slot: u64) -> Arc<Self> {
        Arc::new(Self {
            reject_slot: Some(slot),
            ..Default::default()
        })
    }

    /// Roots of the accepted blocks, in arrival order.
    pub fn roots(&self) -> Vec<BlockRoot> {
        self.blocks.lock().iter().map(SignedBlock::root).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }
}

#[async_trait]
impl Chain for RecordingChain {
    async fn add_block(&self, block: &SignedBlock) -> Result<(), ChainError> {
        if self.reject_slot == Some(block.slot()) {
            return Err(format!("block at slot {} rejected", block.slot()).into());
        }
        self.blocks.lock().push(block.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

/// A local host plus one remote peer.
pub struct TestNetwork {
    pub host: Arc<MemoryHost>,
    pub local: PeerId,
    pub peer: PeerId,
    pub remote: Arc<MemoryBlockStore>,
}

impl TestNetwork {
    /// A network whose peer has nothing registered yet.
    pub fn new() -> Self {
        let local = PeerId::from_bytes([1; 32]);
        Self {
            host: MemoryHost::new(local),
            local,
            peer: PeerId::from_bytes([2; 32]),
            remote: Arc::new(MemoryBlockStore::new()),
        }
    }

    /// A network whose peer serves blocks-by-root and ping from `remote`.
    pub async fn serving(compression: Option<Arc<dyn Compression>>) -> Self {
        let network = Self::new();
        let responder = BlocksByRootResponder::new(Arc::clone(&network.remote), compression.clone());
        network.serve(responder.protocol(), Arc::new(responder)).await;
        let ping = PingResponder::new(0, compression);
        network.serve(ping.protocol(), Arc::new(ping)).await;
        network
    }

    /// Register `handler` for `protocol` on the remote peer.
    pub async fn serve(&self, protocol: blocksync_rpc::ProtocolId, handler: Arc<dyn InboundHandler>) {
        self.host.register(self.peer, protocol, handler).await;
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_links_parents() {
        let fixture = TestFixture::with_seed([3; 32]);
        let blocks = fixture.chain(4);

        assert_eq!(blocks[0].parent_root(), &BlockRoot::ZERO);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].parent_root(), &pair[0].root());
        }
    }

    #[test]
    fn test_resign_keeps_root() {
        let fixture = TestFixture::with_seed([3; 32]);
        let block = fixture.block(1, BlockRoot::ZERO, b"x");
        let other = fixture.resign(&block, [9; 32]);

        assert_eq!(block.root(), other.root());
        assert_ne!(block.signature, other.signature);
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);
        let keys: Vec<_> = parties.iter().map(|p| p.keypair.public_key_bytes()).collect();
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[tokio::test]
    async fn test_recording_chain_rejects_slot() {
        let fixture = TestFixture::with_seed([3; 32]);
        let blocks = fixture.chain(2);
        let chain = RecordingChain::rejecting(1);

        chain.add_block(&blocks[0]).await.unwrap();
        assert!(chain.add_block(&blocks[1]).await.is_err());
        assert_eq!(chain.roots(), vec![blocks[0].root()]);
    }
}
