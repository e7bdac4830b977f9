//! Proptest generators for property-based testing.

use proptest::prelude::*;

use blocksync_core::{BlockBuilder, BlockRoot, Blake3Hash, Keypair, SignedBlock};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random BlockRoot.
pub fn block_root() -> impl Strategy<Value = BlockRoot> {
    any::<[u8; 32]>().prop_map(BlockRoot::from_bytes)
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate body bytes of at most `max_len`.
pub fn body(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating a block.
#[derive(Debug, Clone)]
pub struct BlockParams {
    pub keypair: Keypair,
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: BlockRoot,
    pub state_root: Blake3Hash,
    pub body: Vec<u8>,
}

impl Arbitrary for BlockParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            keypair(),
            any::<u64>(),
            0u64..=1_000_000u64, // proposer
            block_root(),
            blake3_hash(),
            body(512),
        )
            .prop_map(|(keypair, slot, proposer_index, parent_root, state_root, body)| BlockParams {
                keypair,
                slot,
                proposer_index,
                parent_root,
                state_root,
                body,
            })
            .boxed()
    }
}

/// Build and sign a block from parameters.
pub fn block_from_params(params: &BlockParams) -> SignedBlock {
    BlockBuilder::new(params.slot)
        .proposer(params.proposer_index)
        .parent(params.parent_root)
        .state_root(params.state_root)
        .body(params.body.clone())
        .sign(&params.keypair)
}

/// Generate a signed block.
pub fn signed_block() -> impl Strategy<Value = SignedBlock> {
    any::<BlockParams>().prop_map(|params| block_from_params(&params))
}

/// Generate up to `max_len` signed blocks with distinct roots.
pub fn distinct_blocks(max_len: usize) -> impl Strategy<Value = Vec<SignedBlock>> {
    prop::collection::vec(signed_block(), 0..=max_len).prop_map(|blocks| {
        let mut seen = std::collections::HashSet::new();
        blocks
            .into_iter()
            .filter(|block| seen.insert(block.root()))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_core::{canonical_bytes, decode_signed_block};

    proptest! {
        #[test]
        fn test_root_deterministic(params: BlockParams) {
            let a = block_from_params(&params);
            let b = block_from_params(&params);

            prop_assert_eq!(a.root(), b.root());
            prop_assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        }

        #[test]
        fn test_decode_recovers_block(block in signed_block()) {
            let decoded = decode_signed_block(&canonical_bytes(&block)).unwrap();
            prop_assert_eq!(decoded.root(), block.root());
            prop_assert_eq!(decoded.signature, block.signature);
        }

        #[test]
        fn test_root_changes_with_body(
            seed in any::<[u8; 32]>(),
            b1 in body(64),
            b2 in body(64),
        ) {
            prop_assume!(b1 != b2);

            let kp = Keypair::from_seed(&seed);
            let r1 = BlockBuilder::new(1).body(b1).sign(&kp);
            let r2 = BlockBuilder::new(1).body(b2).sign(&kp);

            prop_assert_ne!(r1.root(), r2.root());
        }
    }
}
