//! Property tests for the memory block store.

use blocksync_core::{canonical_bytes, BlockBuilder, BlockRoot, BlockWithRoot, Keypair};
use blocksync_store::{BlockStore, InsertResult, MemoryBlockStore};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    /// Whatever is stored comes back byte-identical and under its own root.
    #[test]
    fn stored_blocks_export_verbatim(
        slot in any::<u64>(),
        proposer in any::<u64>(),
        parent in any::<[u8; 32]>(),
        body in prop::collection::vec(any::<u8>(), 0..512),
        seed in any::<[u8; 32]>(),
    ) {
        let block = BlockBuilder::new(slot)
            .proposer(proposer)
            .parent(BlockRoot::from_bytes(parent))
            .body(body)
            .sign(&Keypair::from_seed(&seed));
        let expected = canonical_bytes(&block);

        runtime().block_on(async {
            let store = MemoryBlockStore::new();
            let with_root = BlockWithRoot::new(block.clone());
            prop_assert_eq!(store.store(&with_root).await.unwrap(), InsertResult::Inserted);

            let mut exported = Vec::new();
            prop_assert!(store.export(&with_root.root(), &mut exported).await.unwrap());
            prop_assert_eq!(&exported, &expected);
            prop_assert_eq!(store.get(&with_root.root()).await.unwrap(), Some(block));
            Ok(())
        })?;
    }

    /// Count tracks distinct roots across any mix of inserts and removals.
    #[test]
    fn count_matches_live_entries(ops in prop::collection::vec((0u8..8, any::<bool>()), 1..64)) {
        let keypair = Keypair::from_seed(&[7; 32]);
        let blocks: Vec<_> = (0..8u64)
            .map(|slot| BlockWithRoot::new(BlockBuilder::new(slot).sign(&keypair)))
            .collect();

        runtime().block_on(async {
            let store = MemoryBlockStore::new();
            let mut live = std::collections::HashSet::new();

            for (index, insert) in ops {
                let block = &blocks[index as usize];
                if insert {
                    let result = store.store(block).await.unwrap();
                    prop_assert_eq!(result.existed(), !live.insert(block.root()));
                } else {
                    let removed = store.remove(&block.root()).await.unwrap();
                    prop_assert_eq!(removed, live.remove(&block.root()));
                }
            }

            prop_assert_eq!(store.stats().count, live.len() as u64);
            prop_assert_eq!(store.list().await.unwrap().len(), live.len());
            Ok(())
        })?;
    }
}
