//! In-memory implementation of the BlockStore trait.
//!
//! Entries live in a lock-striped `DashMap`; the only serialization points
//! are the per-root entry lock (insert-if-absent) and the removal lock.
//! Serialized bytes are held in pooled buffers shared by reference count
//! with any open [`BlockReader`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use blocksync_core::{
    decode_signed_block, BlockRoot, BlockWithRoot, Canonical, CoreError, Ed25519Signature,
    SignedBlock,
};

use crate::error::{Result, StoreError};
use crate::pool::{BufferPool, PooledBuffer, DEFAULT_MAX_RETAINED};
use crate::traits::{BlockReader, BlockStore, InsertResult, StoreStats};

/// One stored block: its serialized bytes and the signature they carry.
struct StoredBlock {
    bytes: PooledBuffer,
    signature: Ed25519Signature,
}

impl AsRef<[u8]> for StoredBlock {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Concurrent in-memory block store.
///
/// All data is lost when the store is dropped. Share it between tasks with
/// `Arc<MemoryBlockStore>`.
pub struct MemoryBlockStore {
    blocks: DashMap<BlockRoot, Arc<StoredBlock>>,
    removal_lock: Mutex<()>,
    count: AtomicU64,
    last_write: Mutex<Option<BlockRoot>>,
    pool: Arc<BufferPool>,
}

impl MemoryBlockStore {
    /// Create a new empty store with its own buffer pool.
    pub fn new() -> Self {
        Self::with_pool(BufferPool::new(
            SignedBlock::MAX_ENCODED_LEN,
            DEFAULT_MAX_RETAINED,
        ))
    }

    /// Create a store drawing its buffers from `pool`.
    pub fn with_pool(pool: Arc<BufferPool>) -> Self {
        Self {
            blocks: DashMap::new(),
            removal_lock: Mutex::new(()),
            count: AtomicU64::new(0),
            last_write: Mutex::new(None),
            pool,
        }
    }

    /// The buffer pool backing this store.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    fn entry(&self, root: &BlockRoot) -> Option<Arc<StoredBlock>> {
        self.blocks.get(root).map(|entry| Arc::clone(entry.value()))
    }

    fn insert(
        &self,
        root: BlockRoot,
        signature: Ed25519Signature,
        bytes: PooledBuffer,
    ) -> Result<InsertResult> {
        let result = match self.blocks.entry(root) {
            Entry::Occupied(entry) => {
                let existing = entry.get().signature;
                if existing != signature {
                    warn!(%root, %existing, incoming = %signature, "conflicting block signature");
                    return Err(StoreError::Conflict {
                        root,
                        existing,
                        incoming: signature,
                    });
                }
                InsertResult::AlreadyExists
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(StoredBlock { bytes, signature }));
                // Counted under the shard lock so a racing remove cannot
                // decrement first.
                self.count.fetch_add(1, Ordering::Relaxed);
                InsertResult::Inserted
            }
        };

        if result == InsertResult::Inserted {
            *self.last_write.lock() = Some(root);
            debug!(%root, "stored block");
        }
        Ok(result)
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlockStore")
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn store(&self, block: &BlockWithRoot) -> Result<InsertResult> {
        let root = block.root();
        let mut bytes = self.pool.acquire();
        block
            .block()
            .encode_to(bytes.as_mut_vec())
            .map_err(|source| StoreError::Encode { root, source })?;
        self.insert(root, block.block().signature, bytes)
    }

    async fn import(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(BlockRoot, InsertResult)> {
        let max = SignedBlock::MAX_ENCODED_LEN;
        let mut bytes = self.pool.acquire();
        (&mut *reader)
            .take(max as u64 + 1)
            .read_to_end(bytes.as_mut_vec())
            .await?;
        if bytes.len() > max {
            return Err(StoreError::Decode(CoreError::TooLarge {
                size: bytes.len(),
                max,
            }));
        }

        let block = decode_signed_block(&bytes).map_err(StoreError::Decode)?;
        let root = block.root();
        let result = self.insert(root, block.signature, bytes)?;
        Ok((root, result))
    }

    async fn get(&self, root: &BlockRoot) -> Result<Option<SignedBlock>> {
        match self.entry(root) {
            Some(stored) => decode_signed_block(&stored.bytes)
                .map(Some)
                .map_err(StoreError::Decode),
            None => Ok(None),
        }
    }

    async fn get_into(&self, root: &BlockRoot, dest: &mut SignedBlock) -> Result<bool> {
        let Some(stored) = self.entry(root) else {
            return Ok(false);
        };
        dest.decode_into(&stored.bytes).map_err(StoreError::Decode)?;
        Ok(true)
    }

    async fn size(&self, root: &BlockRoot) -> Result<Option<u64>> {
        Ok(self
            .blocks
            .get(root)
            .map(|entry| entry.value().bytes.len() as u64))
    }

    async fn contains(&self, root: &BlockRoot) -> Result<bool> {
        Ok(self.blocks.contains_key(root))
    }

    async fn export(
        &self,
        root: &BlockRoot,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<bool> {
        let Some(stored) = self.entry(root) else {
            return Ok(false);
        };
        sink.write_all(&stored.bytes).await?;
        Ok(true)
    }

    async fn open_stream(&self, root: &BlockRoot) -> Result<Option<(BlockReader, u64)>> {
        Ok(self.entry(root).map(|stored| {
            let len = stored.bytes.len() as u64;
            (BlockReader::new(stored), len)
        }))
    }

    async fn remove(&self, root: &BlockRoot) -> Result<bool> {
        let _guard = self.removal_lock.lock();
        match self.blocks.remove(root) {
            Some(_) => {
                self.count.fetch_sub(1, Ordering::Relaxed);
                debug!(%root, "removed block");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            count: self.count.load(Ordering::Relaxed),
            last_write: *self.last_write.lock(),
        }
    }

    async fn list(&self) -> Result<Vec<BlockRoot>> {
        Ok(self.blocks.iter().map(|entry| *entry.key()).collect())
    }
}
