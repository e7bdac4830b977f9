//! BlockStore trait: the abstract interface for block persistence.
//!
//! This trait keeps sync code storage-agnostic. The provided implementation
//! is memory-resident; the byte layout served by `export`/`open_stream` is the
//! wire encoding any other backend must preserve.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use blocksync_core::{BlockRoot, BlockWithRoot, SignedBlock};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Result;

/// Result of inserting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Block was inserted.
    Inserted,
    /// Block already exists with the same signature (idempotent - not an error).
    AlreadyExists,
}

impl InsertResult {
    /// Whether the root was present before the call.
    pub fn existed(self) -> bool {
        matches!(self, InsertResult::AlreadyExists)
    }
}

/// Best-effort store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of live entries.
    pub count: u64,
    /// Root of the most recent successful insert.
    pub last_write: Option<BlockRoot>,
}

/// Shared, immutable block bytes.
type SharedBytes = Arc<dyn AsRef<[u8]> + Send + Sync>;

#[derive(Clone)]
struct SharedSlice(SharedBytes);

impl AsRef<[u8]> for SharedSlice {
    fn as_ref(&self) -> &[u8] {
        (*self.0).as_ref()
    }
}

/// Zero-copy reader over the serialized bytes of a stored block.
///
/// The reader shares ownership of the bytes, so the block may be removed
/// from the store while a reader is still in use.
pub struct BlockReader {
    inner: io::Cursor<SharedSlice>,
}

impl BlockReader {
    /// Create a reader over shared bytes.
    pub fn new(bytes: Arc<dyn AsRef<[u8]> + Send + Sync>) -> Self {
        Self {
            inner: io::Cursor::new(SharedSlice(bytes)),
        }
    }

    /// All bytes of the block, regardless of the read position.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.get_ref().as_ref()
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.inner.position())
    }
}

impl AsyncRead for BlockReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for BlockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("len", &self.len())
            .field("position", &self.inner.position())
            .finish()
    }
}

/// The BlockStore trait: async interface for block persistence.
///
/// # Design Notes
///
/// - **Insert-if-absent**: of two racing inserts of a new root, exactly one
///   returns `Inserted`.
/// - **Conflict detection**: an insert whose signature differs from the
///   stored one fails with `StoreError::Conflict`; the stored block is kept.
/// - **Decoded copies**: `get` never hands out internal buffers.
#[async_trait]
pub trait BlockStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Insert Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a block with its root.
    ///
    /// The block is serialized, so the caller may reuse it afterwards.
    async fn store(&self, block: &BlockWithRoot) -> Result<InsertResult>;

    /// Read a serialized block from `reader`, derive its root and insert it.
    ///
    /// Decoding completes before the entry becomes visible.
    async fn import(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(BlockRoot, InsertResult)>;

    // ─────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a decoded copy of a block.
    async fn get(&self, root: &BlockRoot) -> Result<Option<SignedBlock>>;

    /// Decode a block into `dest`. Returns false if the root is unknown, in
    /// which case `dest` is untouched.
    async fn get_into(&self, root: &BlockRoot, dest: &mut SignedBlock) -> Result<bool>;

    /// Serialized size of a block, without decoding it.
    async fn size(&self, root: &BlockRoot) -> Result<Option<u64>>;

    /// Check if a block exists.
    async fn contains(&self, root: &BlockRoot) -> Result<bool>;

    /// Write the stored bytes of a block to `sink`, verbatim.
    async fn export(
        &self,
        root: &BlockRoot,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<bool>;

    /// Open a reader over the stored bytes, with their total length.
    async fn open_stream(&self, root: &BlockRoot) -> Result<Option<(BlockReader, u64)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Removal and Listing
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove a block. Removing an unknown root is not an error.
    async fn remove(&self, root: &BlockRoot) -> Result<bool>;

    /// Snapshot of the store statistics.
    fn stats(&self) -> StoreStats;

    /// All known roots, in no particular order.
    async fn list(&self) -> Result<Vec<BlockRoot>>;
}

#[async_trait]
impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    async fn store(&self, block: &BlockWithRoot) -> Result<InsertResult> {
        (**self).store(block).await
    }

    async fn import(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(BlockRoot, InsertResult)> {
        (**self).import(reader).await
    }

    async fn get(&self, root: &BlockRoot) -> Result<Option<SignedBlock>> {
        (**self).get(root).await
    }

    async fn get_into(&self, root: &BlockRoot, dest: &mut SignedBlock) -> Result<bool> {
        (**self).get_into(root, dest).await
    }

    async fn size(&self, root: &BlockRoot) -> Result<Option<u64>> {
        (**self).size(root).await
    }

    async fn contains(&self, root: &BlockRoot) -> Result<bool> {
        (**self).contains(root).await
    }

    async fn export(
        &self,
        root: &BlockRoot,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<bool> {
        (**self).export(root, sink).await
    }

    async fn open_stream(&self, root: &BlockRoot) -> Result<Option<(BlockReader, u64)>> {
        (**self).open_stream(root).await
    }

    async fn remove(&self, root: &BlockRoot) -> Result<bool> {
        (**self).remove(root).await
    }

    fn stats(&self) -> StoreStats {
        (**self).stats()
    }

    async fn list(&self) -> Result<Vec<BlockRoot>> {
        (**self).list().await
    }
}
