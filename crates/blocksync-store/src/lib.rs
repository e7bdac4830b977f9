//! # Blocksync Store
//!
//! Content-addressed storage for signed blocks. Provides a trait-based
//! interface with a memory-resident, lock-striped implementation.
//!
//! ## Key Types
//!
//! - [`BlockStore`] - The async trait for all storage operations
//! - [`MemoryBlockStore`] - Concurrent in-memory store
//! - [`BufferPool`] / [`PooledBuffer`] - Reusable serialization buffers
//! - [`BlockReader`] - Zero-copy reader over stored bytes
//! - [`InsertResult`] - Result of inserting a block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blocksync_core::{BlockBuilder, BlockWithRoot, Keypair};
//! use blocksync_store::{BlockStore, InsertResult, MemoryBlockStore};
//!
//! async fn example() {
//!     let store = MemoryBlockStore::new();
//!     let block = BlockBuilder::new(1).sign(&Keypair::generate());
//!     let with_root = BlockWithRoot::new(block);
//!
//!     let result = store.store(&with_root).await.unwrap();
//!     assert_eq!(result, InsertResult::Inserted);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Storing the same block twice returns `AlreadyExists`
//! - **Conflict detection**: Same root with a different signature is
//!   `StoreError::Conflict`; the first block is kept
//! - **Verbatim bytes**: `export` and `open_stream` serve stored bytes as-is
//! - **Loose statistics**: counters are atomics updated beside the map and
//!   may briefly disagree with it under concurrent insert/remove

pub mod error;
pub mod memory;
pub mod pool;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryBlockStore;
pub use pool::{BufferPool, PooledBuffer};
pub use traits::{BlockReader, BlockStore, InsertResult, StoreStats};
