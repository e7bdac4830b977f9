//! # Blocksync Sync
//!
//! Sync-by-root: fetch blocks by root from a peer, check each against the
//! root requested at its position, then optionally store it and forward it
//! to a chain view.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blocksync_core::BlockRoot;
//! use blocksync_rpc::{MemoryHost, PeerId};
//! use blocksync_store::MemoryBlockStore;
//! use blocksync_sync::{BlocksByRootClient, Chain, SyncByRootRequest};
//!
//! async fn example(chain: Arc<dyn Chain>, peer: PeerId, roots: Vec<BlockRoot>) {
//!     let host = MemoryHost::new(PeerId::random());
//!     let store = Arc::new(MemoryBlockStore::new());
//!     let client = BlocksByRootClient::new(host, store, chain);
//!
//!     let report = client.run(&SyncByRootRequest::new(peer, roots)).await;
//! }
//! ```
//!
//! ## Flow
//!
//! ```text
//! client                                peer
//!   |-- supports_protocol? ------------->|
//!   |-- [root_0, .., root_n-1] --------->|  (write side closed)
//!   |<------------- chunk 0 -------------|  decode, check root_0, store, add_block
//!   |<------------- chunk 1 -------------|
//!   |<------------- close ---------------|  fewer than n chunks is not an error
//! ```

pub mod chain;
pub mod client;
pub mod error;

pub use blocksync_rpc::MAX_REQUEST_BLOCKS;
pub use chain::{Chain, ChainError};
pub use client::{BlocksByRootClient, SyncByRootRequest, SyncReport, DEFAULT_TIMEOUT};
pub use error::{Result, SyncError};
