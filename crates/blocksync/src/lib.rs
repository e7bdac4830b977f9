//! # Blocksync
//!
//! A diagnostic client that fetches historical signed blocks from peers by
//! root, validates each block against its root, and optionally stores it
//! and forwards it to a chain view.
//!
//! ## Overview
//!
//! - **Blocks**: immutable signed messages, identified by a Blake3 root of
//!   the canonical message bytes
//! - **Store**: concurrent, content-addressed, memory-resident
//! - **RPC**: chunked request/response framing with optional zstd
//! - **Sync by root**: one request, one chunk per known block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blocksync::{Client, ClientConfig, PeerId};
//! use blocksync::rpc::MemoryHost;
//! use blocksync::store::MemoryBlockStore;
//! use blocksync::sync::Chain;
//!
//! async fn example(chain: Arc<dyn Chain>, peer: PeerId) -> blocksync::Result<()> {
//!     blocksync::init_tracing().ok();
//!
//!     let host = MemoryHost::new(PeerId::random());
//!     let store = Arc::new(MemoryBlockStore::new());
//!     let client = Client::new(host, store, chain, ClientConfig::default())?;
//!
//!     let report = client.sync_by_root(peer, vec![]).await?;
//!     println!("received {} of {}", report.received, report.requested);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `blocksync::core` - Blocks, roots, canonical encoding
//! - `blocksync::store` - Block store
//! - `blocksync::rpc` - Framing, engine, hosts
//! - `blocksync::sync` - Sync-by-root client

pub mod client;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export component crates
pub use blocksync_core as core;
pub use blocksync_rpc as rpc;
pub use blocksync_store as store;
pub use blocksync_sync as sync;

// Re-export main types for convenience
pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use telemetry::init_tracing;

pub use blocksync_core::{BlockBuilder, BlockRoot, BlockWithRoot, Keypair, SignedBlock};
pub use blocksync_rpc::PeerId;
pub use blocksync_sync::{SyncByRootRequest, SyncReport};
