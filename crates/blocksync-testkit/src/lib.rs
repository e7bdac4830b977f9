//! # Blocksync Testkit
//!
//! Testing utilities for blocksync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: signed block chains, a recording chain view, and a
//!   two-node in-memory network with a serving peer
//! - **Scripted peers**: inbound handlers that answer with an exact chunk
//!   script, including error chunks, raw bytes and stalls
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use blocksync_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::with_seed([7; 32]);
//! let blocks = fixture.chain(3);
//! assert_eq!(blocks[1].parent_root(), &blocks[0].root());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use blocksync_testkit::generators::signed_block;
//!
//! proptest! {
//!     #[test]
//!     fn root_is_deterministic(block in signed_block()) {
//!         prop_assert_eq!(block.root(), block.clone().root());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod scripted;

pub use fixtures::{multi_party_fixtures, RecordingChain, TestFixture, TestNetwork};
pub use scripted::{ScriptStep, ScriptedPeer};
