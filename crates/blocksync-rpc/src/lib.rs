//! # Blocksync RPC
//!
//! Chunked request/response protocol: framing, compression and the engine
//! that runs one request against a peer.
//!
//! ## Key Types
//!
//! - [`RpcMethod`] - Protocol id and limits, with [`RpcMethod::run_request`]
//! - [`ResponseReader`] / [`ResponseChunk`] - Pull-based chunk reader
//! - [`ChunkHandler`] - Receives chunks in order
//! - [`PeerHost`] - Capability query and stream opening
//! - [`MemoryHost`] - In-memory host over `tokio::io::duplex`
//! - [`BlocksByRootResponder`] - Serves blocks from a [`BlockStore`](blocksync_store::BlockStore)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use blocksync_rpc::{ping, MemoryHost, PeerId, Ping};
//!
//! async fn example() {
//!     let host = MemoryHost::new(PeerId::random());
//!     let peer = PeerId::random();
//!     let pong = ping(&*host, &peer, None, Ping(1), Duration::from_secs(5)).await;
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! request:  <uvarint length>[<uvarint compressed length>]<payload>
//! response: (<result u8><uvarint length>[<uvarint compressed length>]<payload>)*
//! ```

pub mod codec;
pub mod compression;
pub mod error;
pub mod host;
pub mod method;
pub mod methods;
pub mod protocol;
pub mod responder;
pub mod varint;

pub use codec::{
    read_request, write_error_chunk, write_request, write_success_chunk,
    write_success_chunk_from_reader, ResponseChunk, ResponseReader, ResultCode,
    MAX_ERROR_MESSAGE_LEN,
};
pub use compression::{compression_from_name, Compression, ZstdCompression};
pub use error::{CodecError, HandlerError, Result, RpcError};
pub use host::{memory::MemoryHost, BoxedStream, InboundHandler, PeerHost, PeerStream};
pub use method::{ChunkCount, ChunkHandler, RequestPhase, ResponseSummary, RpcMethod};
pub use methods::{
    blocks_by_root_v1, ping, ping_v1, BlocksByRootRequest, Ping, PingResponder, Pong,
    BLOCKS_BY_ROOT_V1, MAX_REQUEST_BLOCKS, PING_V1,
};
pub use protocol::{PeerId, ProtocolId};
pub use responder::BlocksByRootResponder;
