//! Sync-by-root: request blocks by root from one peer, validate each one
//! against the root asked for at its position, then store and forward it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use blocksync_core::{BlockRoot, BlockWithRoot, SignedBlock};
use blocksync_rpc::{
    blocks_by_root_v1, BlocksByRootRequest, BoxedStream, ChunkCount, ChunkHandler, Compression,
    HandlerError, PeerHost, PeerId, ResponseChunk, ResultCode, RpcMethod, ZstdCompression,
    MAX_REQUEST_BLOCKS,
};
use blocksync_store::BlockStore;

use crate::chain::Chain;
use crate::error::{Result, SyncError};

/// Default deadline for one sync-by-root request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// One sync-by-root run.
#[derive(Debug, Clone)]
pub struct SyncByRootRequest {
    /// Peer to ask.
    pub peer: PeerId,
    /// Roots, in the order the peer should answer.
    pub roots: Vec<BlockRoot>,
    /// Deadline for the whole exchange. Zero means none.
    pub timeout: Duration,
    /// Compression to negotiate, if any.
    pub compression: Option<Arc<dyn Compression>>,
    /// Put received blocks in the store.
    pub store: bool,
    /// Forward received blocks to the chain.
    pub process: bool,
}

impl SyncByRootRequest {
    /// A request with default options: 20 s timeout, zstd, store and process.
    pub fn new(peer: PeerId, roots: Vec<BlockRoot>) -> Self {
        Self {
            peer,
            roots,
            timeout: DEFAULT_TIMEOUT,
            compression: Some(Arc::new(ZstdCompression::default())),
            store: true,
            process: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_compression(mut self, compression: Option<Arc<dyn Compression>>) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    pub fn with_process(mut self, process: bool) -> Self {
        self.process = process;
        self
    }
}

/// Result of a successful sync-by-root run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Roots requested.
    pub requested: usize,
    /// Valid blocks received.
    pub received: usize,
    /// Blocks inserted into the store.
    pub newly_stored: usize,
    /// Blocks the store already had.
    pub already_known: usize,
    /// Blocks accepted by the chain.
    pub processed: usize,
}

/// Client for the blocks-by-root method.
pub struct BlocksByRootClient<H, S, C> {
    host: H,
    store: S,
    chain: C,
    method: RpcMethod,
}

impl<H, S, C> BlocksByRootClient<H, S, C>
where
    H: PeerHost,
    S: BlockStore,
    C: Chain,
{
    pub fn new(host: H, store: S, chain: C) -> Self {
        Self {
            host,
            store,
            chain,
            method: blocks_by_root_v1(),
        }
    }

    /// The host requests go through.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The block store blocks are written to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one request.
    ///
    /// Blocks applied before a failure stay applied.
    pub async fn run(&self, request: &SyncByRootRequest) -> Result<SyncReport> {
        let requested = request.roots.len();
        let protocol = self.method.protocol_for(request.compression.as_deref());
        if requested > MAX_REQUEST_BLOCKS {
            warn!(
                peer = %request.peer,
                requested,
                max = MAX_REQUEST_BLOCKS,
                "requesting more blocks than peers usually serve"
            );
        }

        let payload = BlocksByRootRequest::new(request.roots.clone())
            .encode()
            .map_err(SyncError::Encode)?;

        let mut handler = ByRootHandler {
            request,
            store: &self.store,
            chain: &self.chain,
            block: SignedBlock::default(),
            report: SyncReport {
                requested,
                ..SyncReport::default()
            },
        };

        debug!(peer = %request.peer, %protocol, requested, "sync by root");
        let summary = self
            .method
            .run_request(
                &self.host,
                &request.peer,
                request.compression.clone(),
                &payload,
                ChunkCount::Exact(requested as u64),
                request.timeout,
                &mut handler,
            )
            .await?;

        let report = handler.report;
        if summary.closed_early {
            info!(
                peer = %request.peer,
                received = report.received,
                requested,
                "peer returned fewer blocks than requested"
            );
        }
        info!(
            peer = %request.peer,
            received = report.received,
            newly_stored = report.newly_stored,
            already_known = report.already_known,
            processed = report.processed,
            "sync by root complete"
        );
        Ok(report)
    }
}

/// Validates, stores and forwards each chunk.
struct ByRootHandler<'a, S, C> {
    request: &'a SyncByRootRequest,
    store: &'a S,
    chain: &'a C,
    /// Reused decode destination.
    block: SignedBlock,
    report: SyncReport,
}

impl<'a, S: BlockStore, C: Chain> ByRootHandler<'a, S, C> {
    async fn handle(&mut self, chunk: ResponseChunk<'_, BoxedStream>) -> Result<()> {
        let index = chunk.index() as usize;
        match chunk.result_code() {
            ResultCode::Success => {
                debug!(
                    chunk_index = index,
                    chunk_size = chunk.declared_len(),
                    "block chunk"
                );
                chunk
                    .decode_into(&mut self.block)
                    .await
                    .map_err(|source| SyncError::InvalidChunk { index, source })?;

                let with_root = BlockWithRoot::new(std::mem::take(&mut self.block));
                let outcome = self.apply(index, &with_root).await;
                self.block = with_root.into_block();
                outcome
            }
            code @ (ResultCode::InvalidRequest
            | ResultCode::ServerError
            | ResultCode::ResourceUnavailable) => {
                let message = chunk
                    .read_error_message()
                    .await
                    .map_err(|source| SyncError::InvalidChunk { index, source })?;
                warn!(chunk_index = index, result_code = %code, %message, "peer reported error");
                Err(SyncError::PeerReported {
                    index,
                    code,
                    message,
                })
            }
            ResultCode::Unknown(code) => Err(SyncError::UnknownResultCode {
                index,
                size: chunk.declared_len(),
                code,
            }),
        }
    }

    async fn apply(&mut self, index: usize, with_root: &BlockWithRoot) -> Result<()> {
        let expected = self
            .request
            .roots
            .get(index)
            .copied()
            .unwrap_or_default();
        let root = with_root.root();
        if root != expected {
            return Err(SyncError::RootMismatch {
                index,
                expected,
                actual: root,
            });
        }
        self.report.received += 1;

        if self.request.store {
            let result = self
                .store
                .store(with_root)
                .await
                .map_err(|source| SyncError::Store { index, source })?;
            let known = result.existed();
            if known {
                self.report.already_known += 1;
            } else {
                self.report.newly_stored += 1;
            }
            debug!(%root, slot = with_root.block().slot(), known, "stored block");
        }

        if self.request.process {
            self.chain
                .add_block(with_root.block())
                .await
                .map_err(|source| SyncError::Chain { index, source })?;
            self.report.processed += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, S: BlockStore, C: Chain> ChunkHandler for ByRootHandler<'a, S, C> {
    async fn on_chunk(
        &mut self,
        chunk: ResponseChunk<'_, BoxedStream>,
    ) -> std::result::Result<(), HandlerError> {
        Ok(self.handle(chunk).await?)
    }
}
