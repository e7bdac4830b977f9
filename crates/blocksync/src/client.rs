//! The client: sync-by-root with configured defaults.

use std::sync::Arc;

use blocksync_core::BlockRoot;
use blocksync_rpc::{ping, BlocksByRootResponder, Compression, PeerHost, PeerId, Ping, Pong};
use blocksync_store::BlockStore;
use blocksync_sync::{BlocksByRootClient, Chain, SyncByRootRequest, SyncReport};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;

/// A block sync client bound to a host, a store and a chain view.
pub struct Client<H, S, C> {
    inner: BlocksByRootClient<H, S, C>,
    config: ClientConfig,
    compression: Option<Arc<dyn Compression>>,
}

impl<H, S, C> Client<H, S, C>
where
    H: PeerHost,
    S: BlockStore,
    C: Chain,
{
    /// Create a client. Fails if the configured compression is unknown.
    pub fn new(host: H, store: S, chain: C, config: ClientConfig) -> Result<Self> {
        let compression = config.compression()?;
        info!(
            compression = compression.as_ref().map_or("none", |c| c.name()),
            timeout_ms = config.timeout_ms,
            store = config.store,
            process = config.process,
            "client configured"
        );
        Ok(Self {
            inner: BlocksByRootClient::new(host, store, chain),
            config,
            compression,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The block store.
    pub fn store(&self) -> &S {
        self.inner.store()
    }

    /// A request for `roots` carrying the configured options.
    pub fn request(&self, peer: PeerId, roots: Vec<BlockRoot>) -> SyncByRootRequest {
        SyncByRootRequest::new(peer, roots)
            .with_timeout(self.config.timeout())
            .with_compression(self.compression.clone())
            .with_store(self.config.store)
            .with_process(self.config.process)
    }

    /// Fetch `roots` from `peer` with the configured options.
    pub async fn sync_by_root(&self, peer: PeerId, roots: Vec<BlockRoot>) -> Result<SyncReport> {
        self.run(&self.request(peer, roots)).await
    }

    /// Run a prepared request.
    pub async fn run(&self, request: &SyncByRootRequest) -> Result<SyncReport> {
        Ok(self.inner.run(request).await?)
    }

    /// Ping `peer` with our sequence number.
    pub async fn ping(&self, peer: PeerId, seq: u64) -> Result<Option<Pong>> {
        Ok(ping(
            self.inner.host(),
            &peer,
            self.compression.clone(),
            Ping(seq),
            self.config.timeout(),
        )
        .await?)
    }
}

impl<H, S, C> Client<H, S, C>
where
    H: PeerHost,
    S: BlockStore + Clone,
    C: Chain,
{
    /// A responder serving this client's store with the configured
    /// compression.
    pub fn responder(&self) -> BlocksByRootResponder<S> {
        BlocksByRootResponder::new(self.inner.store().clone(), self.compression.clone())
    }
}
