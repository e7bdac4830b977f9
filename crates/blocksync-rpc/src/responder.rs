//! Serving side of blocks-by-root.

use std::sync::Arc;

use async_trait::async_trait;
use blocksync_store::BlockStore;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::codec::{read_request, write_error_chunk, write_success_chunk_from_reader, ResultCode};
use crate::compression::Compression;
use crate::error::CodecError;
use crate::host::{BoxedStream, InboundHandler};
use crate::methods::{blocks_by_root_v1, BlocksByRootRequest, MAX_REQUEST_BLOCKS};
use crate::protocol::{PeerId, ProtocolId};

/// Answers blocks-by-root requests from a block store.
///
/// Known blocks are streamed straight from the store's buffers; unknown
/// roots are skipped. A malformed or oversized request gets a single
/// `InvalidRequest` chunk.
pub struct BlocksByRootResponder<S> {
    store: S,
    compression: Option<Arc<dyn Compression>>,
}

impl<S: BlockStore> BlocksByRootResponder<S> {
    pub fn new(store: S, compression: Option<Arc<dyn Compression>>) -> Self {
        Self { store, compression }
    }

    /// The protocol id this responder serves.
    pub fn protocol(&self) -> ProtocolId {
        blocks_by_root_v1().protocol_for(self.compression.as_deref())
    }

    fn parse(bytes: &[u8]) -> Result<BlocksByRootRequest, String> {
        let request = BlocksByRootRequest::decode(bytes).map_err(|e| e.to_string())?;
        if request.roots.len() > MAX_REQUEST_BLOCKS {
            return Err(format!(
                "requested {} blocks, at most {MAX_REQUEST_BLOCKS} allowed",
                request.roots.len()
            ));
        }
        Ok(request)
    }
}

#[async_trait]
impl<S: BlockStore + 'static> InboundHandler for BlocksByRootResponder<S> {
    async fn handle(&self, peer: PeerId, mut stream: BoxedStream) -> Result<(), CodecError> {
        let compression = self.compression.as_deref();
        let parsed = match read_request(&mut stream, blocks_by_root_v1().max_request_len, compression)
            .await
        {
            Ok(bytes) => Self::parse(&bytes),
            Err(CodecError::Io(e)) => return Err(CodecError::Io(e)),
            Err(e) => Err(e.to_string()),
        };

        let request = match parsed {
            Ok(request) => request,
            Err(reason) => {
                debug!(%peer, %reason, "rejecting blocks_by_root request");
                write_error_chunk(&mut stream, ResultCode::InvalidRequest, &reason, compression)
                    .await?;
                stream.shutdown().await?;
                return Ok(());
            }
        };

        let mut served = 0usize;
        for root in &request.roots {
            match self.store.open_stream(root).await {
                Ok(Some((mut reader, len))) => {
                    write_success_chunk_from_reader(&mut stream, &mut reader, len, compression)
                        .await?;
                    served += 1;
                }
                Ok(None) => {
                    debug!(%peer, %root, known = false, "skipping unknown root");
                }
                Err(e) => {
                    warn!(%peer, %root, error = %e, "store read failed");
                    write_error_chunk(&mut stream, ResultCode::ServerError, &e.to_string(), compression)
                        .await?;
                    break;
                }
            }
        }

        debug!(%peer, requested = request.roots.len(), served, "served blocks_by_root");
        stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_request, ResponseReader};
    use blocksync_core::{
        canonical_bytes, BlockBuilder, BlockRoot, BlockWithRoot, Canonical, Keypair, SignedBlock,
    };
    use blocksync_store::MemoryBlockStore;

    async fn exchange(
        responder: BlocksByRootResponder<Arc<MemoryBlockStore>>,
        request: &[u8],
    ) -> Vec<(ResultCode, Vec<u8>)> {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move {
            responder
                .handle(PeerId::from_bytes([3; 32]), Box::new(server))
                .await
        });

        write_request(&mut client, request, None).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reader = ResponseReader::new(client, None, SignedBlock::MAX_ENCODED_LEN);
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            let code = chunk.result_code();
            let mut payload = Vec::new();
            chunk.read_payload(&mut payload).await.unwrap();
            chunks.push((code, payload));
        }
        task.await.unwrap().unwrap();
        chunks
    }

    #[tokio::test]
    async fn test_serves_known_and_skips_unknown() {
        let store = Arc::new(MemoryBlockStore::new());
        let keypair = Keypair::from_seed(&[4; 32]);
        let a = BlockBuilder::new(1).body(b"a".to_vec()).sign(&keypair);
        let b = BlockBuilder::new(2).body(b"b".to_vec()).sign(&keypair);
        store.store(&BlockWithRoot::new(a.clone())).await.unwrap();
        store.store(&BlockWithRoot::new(b.clone())).await.unwrap();

        let request = BlocksByRootRequest::new(vec![
            a.root(),
            BlockRoot::from_bytes([0xee; 32]),
            b.root(),
        ]);
        let responder = BlocksByRootResponder::new(store, None);
        let chunks = exchange(responder, &request.encode().unwrap()).await;

        assert_eq!(
            chunks,
            vec![
                (ResultCode::Success, canonical_bytes(&a)),
                (ResultCode::Success, canonical_bytes(&b)),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_request_answered_with_error_chunk() {
        let responder = BlocksByRootResponder::new(Arc::new(MemoryBlockStore::new()), None);
        let chunks = exchange(responder, b"\xff\xff").await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, ResultCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_too_many_roots_rejected() {
        let responder = BlocksByRootResponder::new(Arc::new(MemoryBlockStore::new()), None);
        let request = BlocksByRootRequest::new(vec![BlockRoot::ZERO; MAX_REQUEST_BLOCKS + 1]);
        let chunks = exchange(responder, &request.encode().unwrap()).await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, ResultCode::InvalidRequest);
    }

    #[test]
    fn test_protocol_suffix() {
        let zstd: Arc<dyn Compression> = Arc::new(crate::ZstdCompression::default());
        let responder = BlocksByRootResponder::new(Arc::new(MemoryBlockStore::new()), Some(zstd));
        assert_eq!(
            responder.protocol().as_str(),
            "/blocksync/req/blocks_by_root/1/cbor_zstd"
        );
    }
}
