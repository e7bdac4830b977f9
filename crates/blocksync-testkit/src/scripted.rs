//! Scripted peers.
//!
//! A [`ScriptedPeer`] reads one request and answers with a fixed list of
//! steps, regardless of what was asked. Use it to produce responses an
//! honest responder never would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use blocksync_core::{canonical_bytes, SignedBlock};
use blocksync_rpc::{
    read_request, write_error_chunk, write_success_chunk, BoxedStream, CodecError, Compression,
    InboundHandler, PeerId, ResultCode,
};

/// One step of a scripted response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// A success chunk carrying the block's canonical bytes.
    Block(SignedBlock),
    /// A success chunk with an arbitrary payload.
    Success(Vec<u8>),
    /// An error chunk.
    Error(ResultCode, String),
    /// Bytes written to the stream as-is.
    Raw(Vec<u8>),
    /// Wait before the next step.
    Delay(Duration),
    /// Never continue; the stream stays open.
    Stall,
}

/// An inbound handler replaying a script.
pub struct ScriptedPeer {
    steps: Vec<ScriptStep>,
    compression: Option<Arc<dyn Compression>>,
    max_request_len: usize,
    requests: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedPeer {
    pub fn new(steps: Vec<ScriptStep>, compression: Option<Arc<dyn Compression>>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            compression,
            max_request_len: blocksync_rpc::blocks_by_root_v1().max_request_len,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Script that serves `blocks` in order.
    pub fn blocks(blocks: &[SignedBlock], compression: Option<Arc<dyn Compression>>) -> Arc<Self> {
        Self::new(
            blocks.iter().cloned().map(ScriptStep::Block).collect(),
            compression,
        )
    }

    /// Raw request payloads received so far.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl InboundHandler for ScriptedPeer {
    async fn handle(&self, peer: PeerId, mut stream: BoxedStream) -> Result<(), CodecError> {
        let compression = self.compression.as_deref();
        let request = read_request(&mut stream, self.max_request_len, compression).await?;
        tracing::trace!(%peer, len = request.len(), "scripted peer got request");
        self.requests.lock().push(request);

        for step in &self.steps {
            match step {
                ScriptStep::Block(block) => {
                    write_success_chunk(&mut stream, &canonical_bytes(block), compression).await?;
                }
                ScriptStep::Success(payload) => {
                    write_success_chunk(&mut stream, payload, compression).await?;
                }
                ScriptStep::Error(code, message) => {
                    write_error_chunk(&mut stream, *code, message, compression).await?;
                }
                ScriptStep::Raw(bytes) => {
                    stream.write_all(bytes).await?;
                }
                ScriptStep::Delay(after) => {
                    stream.flush().await?;
                    tokio::time::sleep(*after).await;
                }
                ScriptStep::Stall => {
                    stream.flush().await?;
                    std::future::pending::<()>().await;
                }
            }
        }
        stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_rpc::{write_request, ResponseReader};

    #[tokio::test]
    async fn test_script_replayed_in_order() {
        let peer = ScriptedPeer::new(
            vec![
                ScriptStep::Success(b"one".to_vec()),
                ScriptStep::Error(ResultCode::ResourceUnavailable, "gone".into()),
            ],
            None,
        );
        let (mut client, server) = tokio::io::duplex(4096);
        let handler = Arc::clone(&peer);
        let task = tokio::spawn(async move {
            handler
                .handle(PeerId::from_bytes([5; 32]), Box::new(server))
                .await
        });

        write_request(&mut client, b"req", None).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reader = ResponseReader::new(client, None, 1024);
        let first = reader.next_chunk().await.unwrap().unwrap();
        assert!(first.result_code().is_success());
        let mut payload = Vec::new();
        first.read_payload(&mut payload).await.unwrap();
        assert_eq!(payload, b"one");

        let second = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.result_code(), ResultCode::ResourceUnavailable);
        assert_eq!(second.read_error_message().await.unwrap(), "gone");

        assert!(reader.next_chunk().await.unwrap().is_none());
        task.await.unwrap().unwrap();
        assert_eq!(peer.requests(), vec![b"req".to_vec()]);
    }
}
