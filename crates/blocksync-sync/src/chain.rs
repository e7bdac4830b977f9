//! The chain view that synced blocks are forwarded to.

use std::sync::Arc;

use async_trait::async_trait;
use blocksync_core::SignedBlock;

/// Error returned by a [`Chain`].
pub type ChainError = Box<dyn std::error::Error + Send + Sync>;

/// Receives validated blocks, in response order.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Apply a block to the chain view.
    async fn add_block(&self, block: &SignedBlock) -> Result<(), ChainError>;
}

#[async_trait]
impl<C: Chain + ?Sized> Chain for Arc<C> {
    async fn add_block(&self, block: &SignedBlock) -> Result<(), ChainError> {
        (**self).add_block(block).await
    }
}
