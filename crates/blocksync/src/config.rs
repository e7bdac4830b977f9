//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use blocksync_rpc::{compression_from_name, Compression};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the [`Client`](crate::Client).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// let config: blocksync::ClientConfig = serde_json::from_str(r#"{"timeout_ms": 500}"#).unwrap();
/// assert_eq!(config.compression, "zstd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Request deadline in milliseconds. Zero disables it.
    pub timeout_ms: u64,
    /// Compression name: `"zstd"` or `"none"`.
    pub compression: String,
    /// Store received blocks.
    pub store: bool,
    /// Forward received blocks to the chain.
    pub process: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: blocksync_sync::DEFAULT_TIMEOUT.as_millis() as u64,
            compression: "zstd".to_string(),
            store: true,
            process: true,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// The request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the compression name.
    pub fn compression(&self) -> Result<Option<Arc<dyn Compression>>> {
        Ok(compression_from_name(&self.compression)?)
    }
}
