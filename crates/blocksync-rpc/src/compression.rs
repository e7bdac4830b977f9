//! Payload compression negotiated through the protocol id suffix.

use std::fmt;
use std::sync::Arc;

use crate::error::CodecError;

/// A payload compression scheme.
pub trait Compression: Send + Sync + fmt::Debug {
    /// Name used as the protocol id suffix.
    fn name(&self) -> &'static str;

    /// Compress a whole payload.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decompress a payload that must expand to exactly `expected_len` bytes.
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;

    /// Upper bound on the compressed size of `len` input bytes.
    fn max_compressed_len(&self, len: usize) -> usize;
}

/// Zstandard frame compression.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompression {
    level: i32,
}

impl ZstdCompression {
    /// Name on the wire.
    pub const NAME: &'static str = "zstd";

    /// Compression at the given zstd level.
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompression {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl Compression for ZstdCompression {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::compress(input, self.level).map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        // A frame larger than the capacity fails inside zstd.
        let output = zstd::bulk::decompress(input, expected_len).map_err(|e| {
            CodecError::Compression(format!("{e} (declared length {expected_len})"))
        })?;
        if output.len() != expected_len {
            return Err(CodecError::LengthMismatch {
                declared: expected_len as u64,
                actual: output.len() as u64,
            });
        }
        Ok(output)
    }

    fn max_compressed_len(&self, len: usize) -> usize {
        // ZSTD_COMPRESSBOUND
        const SMALL: usize = 128 << 10;
        let margin = if len < SMALL { (SMALL - len) >> 11 } else { 0 };
        len + (len >> 8) + margin
    }
}

/// Resolve a compression by name. `"none"` and `""` mean no compression.
pub fn compression_from_name(name: &str) -> Result<Option<Arc<dyn Compression>>, CodecError> {
    match name {
        "" | "none" => Ok(None),
        ZstdCompression::NAME => Ok(Some(Arc::new(ZstdCompression::default()))),
        other => Err(CodecError::UnknownCompression(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip() {
        let zstd = ZstdCompression::default();
        let input = b"blocksync ".repeat(100);
        let compressed = zstd.compress(&input).unwrap();
        assert!(compressed.len() < input.len());
        assert!(compressed.len() <= zstd.max_compressed_len(input.len()));
        assert_eq!(zstd.decompress(&compressed, input.len()).unwrap(), input);
    }

    #[test]
    fn test_zstd_levels_interoperate() {
        let fast = ZstdCompression::with_level(1);
        let strong = ZstdCompression::with_level(19);
        let input = b"root root root ".repeat(64);

        let compressed = strong.compress(&input).unwrap();
        assert_eq!(fast.decompress(&compressed, input.len()).unwrap(), input);
        assert_eq!(fast.name(), strong.name());
    }

    #[test]
    fn test_zstd_rejects_wrong_length() {
        let zstd = ZstdCompression::default();
        let input = vec![7u8; 1000];
        let compressed = zstd.compress(&input).unwrap();

        assert!(zstd.decompress(&compressed, 999).is_err());
        assert!(matches!(
            zstd.decompress(&compressed, 1001),
            Err(CodecError::LengthMismatch {
                declared: 1001,
                actual: 1000
            })
        ));
    }

    #[test]
    fn test_compression_from_name() {
        assert!(compression_from_name("none").unwrap().is_none());
        assert!(compression_from_name("").unwrap().is_none());
        assert_eq!(compression_from_name("zstd").unwrap().unwrap().name(), "zstd");
        assert!(matches!(
            compression_from_name("snappy"),
            Err(CodecError::UnknownCompression(_))
        ));
    }
}
