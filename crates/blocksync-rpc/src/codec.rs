//! Chunk framing for request/response streams.
//!
//! A response is a sequence of chunks:
//!
//! ```text
//! result_code:        u8
//! length:             uvarint, uncompressed payload length
//! [compressed_length: uvarint]   only when compression is negotiated
//! payload:            length raw bytes, or compressed_length compressed bytes
//! ```
//!
//! Requests use the same frame without the result byte.
//!
//! The reader is pull-based: [`ResponseReader::next_chunk`] parses a header
//! and hands out a [`ResponseChunk`] whose payload is read only when asked
//! for. Uncompressed payloads are read on demand into a reusable buffer;
//! compressed ones are buffered, then decompressed and checked against the
//! declared length.

use std::fmt;
use std::sync::Arc;

use blocksync_core::Canonical;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::compression::Compression;
use crate::error::CodecError;
use crate::varint::{encode_uvarint, read_uvarint, MAX_VARINT_LEN};

/// Longest error message carried by an error chunk.
pub const MAX_ERROR_MESSAGE_LEN: usize = 256;

/// Result byte at the front of each response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    InvalidRequest,
    ServerError,
    ResourceUnavailable,
    /// Any code this side does not know.
    Unknown(u8),
}

impl ResultCode {
    /// The wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            ResultCode::Success => 0,
            ResultCode::InvalidRequest => 1,
            ResultCode::ServerError => 2,
            ResultCode::ResourceUnavailable => 3,
            ResultCode::Unknown(b) => b,
        }
    }

    /// Whether the chunk carries a payload of the method's response type.
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// Whether the chunk carries an error message.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResultCode::InvalidRequest | ResultCode::ServerError | ResultCode::ResourceUnavailable
        )
    }
}

impl From<u8> for ResultCode {
    fn from(byte: u8) -> Self {
        match byte {
            0 => ResultCode::Success,
            1 => ResultCode::InvalidRequest,
            2 => ResultCode::ServerError,
            3 => ResultCode::ResourceUnavailable,
            other => ResultCode::Unknown(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => f.write_str("success"),
            ResultCode::InvalidRequest => f.write_str("invalid request"),
            ResultCode::ServerError => f.write_str("server error"),
            ResultCode::ResourceUnavailable => f.write_str("resource unavailable"),
            ResultCode::Unknown(b) => write!(f, "unknown ({b})"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Pull-based reader over the chunks of one response.
pub struct ResponseReader<R> {
    inner: R,
    compression: Option<Arc<dyn Compression>>,
    max_chunk_len: usize,
    next_index: u64,
    /// Payload bytes of the current chunk still on the wire.
    unread: u64,
    scratch: Vec<u8>,
}

impl<R> ResponseReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read chunks of at most `max_chunk_len` uncompressed bytes from `inner`.
    pub fn new(
        inner: R,
        compression: Option<Arc<dyn Compression>>,
        max_chunk_len: usize,
    ) -> Self {
        Self {
            inner,
            compression,
            max_chunk_len,
            next_index: 0,
            unread: 0,
            scratch: Vec::new(),
        }
    }

    /// Number of chunk headers parsed so far.
    pub fn chunks_read(&self) -> u64 {
        self.next_index
    }

    /// Parse the next chunk header.
    ///
    /// Returns `None` when the stream closes cleanly at a chunk boundary.
    /// Any payload left unread from the previous chunk is discarded first.
    pub async fn next_chunk(&mut self) -> Result<Option<ResponseChunk<'_, R>>, CodecError> {
        self.discard_unread().await?;

        let mut code = [0u8; 1];
        if self.inner.read(&mut code).await? == 0 {
            return Ok(None);
        }
        let result_code = ResultCode::from(code[0]);

        let max = if result_code.is_error() {
            MAX_ERROR_MESSAGE_LEN
        } else {
            self.max_chunk_len
        };
        let declared_len = read_uvarint(&mut self.inner).await?;
        if declared_len > max as u64 {
            return Err(CodecError::TooLarge {
                what: "chunk payload",
                len: declared_len,
                max: max as u64,
            });
        }

        let wire_len = match &self.compression {
            Some(compression) => {
                let bound = compression.max_compressed_len(declared_len as usize) as u64;
                let compressed_len = read_uvarint(&mut self.inner).await?;
                if compressed_len > bound {
                    return Err(CodecError::TooLarge {
                        what: "compressed chunk payload",
                        len: compressed_len,
                        max: bound,
                    });
                }
                compressed_len
            }
            None => declared_len,
        };

        let index = self.next_index;
        self.next_index += 1;
        self.unread = wire_len;

        Ok(Some(ResponseChunk {
            reader: self,
            index,
            result_code,
            declared_len,
            wire_len,
        }))
    }

    async fn discard_unread(&mut self) -> Result<(), CodecError> {
        let expected = std::mem::take(&mut self.unread);
        if expected == 0 {
            return Ok(());
        }
        let skipped =
            tokio::io::copy(&mut (&mut self.inner).take(expected), &mut tokio::io::sink()).await?;
        if skipped < expected {
            return Err(CodecError::Truncated {
                expected,
                actual: skipped,
            });
        }
        Ok(())
    }

    async fn read_payload_into(
        &mut self,
        declared_len: u64,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let wire_len = std::mem::take(&mut self.unread);
        out.clear();

        match &self.compression {
            None => {
                read_exactly(&mut self.inner, wire_len, out).await?;
            }
            Some(compression) => {
                let mut compressed = Vec::with_capacity(wire_len as usize);
                read_exactly(&mut self.inner, wire_len, &mut compressed).await?;
                let payload = compression.decompress(&compressed, declared_len as usize)?;
                out.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

impl<R> fmt::Debug for ResponseReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseReader")
            .field("compression", &self.compression)
            .field("max_chunk_len", &self.max_chunk_len)
            .field("next_index", &self.next_index)
            .finish()
    }
}

/// One chunk whose header has been read and whose payload is still pending.
///
/// Consuming methods read the payload; dropping the chunk leaves the
/// payload to be skipped by the next [`ResponseReader::next_chunk`].
pub struct ResponseChunk<'r, R> {
    reader: &'r mut ResponseReader<R>,
    index: u64,
    result_code: ResultCode,
    declared_len: u64,
    wire_len: u64,
}

impl<'r, R> ResponseChunk<'r, R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Position of this chunk in the response, from zero.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The chunk's result code.
    pub fn result_code(&self) -> ResultCode {
        self.result_code
    }

    /// Uncompressed payload length announced by the peer.
    pub fn declared_len(&self) -> u64 {
        self.declared_len
    }

    /// Payload bytes on the wire (compressed length if compressed).
    pub fn wire_len(&self) -> u64 {
        self.wire_len
    }

    /// Read the payload into `out`, replacing its contents.
    pub async fn read_payload(self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.reader.read_payload_into(self.declared_len, out).await
    }

    /// Read the payload as an error message. Invalid UTF-8 is replaced.
    pub async fn read_error_message(self) -> Result<String, CodecError> {
        let mut buf = Vec::with_capacity(self.declared_len as usize);
        self.reader
            .read_payload_into(self.declared_len, &mut buf)
            .await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Read the payload and decode it into `dest`.
    ///
    /// The payload buffer is owned by the reader and reused across chunks.
    pub async fn decode_into<T>(self, dest: &mut T) -> Result<(), CodecError>
    where
        T: Canonical + Send,
    {
        let mut scratch = std::mem::take(&mut self.reader.scratch);
        let result = self
            .reader
            .read_payload_into(self.declared_len, &mut scratch)
            .await
            .and_then(|()| dest.decode_into(&scratch).map_err(CodecError::Decode));
        self.reader.scratch = scratch;
        result
    }
}

impl<R> fmt::Debug for ResponseChunk<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseChunk")
            .field("index", &self.index)
            .field("result_code", &self.result_code)
            .field("declared_len", &self.declared_len)
            .field("wire_len", &self.wire_len)
            .finish()
    }
}

async fn read_exactly<R>(reader: &mut R, len: u64, out: &mut Vec<u8>) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let read = reader.take(len).read_to_end(out).await? as u64;
    if read < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: read,
        });
    }
    Ok(())
}

/// Read one request frame of at most `max_len` uncompressed bytes.
pub async fn read_request<R>(
    reader: &mut R,
    max_len: usize,
    compression: Option<&dyn Compression>,
) -> Result<Vec<u8>, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let declared_len = read_uvarint(reader).await?;
    if declared_len > max_len as u64 {
        return Err(CodecError::TooLarge {
            what: "request",
            len: declared_len,
            max: max_len as u64,
        });
    }

    match compression {
        None => {
            let mut payload = Vec::with_capacity(declared_len as usize);
            read_exactly(reader, declared_len, &mut payload).await?;
            Ok(payload)
        }
        Some(compression) => {
            let bound = compression.max_compressed_len(declared_len as usize) as u64;
            let compressed_len = read_uvarint(reader).await?;
            if compressed_len > bound {
                return Err(CodecError::TooLarge {
                    what: "compressed request",
                    len: compressed_len,
                    max: bound,
                });
            }
            let mut compressed = Vec::with_capacity(compressed_len as usize);
            read_exactly(reader, compressed_len, &mut compressed).await?;
            compression.decompress(&compressed, declared_len as usize)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

fn frame_header(result: Option<ResultCode>, len: u64, compressed_len: Option<u64>) -> Vec<u8> {
    let mut header = Vec::with_capacity(1 + 2 * MAX_VARINT_LEN);
    if let Some(code) = result {
        header.push(code.to_byte());
    }
    encode_uvarint(&mut header, len);
    if let Some(compressed_len) = compressed_len {
        encode_uvarint(&mut header, compressed_len);
    }
    header
}

async fn write_frame<W>(
    writer: &mut W,
    result: Option<ResultCode>,
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = payload.len() as u64;
    match compression {
        Some(compression) => {
            let compressed = compression.compress(payload)?;
            let header = frame_header(result, len, Some(compressed.len() as u64));
            writer.write_all(&header).await?;
            writer.write_all(&compressed).await?;
        }
        None => {
            writer.write_all(&frame_header(result, len, None)).await?;
            writer.write_all(payload).await?;
        }
    }
    Ok(())
}

/// Write a request frame.
pub async fn write_request<W>(
    writer: &mut W,
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(writer, None, payload, compression).await
}

/// Write a success chunk carrying `payload`.
pub async fn write_success_chunk<W>(
    writer: &mut W,
    payload: &[u8],
    compression: Option<&dyn Compression>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_frame(writer, Some(ResultCode::Success), payload, compression).await
}

/// Write a success chunk whose `len` payload bytes come from `source`.
///
/// Without compression the bytes are copied through without buffering.
pub async fn write_success_chunk_from_reader<W, S>(
    writer: &mut W,
    source: &mut S,
    len: u64,
    compression: Option<&dyn Compression>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
    S: AsyncRead + Unpin + ?Sized,
{
    match compression {
        None => {
            writer
                .write_all(&frame_header(Some(ResultCode::Success), len, None))
                .await?;
            let copied = tokio::io::copy(&mut source.take(len), writer).await?;
            if copied < len {
                return Err(CodecError::Truncated {
                    expected: len,
                    actual: copied,
                });
            }
            Ok(())
        }
        Some(_) => {
            let mut payload = Vec::with_capacity(len as usize);
            read_exactly(source, len, &mut payload).await?;
            write_success_chunk(writer, &payload, compression).await
        }
    }
}

/// Write an error chunk. Messages longer than [`MAX_ERROR_MESSAGE_LEN`]
/// bytes are cut at a character boundary.
pub async fn write_error_chunk<W>(
    writer: &mut W,
    code: ResultCode,
    message: &str,
    compression: Option<&dyn Compression>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let message = truncate_message(message);
    write_frame(writer, Some(code), message.as_bytes(), compression).await
}

fn truncate_message(message: &str) -> &str {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        return message;
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}
