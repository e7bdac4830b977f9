//! Unsigned LEB128 varints, as used for every length on the wire.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CodecError;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `n` to `buf`.
pub fn encode_uvarint(buf: &mut Vec<u8>, mut n: u64) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if n == 0 {
            break;
        }
    }
}

/// Number of bytes `encode_uvarint` writes for `n`.
pub fn uvarint_len(n: u64) -> usize {
    let bits = 64 - n.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Fold one byte into a partially decoded value.
///
/// Returns `Some(value)` once the final byte has been seen.
fn step(value: &mut u64, index: usize, byte: u8) -> Result<Option<u64>, CodecError> {
    if index == MAX_VARINT_LEN - 1 && byte > 1 {
        return Err(CodecError::VarintOverflow);
    }
    *value |= u64::from(byte & 0x7f) << (7 * index);
    if byte & 0x80 != 0 {
        if index + 1 >= MAX_VARINT_LEN {
            return Err(CodecError::VarintOverflow);
        }
        return Ok(None);
    }
    if byte == 0 && index > 0 {
        return Err(CodecError::VarintOverlong);
    }
    Ok(Some(*value))
}

/// Decode a varint from the front of `bytes`, returning it and its length.
pub fn decode_uvarint(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value = 0;
    for (index, &byte) in bytes.iter().enumerate().take(MAX_VARINT_LEN) {
        if let Some(n) = step(&mut value, index, byte)? {
            return Ok((n, index + 1));
        }
    }
    Err(CodecError::Io(std::io::ErrorKind::UnexpectedEof.into()))
}

/// Read a varint from a stream, one byte at a time.
pub async fn read_uvarint<R>(reader: &mut R) -> Result<u64, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut value = 0;
    for index in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        if let Some(n) = step(&mut value, index, byte)? {
            return Ok(n);
        }
    }
    Err(CodecError::VarintOverflow)
}
