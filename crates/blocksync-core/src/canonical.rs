//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The canonical encoding is critical: the block root is a hash of the
//! canonical message bytes, and the store hands these exact bytes to peers.
//! Decoding re-encodes and rejects anything that is not byte-identical.

use ciborium::value::Value;

use crate::block::{BlockMessage, SignedBlock, MAX_BODY_BYTES};
use crate::crypto::{Blake3Hash, Ed25519Signature};
use crate::error::CoreError;
use crate::types::BlockRoot;

/// Domain tag mixed into every block root.
pub const ROOT_DOMAIN: &[u8] = b"blocksync-root-v0:";

/// Message field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const SLOT: u64 = 0;
    pub const PROPOSER_INDEX: u64 = 1;
    pub const PARENT_ROOT: u64 = 2;
    pub const STATE_ROOT: u64 = 3;
    pub const BODY: u64 = 4;

    pub const COUNT: u64 = 5;
}

/// Upper bound of an encoded message: map header, five keys, two u64s,
/// two 32-byte strings and the body with a 5-byte length header.
const MAX_MESSAGE_LEN: usize = 1 + 5 + 9 + 9 + (2 + 32) + (2 + 32) + (5 + MAX_BODY_BYTES);

/// Values with a deterministic encoding and a statically known size bound.
pub trait Canonical: Sized {
    /// Maximum number of bytes `encode_to` can produce.
    const MAX_ENCODED_LEN: usize;

    /// Append the canonical encoding to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CoreError>;

    /// Decode a value from exactly `bytes`.
    fn decode_from(bytes: &[u8]) -> Result<Self, CoreError>;

    /// Decode into an existing value, for callers that reuse a destination.
    fn decode_into(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        *self = Self::decode_from(bytes)?;
        Ok(())
    }

    /// Encode into a fresh buffer.
    fn to_canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf)?;
        Ok(buf)
    }
}

impl Canonical for SignedBlock {
    const MAX_ENCODED_LEN: usize = MAX_MESSAGE_LEN + Ed25519Signature::LEN;

    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CoreError> {
        let body_len = self.message.body.len();
        if body_len > MAX_BODY_BYTES {
            return Err(CoreError::BodyTooLarge {
                size: body_len,
                max: MAX_BODY_BYTES,
            });
        }
        encode_message_to(buf, &self.message);
        buf.extend_from_slice(&self.signature.0);
        Ok(())
    }

    fn decode_from(bytes: &[u8]) -> Result<Self, CoreError> {
        decode_signed_block(bytes)
    }
}

/// Encode a block message to canonical CBOR bytes.
pub fn canonical_message_bytes(message: &BlockMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.body.len() + 96);
    encode_message_to(&mut buf, message);
    buf
}

/// Encode an entire block.
///
/// Format: canonical_message || signature
pub fn canonical_bytes(block: &SignedBlock) -> Vec<u8> {
    let mut buf = canonical_message_bytes(&block.message);
    buf.extend_from_slice(&block.signature.0);
    buf
}

fn encode_message_to(buf: &mut Vec<u8>, message: &BlockMessage) {
    encode_uint(buf, 5, keys::COUNT);

    encode_uint(buf, 0, keys::SLOT);
    encode_uint(buf, 0, message.slot);

    encode_uint(buf, 0, keys::PROPOSER_INDEX);
    encode_uint(buf, 0, message.proposer_index);

    encode_uint(buf, 0, keys::PARENT_ROOT);
    encode_bytes(buf, &message.parent_root.0);

    encode_uint(buf, 0, keys::STATE_ROOT);
    encode_bytes(buf, &message.state_root.0);

    encode_uint(buf, 0, keys::BODY);
    encode_bytes(buf, &message.body);
}

/// Encode an arbitrary CBOR value canonically.
///
/// Floats, tags and other non-deterministic types are rejected.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Decode one CBOR value from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied.
pub fn decode_value(bytes: &[u8]) -> Result<(Value, usize), CoreError> {
    let mut reader = bytes;
    let value: Value =
        ciborium::from_reader(&mut reader).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    Ok((value, bytes.len() - reader.len()))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::EncodingError("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n = i128::from(i);

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

/// Decode a signed block from its canonical bytes.
pub fn decode_signed_block(bytes: &[u8]) -> Result<SignedBlock, CoreError> {
    if bytes.len() > SignedBlock::MAX_ENCODED_LEN {
        return Err(CoreError::TooLarge {
            size: bytes.len(),
            max: SignedBlock::MAX_ENCODED_LEN,
        });
    }
    if bytes.len() < Ed25519Signature::LEN {
        return Err(CoreError::MalformedBlock("too short".into()));
    }

    let (value, _) = decode_value(bytes)?;
    let message = cbor_value_to_message(&value)?;

    // Re-encode to learn the message length and to reject non-minimal forms.
    let message_bytes = canonical_message_bytes(&message);
    if !bytes.starts_with(&message_bytes) {
        return Err(CoreError::NonCanonical);
    }

    let remaining = &bytes[message_bytes.len()..];
    let sig_bytes: [u8; 64] = remaining.try_into().map_err(|_| {
        CoreError::MalformedBlock(format!(
            "expected {} signature bytes, got {}",
            Ed25519Signature::LEN,
            remaining.len()
        ))
    })?;

    Ok(SignedBlock {
        message,
        signature: Ed25519Signature(sig_bytes),
    })
}

/// Convert a CBOR Value (map) back to a BlockMessage.
fn cbor_value_to_message(value: &Value) -> Result<BlockMessage, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedBlock("expected map".into())),
    };
    if map.len() as u64 != keys::COUNT {
        return Err(CoreError::MalformedBlock(format!(
            "expected {} fields, got {}",
            keys::COUNT,
            map.len()
        )));
    }

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let slot = match get(keys::SLOT) {
        Some(Value::Integer(i)) => u64::try_from(*i)
            .map_err(|_| CoreError::MalformedBlock("slot out of range".into()))?,
        _ => return Err(CoreError::MalformedBlock("missing slot".into())),
    };

    let proposer_index = match get(keys::PROPOSER_INDEX) {
        Some(Value::Integer(i)) => u64::try_from(*i)
            .map_err(|_| CoreError::MalformedBlock("proposer_index out of range".into()))?,
        _ => return Err(CoreError::MalformedBlock("missing proposer_index".into())),
    };

    let parent_root = match get(keys::PARENT_ROOT) {
        Some(Value::Bytes(b)) => BlockRoot::try_from(b.as_slice())
            .map_err(|_| CoreError::MalformedBlock("invalid parent_root".into()))?,
        _ => return Err(CoreError::MalformedBlock("missing parent_root".into())),
    };

    let state_root = match get(keys::STATE_ROOT) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Blake3Hash(arr)
        }
        _ => return Err(CoreError::MalformedBlock("invalid state_root".into())),
    };

    let body = match get(keys::BODY) {
        Some(Value::Bytes(b)) if b.len() <= MAX_BODY_BYTES => b.clone(),
        Some(Value::Bytes(b)) => {
            return Err(CoreError::BodyTooLarge {
                size: b.len(),
                max: MAX_BODY_BYTES,
            })
        }
        _ => return Err(CoreError::MalformedBlock("missing body".into())),
    };

    Ok(BlockMessage {
        slot,
        proposer_index,
        parent_root,
        state_root,
        body: body.into(),
    })
}
