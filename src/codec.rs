//! # Frame Codec
//!
//! `encode`/`decode` implement the three-stage pipeline from `spec.md`
//! §4.1: serialize (`bincode`) → compress (`flate2` zlib) → authenticated
//! encrypt (`fernet`, a direct Rust implementation of the AES-128-CBC +
//! HMAC-SHA256 construction the spec names). Decode inverts in reverse
//! order and collapses every possible failure — bad ciphertext, a broken
//! integrity tag, corrupt compressed bytes, or a malformed serialized
//! value — into a single [`CodecError::DecodeFailed`], so a caller can
//! never distinguish which stage rejected the frame.

use crate::config::Configuration;
use crate::error::CodecError;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;

/// Serialize, compress, and encrypt `value` into an opaque frame ready to
/// be written to a socket and half-closed.
pub fn encode<T: Serialize>(value: &T, config: &Configuration) -> Result<Vec<u8>, CodecError> {
    let serialized =
        bincode::serialize(value).map_err(|e| CodecError::EncodeFailed(e.to_string()))?;

    let mut compressor = ZlibEncoder::new(Vec::new(), Compression::default());
    compressor
        .write_all(&serialized)
        .map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
    let compressed = compressor
        .finish()
        .map_err(|e| CodecError::EncodeFailed(e.to_string()))?;

    let fernet = fernet::Fernet::new(config.fernet_key())
        .ok_or_else(|| CodecError::EncodeFailed("invalid key material".to_string()))?;
    let token = fernet.encrypt(&compressed);

    Ok(token.into_bytes())
}

/// Invert [`encode`]. Any failure at any stage is reported as
/// [`CodecError::DecodeFailed`], never a more specific variant.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], config: &Configuration) -> Result<T, CodecError> {
    let fernet = fernet::Fernet::new(config.fernet_key()).ok_or(CodecError::DecodeFailed)?;
    let token = std::str::from_utf8(bytes).map_err(|_| CodecError::DecodeFailed)?;
    let compressed = fernet.decrypt(token).map_err(|_| CodecError::DecodeFailed)?;

    let mut decompressor = ZlibDecoder::new(Vec::new());
    decompressor
        .write_all(&compressed)
        .map_err(|_| CodecError::DecodeFailed)?;
    let serialized = decompressor.finish().map_err(|_| CodecError::DecodeFailed)?;

    bincode::deserialize(&serialized).map_err(|_| CodecError::DecodeFailed)
}
