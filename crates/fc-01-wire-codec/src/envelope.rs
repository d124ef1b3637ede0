//! # Envelope Types
//!
//! Serialized with bincode. The first two bytes of an encoded envelope are
//! always the little-endian `api_version`, so a version mismatch is reported
//! as such even when the rest of the layout differs.

use crate::CodecError;
use serde::{Deserialize, Serialize};
use shared_crypto::compression;
use shared_crypto::hashing::{sha256_framed, Hash};
use shared_types::{Message, Timestamp};

/// Protocol version spoken by this build.
pub const API_VERSION: u16 = 3;

/// Payloads at or above this size are offered to zlib.
const COMPRESSION_THRESHOLD: usize = 256;

/// One encrypted, authenticated batch on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub api_version: u16,
    pub encrypted_cipher: Vec<u8>,
    pub encrypted_cipher_metadata: Vec<u8>,
    pub packet_iv: [u8; 24],
    pub encrypted: Vec<u8>,
    pub hmac: [u8; 32],
}

impl Envelope {
    /// Encode for the HTTP body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Parse an HTTP body, checking the version first.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let version = bytes
            .get(..2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or_else(|| CodecError::Decoding("envelope truncated".into()))?;
        if version != API_VERSION {
            return Err(CodecError::UnsupportedVersion {
                received: version,
                supported: API_VERSION,
            });
        }
        bincode::deserialize(bytes).map_err(|e| CodecError::Decoding(e.to_string()))
    }

    /// Cache key for the inbound cipher that opens this envelope.
    pub fn cipher_key(&self) -> Hash {
        sha256_framed(&[&self.encrypted_cipher, &self.encrypted_cipher_metadata])
    }

    /// Bytes covered by the HMAC: every field except the tag itself.
    pub(crate) fn authenticated_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 + 16
                + self.encrypted_cipher.len()
                + self.encrypted_cipher_metadata.len()
                + self.packet_iv.len()
                + self.encrypted.len(),
        );
        out.extend_from_slice(&self.api_version.to_le_bytes());
        for field in [&self.encrypted_cipher, &self.encrypted_cipher_metadata] {
            out.extend_from_slice(&(field.len() as u64).to_le_bytes());
            out.extend_from_slice(field);
        }
        out.extend_from_slice(&self.packet_iv);
        out.extend_from_slice(&self.encrypted);
        out
    }
}

/// Sender details, encrypted under a key derived from the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherMetadata {
    /// Sender common name.
    pub source: String,
    /// Sender public key, PKCS#1 DER.
    pub source_public_key: Vec<u8>,
    /// SHA-256 of `source_public_key`.
    pub key_digest: Hash,
    /// Sender signature over `encrypted_cipher`.
    pub signature: Vec<u8>,
}

/// Compression applied to a packed message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadCompression {
    Uncompressed,
    Zlib,
}

/// Plaintext inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedMessageList {
    /// Sender clock; doubles as the request nonce.
    pub timestamp: Timestamp,
    pub compression: PayloadCompression,
    /// bincode-encoded `Vec<Message>`, possibly zlib-compressed.
    pub data: Vec<u8>,
}

impl PackedMessageList {
    /// Serialize and, when it pays off, compress a batch.
    pub fn pack(messages: &[Message], timestamp: Timestamp) -> Result<Self, CodecError> {
        let raw = bincode::serialize(messages).map_err(|e| CodecError::Encoding(e.to_string()))?;
        if raw.len() >= COMPRESSION_THRESHOLD {
            let packed =
                compression::compress(&raw).map_err(|e| CodecError::Encoding(e.to_string()))?;
            if packed.len() < raw.len() {
                return Ok(Self {
                    timestamp,
                    compression: PayloadCompression::Zlib,
                    data: packed,
                });
            }
        }
        Ok(Self {
            timestamp,
            compression: PayloadCompression::Uncompressed,
            data: raw,
        })
    }

    /// Inverse of [`PackedMessageList::pack`].
    pub fn unpack(&self) -> Result<Vec<Message>, CodecError> {
        let raw = match self.compression {
            PayloadCompression::Uncompressed => std::borrow::Cow::Borrowed(&self.data[..]),
            PayloadCompression::Zlib => std::borrow::Cow::Owned(
                compression::decompress(&self.data)
                    .map_err(|e| CodecError::Decoding(e.to_string()))?,
            ),
        };
        bincode::deserialize(&raw).map_err(|e| CodecError::Decoding(e.to_string()))
    }
}
