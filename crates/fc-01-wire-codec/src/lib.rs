//! # fc-01 Wire Codec
//!
//! Turns message batches into encrypted, authenticated envelopes and back.
//!
//! ## Envelope Layout
//!
//! | Field | Contents |
//! |-------|----------|
//! | `api_version` | Protocol version, checked before anything else |
//! | `encrypted_cipher` | 32-byte session key, RSA-OAEP to the recipient |
//! | `encrypted_cipher_metadata` | Sender name, key, key digest, signature over `encrypted_cipher` |
//! | `packet_iv` | Fresh 24-byte nonce per envelope |
//! | `encrypted` | XChaCha20-Poly1305 over the packed message list |
//! | `hmac` | HMAC-SHA256 over every field above |
//!
//! ## Error Mapping
//!
//! - Bytes that do not parse, or plaintext that does not decode: [`CodecError::Decoding`]
//! - RSA unwrap, metadata, or signature failure: [`CodecError::Decryption`]
//! - HMAC mismatch: [`CodecError::Integrity`]
//! - Version mismatch: [`CodecError::UnsupportedVersion`]
//!
//! ## Session Reuse
//!
//! A [`SessionCipher`] wraps its session key once and then seals any number of
//! envelopes with fresh IVs. The receiving side caches the matching
//! [`InboundCipher`] keyed by [`Envelope::cipher_key`], so the RSA unwrap and
//! signature check run once per session rather than once per envelope.

pub mod cache;
pub mod cipher;
pub mod envelope;
pub mod errors;

pub use cache::CipherCache;
pub use cipher::{InboundCipher, LocalIdentity, SessionCipher};
pub use envelope::{
    CipherMetadata, Envelope, PackedMessageList, PayloadCompression, API_VERSION,
};
pub use errors::CodecError;
