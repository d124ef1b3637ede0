//! # Shared Crypto - Fleet-Comms Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305 | Envelope payload encryption |
//! | `hashing` | BLAKE3, SHA-256 | Key derivation, content addressing |
//! | `mac` | HMAC-SHA256 | Envelope integrity |
//! | `rsa_keys` | RSA-OAEP, RSA PKCS#1 v1.5 | Session key wrapping, signatures |
//! | `certificate` | X.509 (rcgen, x509-parser) | Agent and server identity, enrollment CSRs |
//! | `compression` | zlib | Payload and blob compression |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit random nonce per encryption
//! - **HMAC**: constant-time verification
//! - **Key separation**: MAC and metadata keys are derived, never the raw session key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod certificate;
pub mod compression;
pub mod errors;
pub mod hashing;
pub mod mac;
pub mod rsa_keys;
pub mod symmetric;

// Re-exports
pub use certificate::{Certificate, CertificateAuthority, CertificateRequest};
pub use errors::CryptoError;
pub use hashing::{blake3_derive_key, sha256, Hash};
pub use mac::{hmac_sha256, verify_hmac_sha256};
pub use rsa_keys::{RsaKeyPair, RsaPublicKey, DEFAULT_KEY_BITS};
pub use symmetric::{decrypt, encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
