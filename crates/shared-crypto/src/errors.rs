//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid nonce length
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected nonce length in bytes
        expected: usize,
        /// Actual nonce length in bytes
        actual: usize,
    },

    /// MAC did not match
    #[error("HMAC verification failed")]
    MacMismatch,

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Invalid public key
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid private key
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate could not be parsed or encoded
    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Certificate or request could not be built
    #[error("Certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate not signed by the expected authority
    #[error("Certificate for {common_name} was not issued by {issuer}")]
    UntrustedCertificate {
        /// Subject of the rejected certificate
        common_name: String,
        /// Authority it was checked against
        issuer: String,
    },

    /// Certificate outside its validity window
    #[error("Certificate for {0} is expired or not yet valid")]
    CertificateExpired(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),
}
