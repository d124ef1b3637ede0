//! Codec error types.

use thiserror::Error;

/// Terminal failure for one envelope. Nothing from the envelope is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// HMAC over the envelope did not verify.
    #[error("Integrity error: HMAC verification failed")]
    Integrity,

    /// Session key or cipher metadata could not be recovered or verified.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Bytes or plaintext could not be parsed.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Peer speaks a protocol version this build does not.
    #[error("Unsupported API version: received {received}, supported {supported}")]
    UnsupportedVersion {
        /// Version on the wire.
        received: u16,
        /// Version this build speaks.
        supported: u16,
    },

    /// Building an outbound envelope failed.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CodecError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::Integrity => "integrity",
            CodecError::Decryption(_) => "decryption",
            CodecError::Decoding(_) => "decoding",
            CodecError::UnsupportedVersion { .. } => "unsupported_version",
            CodecError::Encoding(_) => "encoding",
        }
    }
}
