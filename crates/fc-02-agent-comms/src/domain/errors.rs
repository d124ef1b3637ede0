//! Agent communicator error types.

use fc_01_wire_codec::CodecError;
use shared_types::Timestamp;
use thiserror::Error;

/// HTTP-level failure. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, reset, or timed out.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Response body could not be read.
    #[error("Invalid response body: {0}")]
    Body(String),

    /// Server answered with a status the protocol does not use.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Client could not be built.
    #[error("Transport configuration: {0}")]
    Config(String),
}

/// Failure in the agent communicator or its transport loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentCommsError {
    /// Envelope-level codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Server certificate did not verify against the CA.
    #[error("Server certificate rejected: {0}")]
    Certificate(String),

    /// Nothing can be encoded until a server certificate is loaded.
    #[error("No server certificate loaded")]
    NoServerCertificate,

    /// Response does not answer the request that was sent.
    #[error("Response nonce {received} does not match request nonce {expected}")]
    NonceMismatch {
        expected: Timestamp,
        received: Timestamp,
    },

    /// Certificate request could not be built.
    #[error("Enrollment request: {0}")]
    Enrollment(String),

    /// Stats snapshot could not be serialized.
    #[error("Stats snapshot: {0}")]
    Stats(String),

    /// HTTP failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Consecutive failures exceeded the configured limit.
    #[error("Giving up after {0} consecutive connection errors")]
    ConnectionLimit(u32),

    /// The transport loop is gone.
    #[error("Transport loop has shut down")]
    Shutdown,
}
