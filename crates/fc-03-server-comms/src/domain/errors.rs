//! Server communicator errors.

use fc_01_wire_codec::CodecError;
use shared_types::{AgentId, StoreError};
use thiserror::Error;

/// Failure to decode or encode an envelope on the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerCommsError {
    /// Envelope-level codec failure; nothing was delivered.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Agent metadata store failure.
    #[error("Agent metadata store: {0}")]
    Store(#[from] StoreError),

    /// No usable certificate on file for the destination agent.
    #[error("Unknown peer: {0}")]
    UnknownPeer(AgentId),

    /// Server certificate or key rejected.
    #[error("Certificate error: {0}")]
    Certificate(String),
}

impl ServerCommsError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerCommsError::Codec(e) => e.kind(),
            ServerCommsError::Store(_) => "store",
            ServerCommsError::UnknownPeer(_) => "unknown_peer",
            ServerCommsError::Certificate(_) => "certificate",
        }
    }
}
