//! Dispatch error types.

use shared_types::{FlowId, MessageKind, StoreError};
use thiserror::Error;

/// Failure to route one message. Earlier messages in the batch stay routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Response or status with no stored request to pair with.
    #[error("Unexpected response for flow {flow_id} request {request_id}")]
    UnexpectedResponse { flow_id: FlowId, request_id: u64 },

    /// Payload failed structural validation.
    #[error("Invalid {kind} message: {reason}")]
    Validation { kind: MessageKind, reason: String },

    /// Well-known session with no registered handler.
    #[error("No handler registered for well-known session {0}")]
    UnknownHandler(String),

    /// Body kind not accepted on this session.
    #[error("{kind} message not accepted on {session}")]
    Unsupported { kind: MessageKind, session: String },

    /// Blob could not be decoded.
    #[error("Blob error: {0}")]
    Blob(String),

    /// Backing store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure reported by a sink. Logged and counted, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Sink {sink} rejected parcel: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}
