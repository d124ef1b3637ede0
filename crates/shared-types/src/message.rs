//! # Messages
//!
//! The unit of exchange between agents and the server. A batch of messages
//! travels inside one encrypted envelope.

use crate::entities::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level the decoding side assigned to a message.
///
/// Set exclusively by the receiving communicator. Whatever a peer put in this
/// field on the wire is overwritten before the message is handed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthState {
    /// Sender has no usable enrollment record.
    #[default]
    Unauthenticated,
    /// Sender is enrolled and its clock moved forward.
    Authenticated,
    /// Sender is enrolled but its clock went backwards (possible replay).
    Desynchronized,
}

impl AuthState {
    /// Lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::Desynchronized => "desynchronized",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BODIES
// =============================================================================

/// Compression applied to a blob payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Raw bytes.
    #[default]
    Uncompressed,
    /// zlib stream.
    Zlib,
}

/// A chunk of file data bound for the transfer store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlob {
    /// Payload, possibly compressed.
    pub data: Vec<u8>,
    /// How `data` is encoded.
    pub compression: Compression,
}

/// Outcome code carried by a flow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Action completed.
    Ok,
    /// Action failed with an error.
    GenericError,
    /// Agent process died while running the action.
    ClientKilled,
    /// Action exceeded its CPU budget.
    CpuLimitExceeded,
    /// Action exceeded its network budget.
    NetworkLimitExceeded,
}

/// Terminal status of an action request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatus {
    /// Outcome.
    pub code: StatusCode,
    /// Human-readable failure detail.
    pub error_message: Option<String>,
    /// Bytes the action sent over the network.
    pub network_bytes_sent: u64,
    /// Backtrace or crash detail reported by the agent.
    pub backtrace: Option<String>,
}

impl FlowStatus {
    /// Successful status.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            error_message: None,
            network_bytes_sent: 0,
            backtrace: None,
        }
    }

    /// Failed status with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::GenericError,
            error_message: Some(message.into()),
            network_bytes_sent: 0,
            backtrace: None,
        }
    }
}

/// Status half of a structured action response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
    /// `None` on success.
    pub error: Option<String>,
    /// Bytes the action sent over the network.
    pub network_bytes_sent: u64,
}

/// Response from a structured action.
///
/// Exactly one of `status` or `result` is expected to be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Completion status.
    pub status: Option<ActionStatus>,
    /// Serialized result item.
    pub result: Option<Vec<u8>>,
}

/// Telemetry payload routed to a named sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Sink identifier.
    pub sink: String,
    /// Sink-specific payload.
    pub payload: Vec<u8>,
}

/// Sink that receives periodic agent statistics.
pub const CLIENT_STATS_SINK: &str = "client-stats";

/// Certificate signing request wrapped for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    /// Serialized, self-signed certificate request.
    pub csr: Vec<u8>,
}

/// Closed set of message bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Opaque action arguments or responses.
    Data(Vec<u8>),
    /// File data for the transfer store.
    Blob(DataBlob),
    /// Terminal status of an action request.
    Status(FlowStatus),
    /// Response from a structured action.
    Structured(ActionResponse),
    /// Telemetry destined for a sink.
    Parcel(Parcel),
    /// Enrollment request from an agent without a certificate.
    Enrollment(EnrollmentRequest),
}

/// Flat discriminant of [`MessageBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Data,
    Blob,
    Status,
    Structured,
    Parcel,
    Enrollment,
}

impl MessageKind {
    /// Lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Data => "data",
            MessageKind::Blob => "blob",
            MessageKind::Status => "status",
            MessageKind::Structured => "structured",
            MessageKind::Parcel => "parcel",
            MessageKind::Enrollment => "enrollment",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MessageBody {
    /// Discriminant of this body.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Data(_) => MessageKind::Data,
            MessageBody::Blob(_) => MessageKind::Blob,
            MessageBody::Status(_) => MessageKind::Status,
            MessageBody::Structured(_) => MessageKind::Structured,
            MessageBody::Parcel(_) => MessageKind::Parcel,
            MessageBody::Enrollment(_) => MessageKind::Enrollment,
        }
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// One message in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Common name of the sender. Stamped by the decoder.
    pub source: Option<String>,
    /// Flow or well-known handler this message belongs to.
    pub session: SessionId,
    /// Request this message answers (or is).
    pub request_id: u64,
    /// Position of this response within the request.
    pub response_id: u64,
    /// Task that produced the request on the server side.
    pub task_id: u64,
    /// Action name.
    pub name: String,
    /// Ask the agent to poll at its minimum interval.
    pub require_fastpoll: bool,
    /// Trust level. Stamped by the decoder.
    pub auth_state: AuthState,
    /// Payload.
    pub body: MessageBody,
}

impl Message {
    /// New message with zeroed sequencing and unauthenticated state.
    pub fn new(session: SessionId, name: impl Into<String>, body: MessageBody) -> Self {
        Self {
            source: None,
            session,
            request_id: 0,
            response_id: 0,
            task_id: 0,
            name: name.into(),
            require_fastpoll: false,
            auth_state: AuthState::Unauthenticated,
            body,
        }
    }

    /// Set request and response sequence numbers.
    #[must_use]
    pub fn with_ids(mut self, request_id: u64, response_id: u64) -> Self {
        self.request_id = request_id;
        self.response_id = response_id;
        self
    }

    /// Set the originating task.
    #[must_use]
    pub fn with_task_id(mut self, task_id: u64) -> Self {
        self.task_id = task_id;
        self
    }

    /// Request fast polling from the agent.
    #[must_use]
    pub fn with_fastpoll(mut self, require_fastpoll: bool) -> Self {
        self.require_fastpoll = require_fastpoll;
        self
    }

    /// Kind of the body.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Overwrite the decoder-owned fields.
    pub fn stamp(&mut self, source: &str, auth_state: AuthState) {
        self.source = Some(source.to_string());
        self.auth_state = auth_state;
    }
}
