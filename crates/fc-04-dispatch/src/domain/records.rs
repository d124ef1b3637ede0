//! # Stored Records
//!
//! Rows written and read through the outbound ports.

use serde::{Deserialize, Serialize};
use shared_crypto::hashing::sha256;
use shared_types::{
    AgentId, AuthState, DataBlob, FlowId, FlowStatus, Message, MessageBody, SessionId, Timestamp,
};
use std::fmt;
use uuid::Uuid;

/// An action request a flow sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub agent_id: AgentId,
    pub flow_id: FlowId,
    pub request_id: u64,
    pub action: String,
    pub created_at: Timestamp,
}

/// Payload stored for one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Intermediate result.
    Data(Vec<u8>),
    /// Intermediate file data.
    Blob(DataBlob),
    /// Terminal status.
    Status(FlowStatus),
}

impl ResponsePayload {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponsePayload::Status(_))
    }
}

/// A response paired with its request, keyed by `response_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub agent_id: AgentId,
    pub flow_id: FlowId,
    pub request_id: u64,
    pub response_id: u64,
    pub payload: ResponsePayload,
    pub received_at: Timestamp,
}

/// Content address of a blob: SHA-256 of its uncompressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub [u8; 32]);

impl BlobId {
    pub fn of(data: &[u8]) -> Self {
        Self(sha256(data))
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An agent crash observed while running a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashInfo {
    pub agent_id: AgentId,
    pub flow_id: FlowId,
    pub session: SessionId,
    pub crash_message: Option<String>,
    pub backtrace: Option<String>,
    pub timestamp: Timestamp,
}

/// Message parked for a well-known handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub request_id: Uuid,
    pub handler_name: String,
    pub agent_id: AgentId,
    pub auth_state: AuthState,
    pub message: Message,
    pub received_at: Timestamp,
}

/// Outbound work pending for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: u64,
    pub agent_id: AgentId,
    pub flow_id: FlowId,
    pub action: String,
    pub args: Vec<u8>,
    pub require_fastpoll: bool,
    pub created_at: Timestamp,
}

impl Task {
    /// Outbound message for one delivery attempt. The task id doubles as
    /// the request id.
    pub fn to_message(&self) -> Message {
        Message::new(
            SessionId::Flow(self.flow_id.clone()),
            self.action.clone(),
            MessageBody::Data(self.args.clone()),
        )
        .with_ids(self.task_id, 0)
        .with_task_id(self.task_id)
        .with_fastpoll(self.require_fastpoll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_id_is_sha256_hex() {
        assert_eq!(
            BlobId::of(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_task_message_uses_task_id_as_request_id() {
        let task = Task {
            task_id: 42,
            agent_id: AgentId::from_public_key_der(b"k"),
            flow_id: FlowId("F:1".into()),
            action: "ListDirectory".into(),
            args: b"/tmp".to_vec(),
            require_fastpoll: true,
            created_at: Timestamp::from_secs(1),
        };
        let message = task.to_message();
        assert_eq!(message.request_id, 42);
        assert_eq!(message.task_id, 42);
        assert_eq!(message.name, "ListDirectory");
        assert!(message.require_fastpoll);
        assert_eq!(message.session, SessionId::Flow(FlowId("F:1".into())));
    }
}
