//! # Driven Ports (Outbound SPI)
//!
//! Stores the router writes into. All implementations are shared between
//! concurrent request handlers and must be `Send + Sync`.

use crate::domain::records::{BlobId, CrashInfo, FlowRequest, FlowResponse, HandlerRequest, Task};
use shared_types::{AgentId, FlowId, StoreError};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Flow requests and their responses.
pub trait FlowStore: Send + Sync {
    fn write_flow_requests(&self, requests: Vec<FlowRequest>) -> Result<(), StoreError>;

    fn read_flow_request(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
        request_id: u64,
    ) -> Result<Option<FlowRequest>, StoreError>;

    /// Write keyed by (flow, request, response); rewriting the same key
    /// replaces the earlier response.
    fn write_flow_response(&self, response: FlowResponse) -> Result<(), StoreError>;

    /// Every request of a flow with its responses ordered by response id.
    fn read_all_flow_requests_and_responses(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
    ) -> Result<Vec<(FlowRequest, BTreeMap<u64, FlowResponse>)>, StoreError>;
}

/// Content-addressed blob storage.
pub trait BlobStore: Send + Sync {
    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, StoreError>;

    fn write_blob(&self, id: BlobId, data: Vec<u8>) -> Result<(), StoreError>;

    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Agent crash records.
pub trait CrashStore: Send + Sync {
    fn write_crash_info(&self, agent_id: &AgentId, crash: CrashInfo) -> Result<(), StoreError>;

    fn read_crash_info(&self, agent_id: &AgentId) -> Result<Vec<CrashInfo>, StoreError>;
}

/// Named queues drained asynchronously by well-known handlers.
pub trait HandlerQueue: Send + Sync {
    fn write_handler_request(&self, request: HandlerRequest) -> Result<(), StoreError>;

    /// Requests queued for `handler_name`, oldest first.
    fn read_handler_requests(&self, handler_name: &str) -> Result<Vec<HandlerRequest>, StoreError>;

    fn delete_handler_requests(&self, request_ids: &[Uuid]) -> Result<(), StoreError>;
}

/// Tasks waiting to be delivered to agents.
pub trait TaskStore: Send + Sync {
    fn write_pending_tasks(&self, agent_id: &AgentId, tasks: Vec<Task>) -> Result<(), StoreError>;

    /// Pending tasks ordered by task id. Reading does not remove them.
    fn read_pending_tasks(&self, agent_id: &AgentId) -> Result<Vec<Task>, StoreError>;

    fn delete_pending_tasks(&self, agent_id: &AgentId, task_ids: &[u64]) -> Result<(), StoreError>;
}
