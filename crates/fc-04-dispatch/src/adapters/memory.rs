//! # In-Memory Stores
//!
//! `parking_lot`-guarded maps for tests and single-node deployments.

use crate::domain::records::{BlobId, CrashInfo, FlowRequest, FlowResponse, HandlerRequest, Task};
use crate::ports::outbound::{BlobStore, CrashStore, FlowStore, HandlerQueue, TaskStore};
use parking_lot::RwLock;
use shared_types::{AgentId, FlowId, StoreError};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

type RequestKey = (AgentId, FlowId, u64);

// =============================================================================
// FLOWS
// =============================================================================

#[derive(Debug, Default)]
struct FlowTables {
    requests: BTreeMap<RequestKey, FlowRequest>,
    responses: BTreeMap<RequestKey, BTreeMap<u64, FlowResponse>>,
}

/// In-memory [`FlowStore`].
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    tables: RwLock<FlowTables>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowStore for InMemoryFlowStore {
    fn write_flow_requests(&self, requests: Vec<FlowRequest>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for request in requests {
            let key = (
                request.agent_id.clone(),
                request.flow_id.clone(),
                request.request_id,
            );
            tables.requests.insert(key, request);
        }
        Ok(())
    }

    fn read_flow_request(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
        request_id: u64,
    ) -> Result<Option<FlowRequest>, StoreError> {
        let key = (agent_id.clone(), flow_id.clone(), request_id);
        Ok(self.tables.read().requests.get(&key).cloned())
    }

    fn write_flow_response(&self, response: FlowResponse) -> Result<(), StoreError> {
        let key = (
            response.agent_id.clone(),
            response.flow_id.clone(),
            response.request_id,
        );
        let mut tables = self.tables.write();
        if !tables.requests.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "request {} of flow {}",
                response.request_id, response.flow_id
            )));
        }
        tables
            .responses
            .entry(key)
            .or_default()
            .insert(response.response_id, response);
        Ok(())
    }

    fn read_all_flow_requests_and_responses(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
    ) -> Result<Vec<(FlowRequest, BTreeMap<u64, FlowResponse>)>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .requests
            .iter()
            .filter(|((agent, flow, _), _)| agent == agent_id && flow == flow_id)
            .map(|(key, request)| {
                let responses = tables.responses.get(key).cloned().unwrap_or_default();
                (request.clone(), responses)
            })
            .collect())
    }
}

// =============================================================================
// BLOBS
// =============================================================================

/// In-memory [`BlobStore`].
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, StoreError> {
        Ok(self.blobs.read().contains_key(id))
    }

    fn write_blob(&self, id: BlobId, data: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.write().insert(id, data);
        Ok(())
    }

    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(id).cloned())
    }
}

// =============================================================================
// CRASHES
// =============================================================================

/// In-memory [`CrashStore`].
#[derive(Debug, Default)]
pub struct InMemoryCrashStore {
    crashes: RwLock<HashMap<AgentId, Vec<CrashInfo>>>,
}

impl InMemoryCrashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrashStore for InMemoryCrashStore {
    fn write_crash_info(&self, agent_id: &AgentId, crash: CrashInfo) -> Result<(), StoreError> {
        self.crashes
            .write()
            .entry(agent_id.clone())
            .or_default()
            .push(crash);
        Ok(())
    }

    fn read_crash_info(&self, agent_id: &AgentId) -> Result<Vec<CrashInfo>, StoreError> {
        Ok(self
            .crashes
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// HANDLER QUEUE
// =============================================================================

/// In-memory [`HandlerQueue`], FIFO per handler.
#[derive(Debug, Default)]
pub struct InMemoryHandlerQueue {
    queue: RwLock<Vec<HandlerRequest>>,
}

impl InMemoryHandlerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandlerQueue for InMemoryHandlerQueue {
    fn write_handler_request(&self, request: HandlerRequest) -> Result<(), StoreError> {
        self.queue.write().push(request);
        Ok(())
    }

    fn read_handler_requests(&self, handler_name: &str) -> Result<Vec<HandlerRequest>, StoreError> {
        Ok(self
            .queue
            .read()
            .iter()
            .filter(|r| r.handler_name == handler_name)
            .cloned()
            .collect())
    }

    fn delete_handler_requests(&self, request_ids: &[Uuid]) -> Result<(), StoreError> {
        self.queue
            .write()
            .retain(|r| !request_ids.contains(&r.request_id));
        Ok(())
    }
}

// =============================================================================
// TASKS
// =============================================================================

/// In-memory [`TaskStore`].
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<AgentId, BTreeMap<u64, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn write_pending_tasks(&self, agent_id: &AgentId, tasks: Vec<Task>) -> Result<(), StoreError> {
        let mut all = self.tasks.write();
        let pending = all.entry(agent_id.clone()).or_default();
        for task in tasks {
            pending.insert(task.task_id, task);
        }
        Ok(())
    }

    fn read_pending_tasks(&self, agent_id: &AgentId) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .read()
            .get(agent_id)
            .map(|pending| pending.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_pending_tasks(&self, agent_id: &AgentId, task_ids: &[u64]) -> Result<(), StoreError> {
        if let Some(pending) = self.tasks.write().get_mut(agent_id) {
            for id in task_ids {
                pending.remove(id);
            }
        }
        Ok(())
    }
}
