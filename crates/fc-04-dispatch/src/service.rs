//! # Dispatch Router Service
//!
//! Stateless apart from its stores; one instance is shared by every request
//! handler. Each message is routed independently so a failure never rolls
//! back messages routed before it.

use crate::domain::errors::DispatchError;
use crate::domain::records::{
    BlobId, CrashInfo, FlowResponse, HandlerRequest, ResponsePayload,
};
use crate::domain::report::{DispatchReport, MessageFailure};
use crate::domain::sinks::SinkRegistry;
use crate::ports::outbound::{BlobStore, CrashStore, FlowStore, HandlerQueue, TaskStore};
use fleet_telemetry::metrics::{MESSAGES_DISPATCHED, MESSAGES_DROPPED, SINK_FAILURES};
use shared_crypto::compression;
use shared_types::{
    well_known, ActionResponse, AgentId, AuthState, Compression, DataBlob, FlowId, FlowStatus,
    Message, MessageBody, MessageKind, Parcel, SessionId, StatusCode, TimeSource,
};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stores the router writes into.
#[derive(Clone)]
pub struct DispatchStores {
    pub flows: Arc<dyn FlowStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub crashes: Arc<dyn CrashStore>,
    pub handlers: Arc<dyn HandlerQueue>,
    pub tasks: Arc<dyn TaskStore>,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Tasks older than this are skipped when draining.
    pub message_expiry: Duration,
    /// Well-known sessions with a handler queue.
    pub well_known_handlers: HashSet<String>,
    /// Subset of `well_known_handlers` that accepts untrusted senders.
    pub open_handlers: HashSet<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let handlers = [
            well_known::ENROLMENT,
            well_known::STARTUP,
            well_known::FOREMAN,
        ];
        Self {
            message_expiry: Duration::from_secs(600),
            well_known_handlers: handlers.iter().map(|h| h.to_string()).collect(),
            open_handlers: HashSet::from([well_known::ENROLMENT.to_string()]),
        }
    }
}

/// Why a message was discarded without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    Untrusted,
    UnknownSink,
}

impl DropReason {
    fn as_str(&self) -> &'static str {
        match self {
            DropReason::Untrusted => "untrusted",
            DropReason::UnknownSink => "unknown_sink",
        }
    }
}

enum Routed {
    Stored,
    Dropped(DropReason),
}

/// Routes decoded batches and drains pending tasks.
pub struct DispatchRouter {
    stores: DispatchStores,
    sinks: SinkRegistry,
    config: DispatchConfig,
    time: Arc<dyn TimeSource>,
}

impl DispatchRouter {
    pub fn new(
        stores: DispatchStores,
        sinks: SinkRegistry,
        config: DispatchConfig,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            stores,
            sinks,
            config,
            time,
        }
    }

    pub fn stores(&self) -> &DispatchStores {
        &self.stores
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Route every message of one decoded envelope.
    pub fn dispatch(
        &self,
        agent_id: &AgentId,
        auth_state: AuthState,
        messages: Vec<Message>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (index, message) in messages.into_iter().enumerate() {
            let kind = message.kind();
            match self.route(agent_id, auth_state, message) {
                Ok(Routed::Stored) => {
                    MESSAGES_DISPATCHED.with_label_values(&[kind.as_str()]).inc();
                    report.dispatched += 1;
                }
                Ok(Routed::Dropped(reason)) => {
                    MESSAGES_DROPPED.with_label_values(&[reason.as_str()]).inc();
                    report.dropped += 1;
                }
                Err(error) => {
                    warn!(
                        "[fc-04] Failed to route {} message {} from {}: {}",
                        kind, index, agent_id, error
                    );
                    report.failures.push(MessageFailure { index, kind, error });
                }
            }
        }
        debug!(
            "[fc-04] {}: dispatched={} dropped={} failed={}",
            agent_id,
            report.dispatched,
            report.dropped,
            report.failures.len()
        );
        report
    }

    fn route(
        &self,
        agent_id: &AgentId,
        auth_state: AuthState,
        message: Message,
    ) -> Result<Routed, DispatchError> {
        if auth_state != AuthState::Authenticated {
            let open_handler = message
                .session
                .well_known_name()
                .filter(|name| self.config.open_handlers.contains(*name))
                .map(str::to_string);
            return match open_handler {
                Some(name) => self.enqueue_for_handler(agent_id, auth_state, name, message),
                None => {
                    warn!(
                        "[fc-04] Dropping {} message on {} from {} agent {}",
                        message.kind(),
                        message.session,
                        auth_state,
                        agent_id
                    );
                    Ok(Routed::Dropped(DropReason::Untrusted))
                }
            };
        }

        if let MessageBody::Parcel(parcel) = &message.body {
            return Ok(self.deliver_parcel(agent_id, parcel));
        }
        match message.session.clone() {
            SessionId::WellKnown(name) if name == well_known::TRANSFER_STORE => {
                match message.body {
                    MessageBody::Blob(blob) => self.store_blob(blob),
                    body => Err(DispatchError::Unsupported {
                        kind: body.kind(),
                        session: message.session.to_string(),
                    }),
                }
            }
            SessionId::WellKnown(name) => {
                self.enqueue_for_handler(agent_id, auth_state, name, message)
            }
            SessionId::Flow(flow_id) => self.write_flow_message(agent_id, &flow_id, &message),
        }
    }

    fn deliver_parcel(&self, agent_id: &AgentId, parcel: &Parcel) -> Routed {
        let Some(sink) = self.sinks.get(&parcel.sink) else {
            warn!("[fc-04] No sink registered for {}", parcel.sink);
            return Routed::Dropped(DropReason::UnknownSink);
        };
        match panic::catch_unwind(AssertUnwindSafe(|| sink.accept(agent_id, parcel))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                SINK_FAILURES.with_label_values(&[parcel.sink.as_str()]).inc();
                warn!("[fc-04] {}", e);
            }
            Err(_) => {
                SINK_FAILURES.with_label_values(&[parcel.sink.as_str()]).inc();
                error!("[fc-04] Sink {} panicked on a parcel from {}", parcel.sink, agent_id);
            }
        }
        Routed::Stored
    }

    fn store_blob(&self, blob: DataBlob) -> Result<Routed, DispatchError> {
        let data = match blob.compression {
            Compression::Uncompressed => blob.data,
            Compression::Zlib => compression::decompress(&blob.data)
                .map_err(|e| DispatchError::Blob(e.to_string()))?,
        };
        let id = BlobId::of(&data);
        if self.stores.blobs.check_blob_exists(&id)? {
            debug!("[fc-04] Blob {} already stored", id);
        } else {
            self.stores.blobs.write_blob(id, data)?;
            debug!("[fc-04] Stored blob {}", id);
        }
        Ok(Routed::Stored)
    }

    fn enqueue_for_handler(
        &self,
        agent_id: &AgentId,
        auth_state: AuthState,
        handler_name: String,
        message: Message,
    ) -> Result<Routed, DispatchError> {
        if !self.config.well_known_handlers.contains(&handler_name) {
            return Err(DispatchError::UnknownHandler(handler_name));
        }
        self.stores.handlers.write_handler_request(HandlerRequest {
            request_id: Uuid::new_v4(),
            handler_name,
            agent_id: agent_id.clone(),
            auth_state,
            message,
            received_at: self.time.now(),
        })?;
        Ok(Routed::Stored)
    }

    fn write_flow_message(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
        message: &Message,
    ) -> Result<Routed, DispatchError> {
        let request = self
            .stores
            .flows
            .read_flow_request(agent_id, flow_id, message.request_id)?
            .ok_or_else(|| DispatchError::UnexpectedResponse {
                flow_id: flow_id.clone(),
                request_id: message.request_id,
            })?;

        let payload = match &message.body {
            MessageBody::Data(data) => ResponsePayload::Data(data.clone()),
            MessageBody::Blob(blob) => ResponsePayload::Blob(blob.clone()),
            MessageBody::Status(status) => {
                if status.code == StatusCode::ClientKilled {
                    self.record_crash(agent_id, flow_id, message, status)?;
                }
                ResponsePayload::Status(status.clone())
            }
            MessageBody::Structured(response) => structured_payload(response)?,
            MessageBody::Enrollment(_) | MessageBody::Parcel(_) => {
                return Err(DispatchError::Unsupported {
                    kind: message.kind(),
                    session: message.session.to_string(),
                })
            }
        };
        let terminal = payload.is_terminal();

        self.stores.flows.write_flow_response(FlowResponse {
            agent_id: agent_id.clone(),
            flow_id: flow_id.clone(),
            request_id: request.request_id,
            response_id: message.response_id,
            payload,
            received_at: self.time.now(),
        })?;

        if terminal && message.task_id != 0 {
            self.stores
                .tasks
                .delete_pending_tasks(agent_id, &[message.task_id])?;
        }
        Ok(Routed::Stored)
    }

    fn record_crash(
        &self,
        agent_id: &AgentId,
        flow_id: &FlowId,
        message: &Message,
        status: &FlowStatus,
    ) -> Result<(), DispatchError> {
        info!("[fc-04] Agent {} crashed while running flow {}", agent_id, flow_id);
        self.stores.crashes.write_crash_info(
            agent_id,
            CrashInfo {
                agent_id: agent_id.clone(),
                flow_id: flow_id.clone(),
                session: message.session.clone(),
                crash_message: status.error_message.clone(),
                backtrace: status.backtrace.clone(),
                timestamp: self.time.now(),
            },
        )?;
        Ok(())
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Pending tasks for `agent_id` as outbound messages.
    ///
    /// Nothing is deleted, so calling twice yields the same messages. Tasks
    /// older than the message expiry horizon are skipped.
    pub fn drain_tasks(&self, agent_id: &AgentId) -> Result<Vec<Message>, DispatchError> {
        let now = self.time.now();
        let tasks = self.stores.tasks.read_pending_tasks(agent_id)?;
        let total = tasks.len();
        let messages: Vec<Message> = tasks
            .iter()
            .filter(|task| task.created_at.saturating_add(self.config.message_expiry) >= now)
            .map(|task| task.to_message())
            .collect();
        if messages.len() < total {
            debug!(
                "[fc-04] Skipped {} expired tasks for {}",
                total - messages.len(),
                agent_id
            );
        }
        Ok(messages)
    }
}

/// Exactly one of status or result must be present.
fn structured_payload(response: &ActionResponse) -> Result<ResponsePayload, DispatchError> {
    match (&response.status, &response.result) {
        (Some(status), None) => Ok(ResponsePayload::Status(match &status.error {
            None => FlowStatus {
                network_bytes_sent: status.network_bytes_sent,
                ..FlowStatus::ok()
            },
            Some(error) => FlowStatus {
                network_bytes_sent: status.network_bytes_sent,
                ..FlowStatus::error(error.clone())
            },
        })),
        (None, Some(result)) => Ok(ResponsePayload::Data(result.clone())),
        (None, None) => Err(DispatchError::Validation {
            kind: MessageKind::Structured,
            reason: "Unexpected response: neither status nor result".into(),
        }),
        (Some(_), Some(_)) => Err(DispatchError::Validation {
            kind: MessageKind::Structured,
            reason: "Unexpected response: both status and result".into(),
        }),
    }
}
