//! # Control Endpoint
//!
//! One agent exchange: decrypt the envelope, route its messages, then answer
//! with whatever the agent is allowed to receive.
//!
//! | Trust | Status | Body |
//! |-------|--------|------|
//! | Undecodable envelope | 500 | empty |
//! | `Unauthenticated` | 406 | empty, agent should enrol |
//! | `Desynchronized` | 200 | sealed empty batch |
//! | `Authenticated` | 200 | sealed pending tasks |
//!
//! The response envelope always echoes the request timestamp as its nonce.

use fc_03_server_comms::{AgentMetadataStore, ServerCommunicator};
use fc_04_dispatch::DispatchRouter;
use fleet_telemetry::metrics::FRONTEND_REQUESTS;
use shared_types::{AuthState, Message};
use std::sync::Arc;
use tracing::{debug, warn};

/// Status and body of a control exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ControlResponse {
    pub const OK: u16 = 200;
    pub const NOT_ACCEPTABLE: u16 = 406;
    pub const INTERNAL_ERROR: u16 = 500;

    fn ok(body: Vec<u8>) -> Self {
        Self {
            status: Self::OK,
            body,
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Glue between the server communicator and the dispatch router.
pub struct FrontendServer<S: AgentMetadataStore> {
    comms: Arc<ServerCommunicator<S>>,
    router: Arc<DispatchRouter>,
}

impl<S: AgentMetadataStore> FrontendServer<S> {
    pub fn new(comms: Arc<ServerCommunicator<S>>, router: Arc<DispatchRouter>) -> Self {
        Self { comms, router }
    }

    pub fn comms(&self) -> &Arc<ServerCommunicator<S>> {
        &self.comms
    }

    pub fn router(&self) -> &Arc<DispatchRouter> {
        &self.router
    }

    /// Handle one `POST /control` body.
    pub fn handle_control(&self, body: &[u8]) -> ControlResponse {
        let response = self.exchange(body);
        FRONTEND_REQUESTS
            .with_label_values(&[&response.status.to_string()])
            .inc();
        response
    }

    fn exchange(&self, body: &[u8]) -> ControlResponse {
        let batch = match self.comms.decrypt_message(body) {
            Ok(batch) => batch,
            Err(_) => return ControlResponse::empty(ControlResponse::INTERNAL_ERROR),
        };

        let report = self
            .router
            .dispatch(&batch.source, batch.auth_state, batch.messages);
        debug!(
            "{} from {}: {} dispatched, {} dropped, {} failed",
            batch.auth_state.as_str(),
            batch.source,
            report.dispatched,
            report.dropped,
            report.failures.len()
        );

        let outbound: Vec<Message> = match batch.auth_state {
            AuthState::Unauthenticated => {
                return ControlResponse::empty(ControlResponse::NOT_ACCEPTABLE)
            }
            AuthState::Desynchronized => Vec::new(),
            // Tasks stay pending on a read failure and go out next poll.
            AuthState::Authenticated => self
                .router
                .drain_tasks(&batch.source)
                .unwrap_or_else(|e| {
                    warn!("Could not read tasks for {}: {}", batch.source, e);
                    Vec::new()
                }),
        };

        match self
            .comms
            .encode_messages(&batch.source, &outbound, batch.timestamp)
        {
            Ok(bytes) => ControlResponse::ok(bytes),
            Err(e) => {
                warn!("Could not seal response for {}: {}", batch.source, e);
                ControlResponse::empty(ControlResponse::INTERNAL_ERROR)
            }
        }
    }
}
