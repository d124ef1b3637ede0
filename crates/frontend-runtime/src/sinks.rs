//! Telemetry sinks registered by the frontend.

use fc_04_dispatch::{Sink, SinkError};
use parking_lot::RwLock;
use shared_types::{AgentId, ClientStats, Parcel};
use std::collections::HashMap;
use tracing::debug;

/// Keeps the latest stats snapshot reported by each agent.
#[derive(Debug, Default)]
pub struct ClientStatsSink {
    latest: RwLock<HashMap<AgentId, ClientStats>>,
}

impl ClientStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, agent_id: &AgentId) -> Option<ClientStats> {
        self.latest.read().get(agent_id).cloned()
    }
}

impl Sink for ClientStatsSink {
    fn accept(&self, agent_id: &AgentId, parcel: &Parcel) -> Result<(), SinkError> {
        let stats: ClientStats =
            bincode::deserialize(&parcel.payload).map_err(|e| SinkError {
                sink: parcel.sink.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Stats from {}: queue={} errors={}",
            agent_id, stats.out_queue_len, stats.connection_errors
        );
        self.latest.write().insert(agent_id.clone(), stats);
        Ok(())
    }
}
