//! # Telemetry Sinks
//!
//! Parcels carry a sink id; the registry maps ids to handlers.

use crate::domain::errors::SinkError;
use shared_types::{AgentId, Parcel};
use std::collections::HashMap;
use std::sync::Arc;

/// Consumer of parcels for one sink id.
pub trait Sink: Send + Sync {
    fn accept(&self, agent_id: &AgentId, parcel: &Parcel) -> Result<(), SinkError>;
}

/// Sink id to handler map.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: HashMap<String, Arc<dyn Sink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` under `id`, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, sink: Arc<dyn Sink>) {
        self.sinks.insert(id.into(), sink);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Sink>> {
        self.sinks.get(id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.sinks.keys()).finish()
    }
}
