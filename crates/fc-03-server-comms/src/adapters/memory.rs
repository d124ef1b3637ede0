//! In-memory agent metadata store.
//!
//! Per-agent atomicity comes from `DashMap` shard locks held for the
//! duration of each update.

use crate::ports::outbound::AgentMetadataStore;
use dashmap::DashMap;
use shared_types::{AgentId, AgentRecord, ClockAdvance, StoreError, Timestamp};

/// `DashMap`-backed [`AgentMetadataStore`].
#[derive(Debug, Default)]
pub struct InMemoryAgentMetadataStore {
    records: DashMap<AgentId, AgentRecord>,
}

impl InMemoryAgentMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known agents.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AgentMetadataStore for InMemoryAgentMetadataStore {
    fn read_agent(&self, agent_id: &AgentId) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self.records.get(agent_id).map(|r| r.value().clone()))
    }

    fn write_agent(&self, record: AgentRecord) -> Result<(), StoreError> {
        self.records.insert(record.agent_id.clone(), record);
        Ok(())
    }

    fn set_certificate(
        &self,
        agent_id: &AgentId,
        certificate_pem: String,
        first_seen: Timestamp,
    ) -> Result<(), StoreError> {
        self.records
            .entry(agent_id.clone())
            .or_insert_with(|| AgentRecord::new(agent_id.clone(), first_seen))
            .certificate = Some(certificate_pem);
        Ok(())
    }

    fn advance_clock(
        &self,
        agent_id: &AgentId,
        clock: Timestamp,
        ping: Timestamp,
    ) -> Result<ClockAdvance, StoreError> {
        let Some(mut record) = self.records.get_mut(agent_id) else {
            return Ok(ClockAdvance::Missing);
        };
        match record.clock {
            Some(stored) if clock < stored => Ok(ClockAdvance::Stale { stored }),
            _ => {
                record.clock = Some(clock);
                record.ping = Some(ping);
                Ok(ClockAdvance::Advanced(record.value().clone()))
            }
        }
    }

    fn add_labels(&self, agent_id: &AgentId, labels: &[String]) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))?;
        for label in labels {
            if !record.labels.contains(label) {
                record.labels.push(label.clone());
            }
        }
        Ok(())
    }

    fn remove_labels(&self, agent_id: &AgentId, labels: &[String]) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))?;
        record.labels.retain(|l| !labels.contains(l));
        Ok(())
    }
}
