//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application must provide.

use shared_types::{AgentId, AgentRecord, ClockAdvance, StoreError, Timestamp};

/// Persistent per-agent bookkeeping.
///
/// # Thread Safety
///
/// Implementations are shared between concurrent request handlers.
/// [`AgentMetadataStore::advance_clock`] must be atomic per agent so that
/// concurrent advances leave the highest timestamp in place.
/// [`AgentMetadataStore::set_certificate`] must not lose label or clock
/// updates that race with it.
pub trait AgentMetadataStore: Send + Sync {
    /// Fetch a record, `None` if the agent never enrolled.
    fn read_agent(&self, agent_id: &AgentId) -> Result<Option<AgentRecord>, StoreError>;

    /// Create or replace a record.
    fn write_agent(&self, record: AgentRecord) -> Result<(), StoreError>;

    /// Store an issued certificate, creating the record with `first_seen`
    /// if the agent is new. Clock, ping and labels are left untouched.
    fn set_certificate(
        &self,
        agent_id: &AgentId,
        certificate_pem: String,
        first_seen: Timestamp,
    ) -> Result<(), StoreError>;

    /// Move the clock to `clock` if it is not older than the stored value,
    /// and set the ping to `ping` when it moves.
    fn advance_clock(
        &self,
        agent_id: &AgentId,
        clock: Timestamp,
        ping: Timestamp,
    ) -> Result<ClockAdvance, StoreError>;

    /// Add labels, ignoring ones already present.
    fn add_labels(&self, agent_id: &AgentId, labels: &[String]) -> Result<(), StoreError>;

    /// Remove labels.
    fn remove_labels(&self, agent_id: &AgentId, labels: &[String]) -> Result<(), StoreError>;
}
