//! # Core Entities
//!
//! Identities and records referenced by both sides of the protocol.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

// =============================================================================
// TIMESTAMP
// =============================================================================

/// Microseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wrap a raw microsecond count.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Convenience constructor for whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Raw microsecond count.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Add a duration, saturating at `u64::MAX`.
    pub fn saturating_add(&self, duration: Duration) -> Timestamp {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

// =============================================================================
// IDENTITIES
// =============================================================================

/// Self-certifying agent identity: `C.` followed by 16 lowercase hex digits.
///
/// The hex digits are the first eight bytes of SHA-256 over the agent's
/// PKCS#1 public key DER, so the identity can be recomputed from the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Prefix shared by every agent identity.
    pub const PREFIX: &'static str = "C.";

    /// Derive the identity from a public key in PKCS#1 DER form.
    pub fn from_public_key_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        Self(format!("{}{}", Self::PREFIX, hex::encode(&digest[..8])))
    }

    /// Parse an identity string, rejecting anything not shaped like `C.<16 hex>`.
    pub fn parse(value: &str) -> Option<Self> {
        let hex_part = value.strip_prefix(Self::PREFIX)?;
        let well_formed = hex_part.len() == 16
            && hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        well_formed.then(|| Self(value.to_string()))
    }

    /// The identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a flow running against one agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl FlowId {
    /// Random eight-hex-digit flow identifier.
    pub fn random() -> Self {
        let raw = uuid::Uuid::new_v4();
        Self(hex::encode_upper(&raw.as_bytes()[..4]))
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known handler names.
pub mod well_known {
    /// Enrollment requests from agents without a certificate.
    pub const ENROLMENT: &str = "Enrol";
    /// Content-addressed blob uploads.
    pub const TRANSFER_STORE: &str = "TransferStore";
    /// Agent startup announcements.
    pub const STARTUP: &str = "Startup";
    /// Agent-initiated flow requests.
    pub const FOREMAN: &str = "Foreman";
    /// Periodic agent statistics.
    pub const STATS: &str = "Stats";
}

/// Destination of a message: either a flow or a well-known handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionId {
    /// A flow running against the agent.
    Flow(FlowId),
    /// A named long-lived handler on the server.
    WellKnown(String),
}

impl SessionId {
    /// Session addressed to a well-known handler.
    pub fn well_known(name: &str) -> Self {
        SessionId::WellKnown(name.to_string())
    }

    /// Handler name if this is a well-known session.
    pub fn well_known_name(&self) -> Option<&str> {
        match self {
            SessionId::WellKnown(name) => Some(name),
            SessionId::Flow(_) => None,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Flow(flow) => write!(f, "flows/{flow}"),
            SessionId::WellKnown(name) => write!(f, "flows/W:{name}"),
        }
    }
}

// =============================================================================
// AGENT RECORD
// =============================================================================

/// Server-side bookkeeping for one agent.
///
/// Created on enrollment and updated on every accepted envelope. This layer
/// never deletes records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// The agent this record describes.
    pub agent_id: AgentId,
    /// Highest client timestamp accepted so far.
    pub clock: Option<Timestamp>,
    /// Server wall time of the last authenticated contact.
    pub ping: Option<Timestamp>,
    /// PEM-armored certificate issued at enrollment.
    pub certificate: Option<String>,
    /// Free-form labels, used for ping accounting.
    pub labels: Vec<String>,
    /// Server wall time of the first enrollment.
    pub first_seen: Timestamp,
}

impl AgentRecord {
    /// Fresh record with no clock and no certificate.
    pub fn new(agent_id: AgentId, first_seen: Timestamp) -> Self {
        Self {
            agent_id,
            clock: None,
            ping: None,
            certificate: None,
            labels: Vec::new(),
            first_seen,
        }
    }
}

/// Result of an atomic clock advance on an agent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockAdvance {
    /// Clock moved to the supplied timestamp (or stayed equal).
    Advanced(AgentRecord),
    /// Supplied timestamp is older than the stored clock; nothing changed.
    Stale {
        /// Clock value currently stored.
        stored: Timestamp,
    },
    /// No record exists for the agent.
    Missing,
}

/// Periodic statistics snapshot an agent reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStats {
    /// Agent-side time the snapshot was taken.
    pub timestamp: Timestamp,
    /// Messages waiting in the out-queue.
    pub out_queue_len: u64,
    /// Consecutive failed exchanges at snapshot time.
    pub connection_errors: u32,
    /// Total envelope bytes posted since start.
    pub bytes_sent: u64,
    /// Total response bytes received since start.
    pub bytes_received: u64,
}
