//! # Stats Cadence
//!
//! A snapshot goes out once an hour. While the agent is busy, or after a
//! handler asked for one, a minute since the last snapshot is enough.

use crate::domain::errors::AgentCommsError;
use shared_types::{
    well_known, ClientStats, Message, MessageBody, Parcel, SessionId, Timestamp,
    CLIENT_STATS_SINK,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interval between snapshots of an idle agent.
pub const STATS_INTERVAL: Duration = Duration::from_secs(3600);

/// Minimum interval between snapshots of a busy agent.
pub const BUSY_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Decides when a stats snapshot is due and builds it.
#[derive(Debug)]
pub struct StatsCollector {
    last_send: Timestamp,
    requested: Arc<AtomicBool>,
}

impl StatsCollector {
    /// Counts `created_at` as the last snapshot.
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            last_send: created_at,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set by message handlers to ask for an early snapshot.
    pub fn request_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }

    pub fn is_due(&self, now: Timestamp, busy: bool) -> bool {
        let elapsed = now.saturating_duration_since(self.last_send);
        if elapsed >= STATS_INTERVAL {
            return true;
        }
        (busy || self.requested.load(Ordering::Acquire)) && elapsed >= BUSY_STATS_INTERVAL
    }

    /// Build the snapshot parcel and restart the interval.
    pub fn snapshot(&mut self, stats: &ClientStats) -> Result<Message, AgentCommsError> {
        let payload = bincode::serialize(stats).map_err(|e| AgentCommsError::Stats(e.to_string()))?;
        self.last_send = stats.timestamp;
        self.requested.store(false, Ordering::Release);
        Ok(Message::new(
            SessionId::well_known(well_known::STATS),
            "ClientStats",
            MessageBody::Parcel(Parcel {
                sink: CLIENT_STATS_SINK.to_string(),
                payload,
            }),
        ))
    }
}
