//! # fc-02 Agent Communicator
//!
//! Agent half of the secure messaging protocol.
//!
//! ## Architecture
//!
//! - **Domain:** poll timing, stats cadence, loop and enrollment states
//! - **Ports:** the HTTP transport the loop talks through
//! - **Service:** [`AgentCommunicator`] (envelopes for one server) and
//!   [`TransportLoop`] (one exchange per iteration)
//! - **Adapters:** a `reqwest` transport
//!
//! ## Exchange Outcomes
//!
//! | Response | Out-queue | Errors | Next |
//! |----------|-----------|--------|------|
//! | 200 + valid envelope | cleared | reset | sleep per fastpoll flag |
//! | 406 | cleared | reset | enroll on the next poll |
//! | 500, bad envelope | kept | +1 | refetch server certificate, back off |
//! | network failure | kept | +1 | back off |
//!
//! Once consecutive errors exceed `connection_error_limit` the loop stops
//! with [`AgentCommsError::ConnectionLimit`].

pub mod adapters;
pub mod communicator;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::http::ReqwestTransport;
pub use communicator::AgentCommunicator;
pub use domain::errors::{AgentCommsError, TransportError};
pub use domain::poll::PollTimer;
pub use domain::state::{EnrollmentState, EnrollmentTracker, ExchangeOutcome, LoopState};
pub use domain::stats::{StatsCollector, BUSY_STATS_INTERVAL, STATS_INTERVAL};
pub use ports::outbound::{HttpResponse, HttpTransport};
pub use service::{AgentHandle, TransportConfig, TransportLoop};
