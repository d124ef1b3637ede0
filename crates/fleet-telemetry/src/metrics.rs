//! Prometheus metrics for Fleet-Comms.
//!
//! All metrics follow the naming convention: `fc_<area>_<metric>_total`

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SERVER COMMUNICATOR
    // =========================================================================

    /// Authenticated contacts per agent label
    pub static ref CLIENT_PINGS_BY_LABEL: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_client_pings_by_label_total", "Authenticated agent contacts per label"),
        &["label"]
    ).expect("metric creation failed");

    /// Envelopes decoded, by assigned trust level
    pub static ref ENVELOPES_DECODED: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_envelopes_decoded_total", "Envelopes decoded by auth state"),
        &["auth_state"]
    ).expect("metric creation failed");

    /// Envelopes rejected, by error kind
    pub static ref ENVELOPE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_envelope_errors_total", "Envelopes rejected by error kind"),
        &["kind"]
    ).expect("metric creation failed");

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Messages routed, by body kind
    pub static ref MESSAGES_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_messages_dispatched_total", "Messages routed by kind"),
        &["kind"]
    ).expect("metric creation failed");

    /// Messages dropped without routing, by reason
    pub static ref MESSAGES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_messages_dropped_total", "Messages dropped by reason"),
        &["reason"]
    ).expect("metric creation failed");

    /// Sink failures, by sink id
    pub static ref SINK_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_sink_failures_total", "Parcel sink failures by sink"),
        &["sink"]
    ).expect("metric creation failed");

    // =========================================================================
    // FRONTEND / AGENT
    // =========================================================================

    /// Control requests answered, by HTTP status
    pub static ref FRONTEND_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("fc_frontend_requests_total", "Control requests by response status"),
        &["status"]
    ).expect("metric creation failed");

    /// Failed agent exchanges
    pub static ref AGENT_CONNECTION_ERRORS: IntCounter = IntCounter::new(
        "fc_agent_connection_errors_total",
        "Failed agent-to-server exchanges"
    ).expect("metric creation failed");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CLIENT_PINGS_BY_LABEL.clone()),
        Box::new(ENVELOPES_DECODED.clone()),
        Box::new(ENVELOPE_ERRORS.clone()),
        Box::new(MESSAGES_DISPATCHED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(SINK_FAILURES.clone()),
        Box::new(FRONTEND_REQUESTS.clone()),
        Box::new(AGENT_CONNECTION_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Render [`REGISTRY`] in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsEncode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsEncode(e.to_string()))
}
