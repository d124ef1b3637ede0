//! HTTP surface of the frontend.

use crate::frontend::{ControlResponse, FrontendServer};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use fc_03_server_comms::AgentMetadataStore;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const CONTROL_PATH: &str = "/control";
pub const SERVER_PEM_PATH: &str = "/server.pem";
pub const METRICS_PATH: &str = "/metrics";

/// Build the router. Bodies over `max_body_bytes` get 413.
pub fn router<S: AgentMetadataStore + 'static>(
    frontend: Arc<FrontendServer<S>>,
    max_body_bytes: usize,
) -> Router {
    Router::new()
        .route(CONTROL_PATH, post(control::<S>))
        .route(SERVER_PEM_PATH, get(server_pem::<S>))
        .route(METRICS_PATH, get(metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(frontend)
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            self.body,
        )
            .into_response()
    }
}

async fn control<S: AgentMetadataStore + 'static>(
    State(frontend): State<Arc<FrontendServer<S>>>,
    body: Bytes,
) -> Response {
    // RSA and the stores block; keep them off the async workers.
    match tokio::task::spawn_blocking(move || frontend.handle_control(&body)).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!("Control handler panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn server_pem<S: AgentMetadataStore + 'static>(
    State(frontend): State<Arc<FrontendServer<S>>>,
) -> Response {
    (
        [(header::CONTENT_TYPE, "application/x-pem-file")],
        frontend.comms().certificate_pem(),
    )
        .into_response()
}

async fn metrics() -> Response {
    match fleet_telemetry::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
