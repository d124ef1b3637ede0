//! # Frontend Runtime
//!
//! Wires the server communicator, the dispatch router and the enrollment
//! worker behind an axum HTTP server.
//!
//! ## Routes
//!
//! | Route | Response |
//! |-------|----------|
//! | `POST /control` | 200 + envelope, 406 unknown agent, 500 undecodable |
//! | `GET /server.pem` | Current server certificate |
//! | `GET /metrics` | Prometheus text format |

pub mod app;
pub mod config;
pub mod enrollment;
pub mod frontend;
pub mod http;
pub mod keys;
pub mod sinks;

pub use app::{AppError, FrontendApp};
pub use config::{ConfigError, FrontendConfig};
pub use enrollment::{EnrollmentSummary, EnrollmentWorker};
pub use frontend::{ControlResponse, FrontendServer};
pub use keys::{KeyError, KeyMaterial};
pub use sinks::ClientStatsSink;
