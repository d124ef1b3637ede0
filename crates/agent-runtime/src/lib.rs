//! # Agent Runtime
//!
//! Everything the agent binary needs around the transport loop: settings,
//! the persisted key pair and a worker that answers delivered tasks.

pub mod config;
pub mod keystore;
pub mod worker;

pub use config::{AgentConfig, ConfigError};
pub use keystore::{load_ca_certificate, load_or_generate_key, KeystoreError};
pub use worker::{Action, ActionRegistry, EchoAction, TaskWorker};
