//! # Agent Configuration
//!
//! ```toml
//! server_url = "http://frontend:8080"
//! poll_min_ms = 200
//! poll_max_secs = 600
//! connection_error_limit = 50
//! key_path = "/var/lib/fleet/agent.key"
//! ca_cert_path = "/etc/fleet/ca.pem"
//! ```
//!
//! Every key may be overridden by an `FC_AGENT_*` environment variable.

use fc_02_agent_comms::TransportConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Base URL of the frontend.
    pub server_url: String,
    pub poll_min_ms: u64,
    pub poll_max_secs: u64,
    /// Consecutive failed exchanges before the agent exits.
    pub connection_error_limit: u32,
    pub enrollment_retry_secs: u64,
    pub request_timeout_secs: u64,
    /// PEM private key; generated on first start.
    pub key_path: PathBuf,
    pub key_bits: usize,
    /// PEM certificate of the fleet CA.
    pub ca_cert_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            poll_min_ms: 200,
            poll_max_secs: 600,
            connection_error_limit: 50,
            enrollment_retry_secs: 600,
            request_timeout_secs: 30,
            key_path: PathBuf::from("./agent.key"),
            key_bits: shared_crypto::DEFAULT_KEY_BITS,
            ca_cert_path: PathBuf::from("./ca.pem"),
        }
    }
}

impl AgentConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })?;
                Self::parse(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("FC_AGENT_SERVER_URL") {
            self.server_url = value;
        }
        if let Some(value) = lookup("FC_AGENT_KEY_PATH") {
            self.key_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("FC_AGENT_CA_CERT_PATH") {
            self.ca_cert_path = PathBuf::from(value);
        }
        override_parsed(&lookup, "FC_AGENT_POLL_MIN_MS", &mut self.poll_min_ms)?;
        override_parsed(&lookup, "FC_AGENT_POLL_MAX_SECS", &mut self.poll_max_secs)?;
        override_parsed(
            &lookup,
            "FC_AGENT_CONNECTION_ERROR_LIMIT",
            &mut self.connection_error_limit,
        )?;
        override_parsed(&lookup, "FC_AGENT_KEY_BITS", &mut self.key_bits)?;
        Ok(())
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            poll_min: Duration::from_millis(self.poll_min_ms),
            poll_max: Duration::from_secs(self.poll_max_secs),
            connection_error_limit: self.connection_error_limit,
            enrollment_retry_interval: Duration::from_secs(self.enrollment_retry_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *target = value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}
