//! # Frontend Configuration
//!
//! Loaded from an optional TOML file, then overridden by `FC_*` environment
//! variables.
//!
//! ```toml
//! bind_address = "0.0.0.0:8080"
//! common_name = "fleet-frontend"
//! key_dir = "/var/lib/fleet/keys"
//! key_bits = 2048
//! certificate_validity_days = 365
//! cipher_cache_size = 10000
//! message_expiry_secs = 600
//! max_body_bytes = 16777216
//! enrollment_interval_ms = 500
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// File is not valid TOML for this schema.
    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// Environment override could not be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Frontend server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrontendConfig {
    pub bind_address: String,
    /// Common name on the server certificate.
    pub common_name: String,
    /// Holds `ca.key`, `ca.pem`, `server.key`, `server.pem`.
    pub key_dir: PathBuf,
    /// RSA modulus size for generated keys.
    pub key_bits: usize,
    pub certificate_validity_days: u64,
    pub cipher_cache_size: usize,
    /// Pending tasks older than this are not delivered.
    pub message_expiry_secs: u64,
    pub max_body_bytes: usize,
    /// How often the enrollment queue is drained.
    pub enrollment_interval_ms: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            common_name: "fleet-frontend".to_string(),
            key_dir: PathBuf::from("./keys"),
            key_bits: shared_crypto::DEFAULT_KEY_BITS,
            certificate_validity_days: 365,
            cipher_cache_size: 10_000,
            message_expiry_secs: 600,
            max_body_bytes: 16 * 1024 * 1024,
            enrollment_interval_ms: 500,
        }
    }
}

impl FrontendConfig {
    /// Read `path` if given, then apply environment overrides.
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

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `FC_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("FC_BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let Some(value) = lookup("FC_COMMON_NAME") {
            self.common_name = value;
        }
        if let Some(value) = lookup("FC_KEY_DIR") {
            self.key_dir = PathBuf::from(value);
        }
        override_parsed(&lookup, "FC_KEY_BITS", &mut self.key_bits)?;
        override_parsed(&lookup, "FC_CIPHER_CACHE_SIZE", &mut self.cipher_cache_size)?;
        override_parsed(&lookup, "FC_MESSAGE_EXPIRY_SECS", &mut self.message_expiry_secs)?;
        override_parsed(&lookup, "FC_MAX_BODY_BYTES", &mut self.max_body_bytes)?;
        Ok(())
    }

    pub fn message_expiry(&self) -> Duration {
        Duration::from_secs(self.message_expiry_secs)
    }

    pub fn certificate_validity_secs(&self) -> u64 {
        self.certificate_validity_days * 24 * 3600
    }

    pub fn enrollment_interval(&self) -> Duration {
        Duration::from_millis(self.enrollment_interval_ms)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FrontendConfig::default();
        assert_eq!(config.cipher_cache_size, 10_000);
        assert_eq!(config.message_expiry(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = FrontendConfig::parse(
            r#"
            bind_address = "127.0.0.1:9000"
            message_expiry_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.message_expiry_secs, 60);
        assert_eq!(config.common_name, "fleet-frontend");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            FrontendConfig::parse("poll_min = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FC_BIND_ADDRESS", "0.0.0.0:443"),
            ("FC_CIPHER_CACHE_SIZE", "42"),
        ]);
        let mut config = FrontendConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:443");
        assert_eq!(config.cipher_cache_size, 42);
    }

    #[test]
    fn test_bad_override_reported() {
        let mut config = FrontendConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "FC_MESSAGE_EXPIRY_SECS").then(|| "soon".to_string())
        });
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                key: "FC_MESSAGE_EXPIRY_SECS".into(),
                value: "soon".into()
            })
        );
    }
}
