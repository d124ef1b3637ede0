//! Agent key persistence.

use shared_crypto::{Certificate, CryptoError, RsaKeyPair};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Failed to access {path}: {error}")]
    Io { path: String, error: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Read the agent key from `path`, generating and saving one if absent.
///
/// The agent id is derived from this key, so losing the file means
/// re-enrolling as a new agent.
pub fn load_or_generate_key(path: &Path, bits: usize) -> Result<RsaKeyPair, KeystoreError> {
    match fs::read_to_string(path) {
        Ok(pem) => Ok(RsaKeyPair::from_pem(&pem)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Generating agent key at {}", path.display());
            let key = RsaKeyPair::generate(bits)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            fs::write(path, key.to_pem()?).map_err(|e| io_error(path, e))?;
            Ok(key)
        }
        Err(e) => Err(io_error(path, e)),
    }
}

pub fn load_ca_certificate(path: &Path) -> Result<Certificate, KeystoreError> {
    let pem = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    Ok(Certificate::from_pem(&pem)?)
}

fn io_error(path: &Path, error: std::io::Error) -> KeystoreError {
    KeystoreError::Io {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}
