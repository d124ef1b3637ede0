//! # Key Material
//!
//! The CA and the server identity live as PEM files in one directory. Missing
//! files are generated on first start; a server certificate that no longer
//! verifies against the CA is reissued.

use shared_crypto::{Certificate, CertificateAuthority, CryptoError, RsaKeyPair};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const CA_KEY: &str = "ca.key";
const CA_CERT: &str = "ca.pem";
const SERVER_KEY: &str = "server.key";
const SERVER_CERT: &str = "server.pem";

/// Years the generated CA stays valid.
const CA_VALIDITY_SECS: u64 = 10 * 365 * 24 * 3600;

/// Key loading errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to access {path}: {error}")]
    Io { path: String, error: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// CA and server identity.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub ca: CertificateAuthority,
    pub server_key: RsaKeyPair,
    pub server_certificate: Certificate,
}

impl KeyMaterial {
    /// Load key material from `dir`, generating what is missing.
    pub fn load_or_generate(
        dir: &Path,
        common_name: &str,
        key_bits: usize,
        now_secs: u64,
        validity_secs: u64,
    ) -> Result<Self, KeyError> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

        let ca = match (read_optional(&dir.join(CA_KEY))?, read_optional(&dir.join(CA_CERT))?) {
            (Some(key), Some(cert)) => CertificateAuthority::from_parts(
                RsaKeyPair::from_pem(&key)?,
                Certificate::from_pem(&cert)?,
            )?,
            _ => {
                info!("Generating fleet CA in {}", dir.display());
                let ca = CertificateAuthority::new_self_signed(
                    RsaKeyPair::generate(key_bits)?,
                    "fleet-ca",
                    now_secs,
                    CA_VALIDITY_SECS,
                )?;
                write(&dir.join(CA_KEY), &ca.key().to_pem()?)?;
                write(&dir.join(CA_CERT), &ca.certificate().to_pem())?;
                ca
            }
        };

        let existing = match (
            read_optional(&dir.join(SERVER_KEY))?,
            read_optional(&dir.join(SERVER_CERT))?,
        ) {
            (Some(key), Some(cert)) => {
                let key = RsaKeyPair::from_pem(&key)?;
                let certificate = Certificate::from_pem(&cert)?;
                match ca.verify(&certificate, now_secs) {
                    Ok(()) if certificate.public_key_der() == key.public_key().to_der() => {
                        Some((key, certificate))
                    }
                    Ok(()) => {
                        warn!("Server certificate does not match server key, reissuing");
                        None
                    }
                    Err(e) => {
                        warn!("Server certificate unusable ({}), reissuing", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let (server_key, server_certificate) = match existing {
            Some(pair) => pair,
            None => {
                let key = RsaKeyPair::generate(key_bits)?;
                let certificate =
                    ca.issue_for_key_pair(&key, common_name, now_secs, validity_secs)?;
                write(&dir.join(SERVER_KEY), &key.to_pem()?)?;
                write(&dir.join(SERVER_CERT), &certificate.to_pem())?;
                (key, certificate)
            }
        };

        Ok(Self {
            ca,
            server_key,
            server_certificate,
        })
    }

    /// Issue a fresh server key and certificate and persist them.
    pub fn rotate_server_key(
        &mut self,
        dir: &Path,
        key_bits: usize,
        now_secs: u64,
        validity_secs: u64,
    ) -> Result<(), KeyError> {
        let key = RsaKeyPair::generate(key_bits)?;
        let certificate = self.ca.issue_for_key_pair(
            &key,
            self.server_certificate.common_name(),
            now_secs,
            validity_secs,
        )?;
        write(&dir.join(SERVER_KEY), &key.to_pem()?)?;
        write(&dir.join(SERVER_CERT), &certificate.to_pem())?;
        info!("Rotated server key, certificate serial {}", certificate.serial());
        self.server_key = key;
        self.server_certificate = certificate;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, KeyError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

fn write(path: &Path, content: &str) -> Result<(), KeyError> {
    fs::write(path, content).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, error: std::io::Error) -> KeyError {
    KeyError::Io {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}
