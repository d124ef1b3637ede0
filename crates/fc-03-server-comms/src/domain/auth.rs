//! # Trust Decision
//!
//! Pure functions; the service feeds them store results.

use shared_crypto::{sha256, Certificate, Hash, RsaPublicKey};
use shared_types::{AgentRecord, AuthState, ClockAdvance};

/// Whether an agent record carries a certificate we accept for a given key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentCheck {
    /// CA-issued, in date, names this agent and this key.
    Valid(TrustedCertificate),
    /// Record exists but no certificate was issued yet.
    NoCertificate,
    /// Certificate present but unusable.
    Invalid(String),
}

/// Check the record's certificate against the CA and the envelope's key.
pub fn check_enrollment(
    record: &AgentRecord,
    ca_certificate: &Certificate,
    source_key: &RsaPublicKey,
    now_secs: u64,
) -> EnrollmentCheck {
    let Some(pem) = record.certificate.as_deref() else {
        return EnrollmentCheck::NoCertificate;
    };
    let certificate = match Certificate::from_pem(pem) {
        Ok(certificate) => certificate,
        Err(e) => return EnrollmentCheck::Invalid(e.to_string()),
    };
    if let Err(e) = certificate.verify_issued_by(ca_certificate, now_secs) {
        return EnrollmentCheck::Invalid(e.to_string());
    }
    if certificate.common_name() != record.agent_id.as_str() {
        return EnrollmentCheck::Invalid("certificate names another agent".into());
    }
    if certificate.public_key_der() != source_key.to_der() {
        return EnrollmentCheck::Invalid("certificate is for another key".into());
    }
    EnrollmentCheck::Valid(TrustedCertificate {
        pem_digest: sha256(pem.as_bytes()),
        key_fingerprint: source_key.fingerprint(),
        not_before: certificate.not_before(),
        not_after: certificate.not_after(),
    })
}

/// Outcome of a successful [`check_enrollment`], remembered so later
/// envelopes skip the signature check while the certificate is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificate {
    pem_digest: Hash,
    key_fingerprint: Hash,
    not_before: u64,
    not_after: u64,
}

impl TrustedCertificate {
    /// True if `record` still carries the same certificate, issued for
    /// `source_key`, and `now_secs` is inside its validity window.
    pub fn covers(&self, record: &AgentRecord, source_key: &RsaPublicKey, now_secs: u64) -> bool {
        let Some(pem) = record.certificate.as_deref() else {
            return false;
        };
        sha256(pem.as_bytes()) == self.pem_digest
            && source_key.fingerprint() == self.key_fingerprint
            && (self.not_before..=self.not_after).contains(&now_secs)
    }
}

/// Map the outcome of the atomic clock update to a trust level.
pub fn classify(advance: &ClockAdvance) -> AuthState {
    match advance {
        ClockAdvance::Advanced(_) => AuthState::Authenticated,
        ClockAdvance::Stale { .. } => AuthState::Desynchronized,
        ClockAdvance::Missing => AuthState::Unauthenticated,
    }
}
