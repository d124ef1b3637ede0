//! # Certificates
//!
//! X.509 certificates binding a common name to an RSA public key.
//!
//! A [`CertificateAuthority`] signs certificates for the server and for
//! enrolled agents. Agents never hold the CA key; they only check that the
//! server certificate chains to the CA certificate they were shipped with.
//!
//! Issuance goes through `rcgen`; parsing and chain verification through
//! `x509-parser`. Everything on disk and on the wire is standard PEM
//! (`CERTIFICATE`, `CERTIFICATE REQUEST`).

use crate::rsa_keys::{RsaKeyPair, RsaPublicKey};
use crate::CryptoError;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, DnValue, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const REQUEST_TAG: &str = "CERTIFICATE REQUEST";
const ORGANIZATION: &str = "Fleet-Comms";

fn malformed(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::MalformedCertificate(e.to_string())
}

fn generation(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::CertificateGeneration(e.to_string())
}

fn decode_pem(pem_data: &str, tag: &str) -> Result<Vec<u8>, CryptoError> {
    let parsed = pem::parse(pem_data).map_err(malformed)?;
    if parsed.tag() != tag {
        return Err(malformed(format!("expected {tag}, found {}", parsed.tag())));
    }
    Ok(parsed.contents().to_vec())
}

fn encode_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, der.to_vec()))
}

fn common_name_of(name: &X509Name<'_>) -> Result<String, CryptoError> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .ok_or_else(|| malformed("no common name"))
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

fn unix_time(secs: u64) -> Result<OffsetDateTime, CryptoError> {
    let secs = i64::try_from(secs).map_err(generation)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(generation)
}

fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // Positive and with a non-zero leading byte, so the DER integer keeps all 16 bytes.
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::from_slice(&bytes)
}

/// Load an RSA key into the form `rcgen` signs with.
fn signing_key(key: &RsaKeyPair) -> Result<KeyPair, CryptoError> {
    KeyPair::from_pem(&key.to_pkcs8_pem()?)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// Subject, validity and usage shared by every leaf certificate.
fn leaf_params(
    params: &mut CertificateParams,
    common_name: &str,
    now_secs: u64,
    validity_secs: u64,
) -> Result<(), CryptoError> {
    params.distinguished_name = distinguished_name(common_name);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.subject_alt_names = Vec::new();
    params.serial_number = Some(random_serial());
    params.not_before = unix_time(now_secs)?;
    params.not_after = unix_time(now_secs.saturating_add(validity_secs))?;
    Ok(())
}

// =============================================================================
// CERTIFICATE
// =============================================================================

/// A parsed X.509 certificate with the fields the protocol reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    serial: String,
    common_name: String,
    issuer: String,
    public_key_der: Vec<u8>,
    not_before: u64,
    not_after: u64,
}

impl Certificate {
    /// Parse a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(malformed)?;
        let validity = cert.validity();
        Ok(Self {
            der: der.to_vec(),
            serial: hex::encode(cert.tbs_certificate.raw_serial()),
            common_name: common_name_of(cert.subject())?,
            issuer: common_name_of(cert.issuer())?,
            public_key_der: cert.public_key().subject_public_key.data.to_vec(),
            not_before: u64::try_from(validity.not_before.timestamp()).unwrap_or(0),
            not_after: u64::try_from(validity.not_after.timestamp()).unwrap_or(0),
        })
    }

    /// Parse a `CERTIFICATE` PEM block.
    pub fn from_pem(pem_data: &str) -> Result<Self, CryptoError> {
        Self::from_der(&decode_pem(pem_data, CERTIFICATE_TAG)?)
    }

    /// DER encoding.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// `CERTIFICATE` PEM block.
    pub fn to_pem(&self) -> String {
        encode_pem(CERTIFICATE_TAG, &self.der)
    }

    /// Serial number, hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Subject common name.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Issuer common name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject public key, PKCS#1 DER.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Start of validity, seconds since the Unix epoch.
    pub fn not_before(&self) -> u64 {
        self.not_before
    }

    /// End of validity, seconds since the Unix epoch.
    pub fn not_after(&self) -> u64 {
        self.not_after
    }

    /// Subject public key.
    pub fn public_key(&self) -> Result<RsaPublicKey, CryptoError> {
        RsaPublicKey::from_der(&self.public_key_der)
    }

    /// Check that `issuer_cert` signed this certificate and that `now_secs`
    /// lies inside the validity window.
    pub fn verify_issued_by(
        &self,
        issuer_cert: &Certificate,
        now_secs: u64,
    ) -> Result<(), CryptoError> {
        let untrusted = || CryptoError::UntrustedCertificate {
            common_name: self.common_name.clone(),
            issuer: issuer_cert.common_name.clone(),
        };
        if self.issuer != issuer_cert.common_name {
            return Err(untrusted());
        }
        let (_, cert) = X509Certificate::from_der(&self.der).map_err(malformed)?;
        let (_, issuer) = X509Certificate::from_der(&issuer_cert.der).map_err(malformed)?;
        cert.verify_signature(Some(issuer.public_key()))
            .map_err(|_| untrusted())?;
        if now_secs < self.not_before || now_secs > self.not_after {
            return Err(CryptoError::CertificateExpired(self.common_name.clone()));
        }
        Ok(())
    }
}

// =============================================================================
// CERTIFICATE REQUEST
// =============================================================================

/// PKCS#10 signing request. Parsing checks the self-signature, so a value of
/// this type always proves possession of its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    der: Vec<u8>,
    common_name: String,
    public_key_der: Vec<u8>,
}

impl CertificateRequest {
    /// Build a request for `common_name` signed with `key`.
    pub fn new(key: &RsaKeyPair, common_name: &str) -> Result<Self, CryptoError> {
        let key_pair = signing_key(key)?;
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        let csr = params.serialize_request(&key_pair).map_err(generation)?;
        Self::from_der(csr.der().as_ref())
    }

    /// Parse a DER request and check its self-signature.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (_, csr) = X509CertificationRequest::from_der(der).map_err(malformed)?;
        csr.verify_signature()
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        let info = &csr.certification_request_info;
        Ok(Self {
            der: der.to_vec(),
            common_name: common_name_of(&info.subject)?,
            public_key_der: info.subject_pki.subject_public_key.data.to_vec(),
        })
    }

    /// Requested subject name.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Key the request was signed with.
    pub fn public_key(&self) -> Result<RsaPublicKey, CryptoError> {
        RsaPublicKey::from_der(&self.public_key_der)
    }

    /// `CERTIFICATE REQUEST` PEM block.
    pub fn to_pem(&self) -> String {
        encode_pem(REQUEST_TAG, &self.der)
    }

    /// Serialize for transport (PEM text).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_pem().into_bytes()
    }

    /// Parse the output of [`CertificateRequest::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let pem_data = std::str::from_utf8(bytes).map_err(malformed)?;
        Self::from_der(&decode_pem(pem_data, REQUEST_TAG)?)
    }
}

// =============================================================================
// AUTHORITY
// =============================================================================

/// Holder of the CA key.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    key: RsaKeyPair,
    certificate: Certificate,
}

impl CertificateAuthority {
    /// Create a CA with a self-signed root certificate.
    pub fn new_self_signed(
        key: RsaKeyPair,
        common_name: &str,
        now_secs: u64,
        validity_secs: u64,
    ) -> Result<Self, CryptoError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(random_serial());
        params.not_before = unix_time(now_secs)?;
        params.not_after = unix_time(now_secs.saturating_add(validity_secs))?;

        let cert = params
            .self_signed(&signing_key(&key)?)
            .map_err(generation)?;
        let certificate = Certificate::from_der(cert.der().as_ref())?;
        Ok(Self { key, certificate })
    }

    /// Reassemble a CA from a persisted key and root certificate.
    pub fn from_parts(key: RsaKeyPair, certificate: Certificate) -> Result<Self, CryptoError> {
        if key.public_key().to_der() != certificate.public_key_der() {
            return Err(CryptoError::InvalidPrivateKey(
                "CA key does not match CA certificate".into(),
            ));
        }
        Ok(Self { key, certificate })
    }

    /// Root certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Signing key, for persisting the authority.
    pub fn key(&self) -> &RsaKeyPair {
        &self.key
    }

    /// Sign a certificate for a key pair this process holds (the server's own key).
    pub fn issue_for_key_pair(
        &self,
        subject: &RsaKeyPair,
        common_name: &str,
        now_secs: u64,
        validity_secs: u64,
    ) -> Result<Certificate, CryptoError> {
        let mut params = CertificateParams::default();
        leaf_params(&mut params, common_name, now_secs, validity_secs)?;

        let subject_key = signing_key(subject)?;
        let ca_key = signing_key(&self.key)?;
        let issuer = Issuer::from_ca_cert_pem(&self.certificate.to_pem(), &ca_key)
            .map_err(generation)?;
        let cert = params.signed_by(&subject_key, &issuer).map_err(generation)?;
        Certificate::from_der(cert.der().as_ref())
    }

    /// Sign the key in `request` under its requested common name.
    pub fn issue(
        &self,
        request: &CertificateRequest,
        now_secs: u64,
        validity_secs: u64,
    ) -> Result<Certificate, CryptoError> {
        let mut csr_params =
            CertificateSigningRequestParams::from_pem(&request.to_pem()).map_err(malformed)?;
        leaf_params(
            &mut csr_params.params,
            request.common_name(),
            now_secs,
            validity_secs,
        )?;

        let ca_key = signing_key(&self.key)?;
        let issuer = Issuer::from_ca_cert_pem(&self.certificate.to_pem(), &ca_key)
            .map_err(generation)?;
        let cert = csr_params.signed_by(&issuer).map_err(generation)?;
        Certificate::from_der(cert.der().as_ref())
    }

    /// Check a certificate against this authority.
    pub fn verify(&self, certificate: &Certificate, now_secs: u64) -> Result<(), CryptoError> {
        certificate.verify_issued_by(&self.certificate, now_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::pair;

    const NOW: u64 = 1_700_000_000;
    const YEAR: u64 = 365 * 24 * 3600;

    fn ca() -> CertificateAuthority {
        CertificateAuthority::new_self_signed(pair(0), "fleet-ca", NOW, 10 * YEAR).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let ca = ca();
        let request = CertificateRequest::new(&pair(1), "C.0011223344556677").unwrap();
        let cert = ca.issue(&request, NOW, YEAR).unwrap();

        assert_eq!(cert.common_name(), "C.0011223344556677");
        assert_eq!(cert.issuer(), "fleet-ca");
        assert_eq!(cert.public_key().unwrap(), *pair(1).public_key());
        assert_eq!(cert.not_after(), NOW + YEAR);
        assert!(ca.verify(&cert, NOW + 10).is_ok());
    }

    #[test]
    fn test_issue_for_key_pair() {
        let ca = ca();
        let cert = ca.issue_for_key_pair(&pair(1), "fleet-frontend", NOW, YEAR).unwrap();
        assert_eq!(cert.common_name(), "fleet-frontend");
        assert_eq!(cert.public_key_der(), pair(1).public_key().to_der());
        assert!(cert.verify_issued_by(ca.certificate(), NOW).is_ok());
    }

    #[test]
    fn test_serials_are_unique() {
        let ca = ca();
        let a = ca.issue_for_key_pair(&pair(1), "server", NOW, YEAR).unwrap();
        let b = ca.issue_for_key_pair(&pair(1), "server", NOW, YEAR).unwrap();
        assert_ne!(a.serial(), b.serial());
    }

    #[test]
    fn test_foreign_authority_rejected() {
        let other =
            CertificateAuthority::new_self_signed(pair(2), "fleet-ca", NOW, YEAR).unwrap();
        let cert = other
            .issue_for_key_pair(&pair(1), "server", NOW, YEAR)
            .unwrap();

        assert!(matches!(
            ca().verify(&cert, NOW),
            Err(CryptoError::UntrustedCertificate { .. })
        ));
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let ca = ca();
        let cert = ca.issue_for_key_pair(&pair(1), "server", NOW, 60).unwrap();
        assert!(matches!(
            ca.verify(&cert, NOW + 61),
            Err(CryptoError::CertificateExpired(_))
        ));
        assert!(matches!(
            ca.verify(&cert, NOW - 1),
            Err(CryptoError::CertificateExpired(_))
        ));
    }

    #[test]
    fn test_tampered_der_breaks_signature() {
        let ca = ca();
        let cert = ca.issue_for_key_pair(&pair(1), "server", NOW, YEAR).unwrap();
        let mut der = cert.to_der().to_vec();
        let last = der.len() - 1;
        der[last] ^= 0x01;

        let tampered = Certificate::from_der(&der).unwrap();
        assert!(ca.verify(&tampered, NOW).is_err());
    }

    #[test]
    fn test_request_with_broken_signature_rejected() {
        let request = CertificateRequest::new(&pair(1), "C.0011223344556677").unwrap();
        let mut der = pem::parse(request.to_pem()).unwrap().contents().to_vec();
        let last = der.len() - 1;
        der[last] ^= 0x01;

        assert!(CertificateRequest::from_der(&der).is_err());
    }

    #[test]
    fn test_request_transport_reload() {
        let request = CertificateRequest::new(&pair(1), "C.0011223344556677").unwrap();
        let bytes = request.to_bytes();

        assert!(bytes.starts_with(b"-----BEGIN CERTIFICATE REQUEST-----"));
        let reloaded = CertificateRequest::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded, request);
        assert_eq!(reloaded.public_key().unwrap(), *pair(1).public_key());
        assert!(CertificateRequest::from_bytes(b"garbage").is_err());
    }

    #[test]
    fn test_standard_pem_armor() {
        let cert = ca().certificate().clone();
        let pem_data = cert.to_pem();

        assert!(pem_data.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(Certificate::from_pem(&pem_data).unwrap(), cert);
        assert!(Certificate::from_pem("garbage").is_err());

        let request = CertificateRequest::new(&pair(1), "C.0011223344556677").unwrap();
        assert!(Certificate::from_pem(&request.to_pem()).is_err());
    }

    #[test]
    fn test_parses_certificate_from_other_tooling() {
        // Issued directly with rcgen, outside this module's helpers.
        let key = KeyPair::from_pem(&pair(2).to_pkcs8_pem().unwrap()).unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name("fleet-frontend");
        let pem_data = params.self_signed(&key).unwrap().pem();

        let cert = Certificate::from_pem(&pem_data).unwrap();
        assert_eq!(cert.common_name(), "fleet-frontend");
        assert_eq!(cert.issuer(), "fleet-frontend");
        assert_eq!(cert.public_key().unwrap(), *pair(2).public_key());
    }

    #[test]
    fn test_from_parts_checks_key() {
        let ca = ca();
        assert!(CertificateAuthority::from_parts(pair(1), ca.certificate().clone()).is_err());
        assert!(CertificateAuthority::from_parts(pair(0), ca.certificate().clone()).is_ok());
    }
}
