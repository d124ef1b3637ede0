//! # RSA Keys
//!
//! Long-term identity keys for agents and the server.
//!
//! - Session keys are wrapped with RSA-OAEP (SHA-256).
//! - Signatures use RSA PKCS#1 v1.5 with SHA-256.
//! - Keys persist as PKCS#1 PEM; public keys travel as PKCS#1 DER.

use crate::hashing::{sha256, Hash};
use crate::CryptoError;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use std::fmt;

/// Modulus size for newly generated production keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

// =============================================================================
// PUBLIC KEY
// =============================================================================

/// RSA public key with its cached DER encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    inner: rsa::RsaPublicKey,
    der: Vec<u8>,
}

impl RsaPublicKey {
    fn from_inner(inner: rsa::RsaPublicKey) -> Result<Self, CryptoError> {
        let der = inner
            .to_pkcs1_der()
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?
            .as_bytes()
            .to_vec();
        Ok(Self { inner, der })
    }

    /// Parse a PKCS#1 DER public key.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner = rsa::RsaPublicKey::from_pkcs1_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            inner,
            der: der.to_vec(),
        })
    }

    /// PKCS#1 DER encoding.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> Hash {
        sha256(&self.der)
    }

    /// Wrap `data` with RSA-OAEP-SHA256.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    /// Verify a PKCS#1 v1.5 SHA-256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature =
            Signature::try_from(signature).map_err(|_| CryptoError::SignatureVerificationFailed)?;
        VerifyingKey::<Sha256>::new(self.inner.clone())
            .verify(message, &signature)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl fmt::Debug for RsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fp = self.fingerprint();
        write!(f, "RsaPublicKey(")?;
        for byte in &fp[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

// =============================================================================
// KEY PAIR
// =============================================================================

/// RSA private key together with its public half.
#[derive(Clone)]
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh key pair with a `bits`-bit modulus.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from_inner(private.to_public_key())?;
        Ok(Self { private, public })
    }

    /// Load from a PKCS#1 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_private(private)
    }

    /// Encode the private key as PKCS#1 PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let pem = self
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    /// PKCS#8 PEM, the form certificate tooling loads.
    pub(crate) fn to_pkcs8_pem(&self) -> Result<String, CryptoError> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    /// Public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Unwrap data produced by [`RsaPublicKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// PKCS#1 v1.5 SHA-256 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        SigningKey::<Sha256>::new(self.private.clone())
            .try_sign(message)
            .map(|signature| signature.to_vec())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
