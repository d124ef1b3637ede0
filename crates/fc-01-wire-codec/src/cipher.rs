//! # Session Ciphers
//!
//! [`SessionCipher`] seals outbound envelopes to one peer.
//! [`InboundCipher`] is what a recipient recovers from an envelope header and
//! then uses to open every envelope of that session.

use crate::envelope::{CipherMetadata, Envelope, PackedMessageList, API_VERSION};
use crate::CodecError;
use shared_crypto::hashing::Hash;
use shared_crypto::mac::{hmac_sha256, verify_hmac_sha256};
use shared_crypto::symmetric::{self, Nonce, SecretKey};
use shared_crypto::{RsaKeyPair, RsaPublicKey};
use shared_types::{Message, Timestamp};
use tracing::debug;

const HMAC_CONTEXT: &str = "fleet-comms 2024-06 envelope hmac";
const METADATA_CONTEXT: &str = "fleet-comms 2024-06 cipher metadata";

/// Our own name and key, used to sign the session header.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    common_name: String,
    key: RsaKeyPair,
}

impl LocalIdentity {
    pub fn new(common_name: impl Into<String>, key: RsaKeyPair) -> Self {
        Self {
            common_name: common_name.into(),
            key,
        }
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn key(&self) -> &RsaKeyPair {
        &self.key
    }
}

/// Session key plus the two keys derived from it.
struct SessionKeys {
    session: SecretKey,
    hmac: SecretKey,
    metadata: SecretKey,
}

impl SessionKeys {
    fn new(session: SecretKey) -> Self {
        Self {
            hmac: session.derive(HMAC_CONTEXT),
            metadata: session.derive(METADATA_CONTEXT),
            session,
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Outbound session to one peer.
pub struct SessionCipher {
    keys: SessionKeys,
    encrypted_cipher: Vec<u8>,
    encrypted_cipher_metadata: Vec<u8>,
    peer_fingerprint: Hash,
}

impl SessionCipher {
    /// Generate a session key, wrap it for `peer_key` and sign the header.
    pub fn new(local: &LocalIdentity, peer_key: &RsaPublicKey) -> Result<Self, CodecError> {
        let keys = SessionKeys::new(SecretKey::generate());
        let encrypted_cipher = peer_key
            .encrypt(keys.session.as_bytes())
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        let signature = local
            .key
            .sign(&encrypted_cipher)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        let metadata = CipherMetadata {
            source: local.common_name.clone(),
            source_public_key: local.key.public_key().to_der().to_vec(),
            key_digest: local.key.public_key().fingerprint(),
            signature,
        };
        let plain_metadata =
            bincode::serialize(&metadata).map_err(|e| CodecError::Encoding(e.to_string()))?;
        let encrypted_cipher_metadata = symmetric::seal(&keys.metadata, &plain_metadata)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;

        Ok(Self {
            keys,
            encrypted_cipher,
            encrypted_cipher_metadata,
            peer_fingerprint: peer_key.fingerprint(),
        })
    }

    /// Fingerprint of the key this session was wrapped for.
    pub fn peer_fingerprint(&self) -> &Hash {
        &self.peer_fingerprint
    }

    /// Seal a batch under a fresh IV.
    pub fn seal(&self, messages: &[Message], timestamp: Timestamp) -> Result<Envelope, CodecError> {
        let packed = PackedMessageList::pack(messages, timestamp)?;
        let plaintext =
            bincode::serialize(&packed).map_err(|e| CodecError::Encoding(e.to_string()))?;
        let (encrypted, iv) = symmetric::encrypt(&self.keys.session, &plaintext)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;

        let mut envelope = Envelope {
            api_version: API_VERSION,
            encrypted_cipher: self.encrypted_cipher.clone(),
            encrypted_cipher_metadata: self.encrypted_cipher_metadata.clone(),
            packet_iv: *iv.as_bytes(),
            encrypted,
            hmac: [0u8; 32],
        };
        envelope.hmac = hmac_sha256(self.keys.hmac.as_bytes(), &[&envelope.authenticated_bytes()])
            .map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(envelope)
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Inbound session recovered from an envelope header.
pub struct InboundCipher {
    keys: SessionKeys,
    metadata: CipherMetadata,
    source_key: RsaPublicKey,
}

impl InboundCipher {
    /// Unwrap the session key with `local_key` and verify the sender's
    /// signature over it.
    pub fn unwrap(envelope: &Envelope, local_key: &RsaKeyPair) -> Result<Self, CodecError> {
        let raw = local_key
            .decrypt(&envelope.encrypted_cipher)
            .map_err(|e| CodecError::Decryption(format!("RSA unwrap failed: {e}")))?;
        let session: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CodecError::Decryption(format!("session key is {} bytes", raw.len())))?;
        let keys = SessionKeys::new(SecretKey::from_bytes(session));

        let plain_metadata = symmetric::open(&keys.metadata, &envelope.encrypted_cipher_metadata)
            .map_err(|e| CodecError::Decryption(format!("cipher metadata: {e}")))?;
        let metadata: CipherMetadata = bincode::deserialize(&plain_metadata)
            .map_err(|e| CodecError::Decryption(format!("cipher metadata: {e}")))?;

        let source_key = RsaPublicKey::from_der(&metadata.source_public_key)
            .map_err(|e| CodecError::Decryption(format!("source key: {e}")))?;
        if source_key.fingerprint() != metadata.key_digest {
            return Err(CodecError::Decryption(
                "source key does not match its digest".into(),
            ));
        }
        source_key
            .verify(&envelope.encrypted_cipher, &metadata.signature)
            .map_err(|_| CodecError::Decryption("cipher signature invalid".into()))?;

        debug!(
            "[fc-01] Unwrapped session key from {} (api version {})",
            metadata.source, envelope.api_version
        );
        Ok(Self {
            keys,
            metadata,
            source_key,
        })
    }

    /// Sender common name as claimed in the signed header.
    pub fn source_name(&self) -> &str {
        &self.metadata.source
    }

    /// Sender public key.
    pub fn source_key(&self) -> &RsaPublicKey {
        &self.source_key
    }

    /// Verify the HMAC, then decrypt and unpack the batch.
    pub fn open(&self, envelope: &Envelope) -> Result<(Vec<Message>, Timestamp), CodecError> {
        verify_hmac_sha256(
            self.keys.hmac.as_bytes(),
            &[&envelope.authenticated_bytes()],
            &envelope.hmac,
        )
        .map_err(|_| CodecError::Integrity)?;

        let plaintext = symmetric::decrypt(
            &self.keys.session,
            &envelope.encrypted,
            &Nonce::from_bytes(envelope.packet_iv),
        )
        .map_err(|e| CodecError::Decoding(e.to_string()))?;
        let packed: PackedMessageList =
            bincode::deserialize(&plaintext).map_err(|e| CodecError::Decoding(e.to_string()))?;
        Ok((packed.unpack()?, packed.timestamp))
    }
}

#[cfg(test)]
mod tests;
