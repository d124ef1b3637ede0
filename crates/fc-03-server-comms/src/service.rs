//! # Server Communicator Service
//!
//! One instance per server process, shared through `Arc` by every request
//! handler. Holds:
//!
//! 1. The server identity (key + certificate), swappable by key rotation
//! 2. An inbound cipher cache keyed by envelope header digest
//! 3. An outbound cipher cache keyed by agent
//! 4. A cache of agent certificates that already passed verification
//! 5. The agent metadata store used for the trust decision

use crate::domain::auth::{check_enrollment, classify, EnrollmentCheck, TrustedCertificate};
use crate::domain::errors::ServerCommsError;
use crate::ports::outbound::AgentMetadataStore;
use fc_01_wire_codec::{
    CipherCache, CodecError, Envelope, InboundCipher, LocalIdentity, SessionCipher,
};
use fleet_telemetry::metrics::{CLIENT_PINGS_BY_LABEL, ENVELOPES_DECODED, ENVELOPE_ERRORS};
use parking_lot::RwLock;
use shared_crypto::hashing::Hash;
use shared_crypto::{Certificate, RsaKeyPair, RsaPublicKey};
use shared_types::{AgentId, AuthState, ClockAdvance, Message, TimeSource, Timestamp};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables.
#[derive(Debug, Clone)]
pub struct ServerCommsConfig {
    /// Capacity of each cipher cache.
    pub cipher_cache_size: usize,
}

impl Default for ServerCommsConfig {
    fn default() -> Self {
        Self {
            cipher_cache_size: 10_000,
        }
    }
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBatch {
    /// Messages, stamped with `source` and `auth_state`.
    pub messages: Vec<Message>,
    /// Sender, derived from its public key.
    pub source: AgentId,
    /// Sender clock embedded in the envelope.
    pub timestamp: Timestamp,
    /// Trust level shared by every message.
    pub auth_state: AuthState,
}

struct ServerIdentity {
    local: LocalIdentity,
    certificate_pem: String,
}

/// Server half of the protocol.
pub struct ServerCommunicator<S: AgentMetadataStore> {
    identity: RwLock<ServerIdentity>,
    ca_certificate: Certificate,
    inbound: CipherCache<Hash, InboundCipher>,
    outbound: CipherCache<AgentId, SessionCipher>,
    trusted: CipherCache<AgentId, TrustedCertificate>,
    store: Arc<S>,
    time: Arc<dyn TimeSource>,
}

impl<S: AgentMetadataStore> ServerCommunicator<S> {
    /// Build a communicator after checking `certificate` against the CA and `key`.
    pub fn new(
        key: RsaKeyPair,
        certificate: Certificate,
        ca_certificate: Certificate,
        store: Arc<S>,
        time: Arc<dyn TimeSource>,
        config: ServerCommsConfig,
    ) -> Result<Self, ServerCommsError> {
        let identity = Self::make_identity(key, &certificate, &ca_certificate, time.as_ref())?;
        info!(
            "[fc-03] Server communicator ready as {}",
            identity.local.common_name()
        );
        Ok(Self {
            identity: RwLock::new(identity),
            ca_certificate,
            inbound: CipherCache::new(config.cipher_cache_size),
            outbound: CipherCache::new(config.cipher_cache_size),
            trusted: CipherCache::new(config.cipher_cache_size),
            store,
            time,
        })
    }

    fn make_identity(
        key: RsaKeyPair,
        certificate: &Certificate,
        ca_certificate: &Certificate,
        time: &dyn TimeSource,
    ) -> Result<ServerIdentity, ServerCommsError> {
        certificate
            .verify_issued_by(ca_certificate, time.now().as_micros() / 1_000_000)
            .map_err(|e| ServerCommsError::Certificate(e.to_string()))?;
        if certificate.public_key_der() != key.public_key().to_der() {
            return Err(ServerCommsError::Certificate(
                "server key does not match certificate".into(),
            ));
        }
        Ok(ServerIdentity {
            local: LocalIdentity::new(certificate.common_name().to_string(), key),
            certificate_pem: certificate.to_pem(),
        })
    }

    /// PEM of the current server certificate, served to agents.
    pub fn certificate_pem(&self) -> String {
        self.identity.read().certificate_pem.clone()
    }

    /// Common name of the server.
    pub fn common_name(&self) -> String {
        self.identity.read().local.common_name().to_string()
    }

    /// The metadata store backing the trust decision.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Replace the server key and certificate.
    ///
    /// Every cached cipher was built against the old key and is dropped;
    /// envelopes still wrapped for the old key fail with a decryption error.
    pub fn rotate_keys(
        &self,
        key: RsaKeyPair,
        certificate: Certificate,
    ) -> Result<(), ServerCommsError> {
        let identity =
            Self::make_identity(key, &certificate, &self.ca_certificate, self.time.as_ref())?;
        let mut current = self.identity.write();
        *current = identity;
        self.inbound.clear();
        self.outbound.clear();
        self.trusted.clear();
        info!(
            "[fc-03] Server key rotated, certificate serial {}",
            certificate.serial()
        );
        Ok(())
    }

    // =========================================================================
    // DECODE
    // =========================================================================

    /// Decode an inbound envelope and assign its trust level.
    pub fn decrypt_message(&self, bytes: &[u8]) -> Result<DecodedBatch, ServerCommsError> {
        let result = self.decode(bytes);
        match &result {
            Ok(batch) => {
                ENVELOPES_DECODED
                    .with_label_values(&[batch.auth_state.as_str()])
                    .inc();
            }
            Err(e) => {
                ENVELOPE_ERRORS.with_label_values(&[e.kind()]).inc();
                warn!("[fc-03] Rejected envelope: {}", e);
            }
        }
        result
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedBatch, ServerCommsError> {
        let envelope = Envelope::from_bytes(bytes)?;
        let inbound = {
            let identity = self.identity.read();
            self.inbound
                .get_or_try_insert_with(envelope.cipher_key(), || {
                    InboundCipher::unwrap(&envelope, identity.local.key())
                })?
        };

        let source = AgentId::from_public_key_der(inbound.source_key().to_der());
        if inbound.source_name() != source.as_str() {
            return Err(CodecError::Decryption(format!(
                "sender claims {} but its key belongs to {}",
                inbound.source_name(),
                source
            ))
            .into());
        }

        let (mut messages, timestamp) = inbound.open(&envelope)?;
        let auth_state = self.authenticate(&source, inbound.source_key(), timestamp)?;
        for message in &mut messages {
            message.stamp(source.as_str(), auth_state);
        }

        debug!(
            "[fc-03] Decoded {} messages from {} ({})",
            messages.len(),
            source,
            auth_state
        );
        Ok(DecodedBatch {
            messages,
            source,
            timestamp,
            auth_state,
        })
    }

    fn authenticate(
        &self,
        agent_id: &AgentId,
        source_key: &RsaPublicKey,
        timestamp: Timestamp,
    ) -> Result<AuthState, ServerCommsError> {
        let Some(record) = self.store.read_agent(agent_id)? else {
            debug!("[fc-03] No record for {}", agent_id);
            return Ok(AuthState::Unauthenticated);
        };

        let now = self.time.now();
        let now_secs = now.as_micros() / 1_000_000;
        let cached = self
            .trusted
            .get(agent_id)
            .is_some_and(|trusted| trusted.covers(&record, source_key, now_secs));
        if !cached {
            self.trusted.remove(agent_id);
            match check_enrollment(&record, &self.ca_certificate, source_key, now_secs) {
                EnrollmentCheck::Valid(trusted) => {
                    self.trusted.insert(agent_id.clone(), trusted);
                }
                EnrollmentCheck::NoCertificate => {
                    debug!("[fc-03] {} has not completed enrollment", agent_id);
                    return Ok(AuthState::Unauthenticated);
                }
                EnrollmentCheck::Invalid(reason) => {
                    warn!("[fc-03] Unusable certificate for {}: {}", agent_id, reason);
                    return Ok(AuthState::Unauthenticated);
                }
            }
        }

        let advance = self.store.advance_clock(agent_id, timestamp, now)?;
        match &advance {
            ClockAdvance::Advanced(updated) => {
                for label in &updated.labels {
                    CLIENT_PINGS_BY_LABEL.with_label_values(&[label]).inc();
                }
            }
            ClockAdvance::Stale { stored } => {
                warn!(
                    "[fc-03] Desynchronized message from {}: timestamp {} older than clock {}",
                    agent_id, timestamp, stored
                );
            }
            ClockAdvance::Missing => {}
        }
        Ok(classify(&advance))
    }

    // =========================================================================
    // ENCODE
    // =========================================================================

    /// Seal a response batch for `destination`, echoing `nonce` as the
    /// envelope timestamp.
    pub fn encode_messages(
        &self,
        destination: &AgentId,
        messages: &[Message],
        nonce: Timestamp,
    ) -> Result<Vec<u8>, ServerCommsError> {
        let peer_key = self.enrolled_key(destination)?;
        let identity = self.identity.read();

        let cipher = match self.outbound.get(destination) {
            Some(cipher) if cipher.peer_fingerprint() == &peer_key.fingerprint() => cipher,
            _ => self.outbound.insert(
                destination.clone(),
                SessionCipher::new(&identity.local, &peer_key)?,
            ),
        };
        Ok(cipher.seal(messages, nonce)?.to_bytes()?)
    }

    /// Number of agents whose certificate is currently cached as verified.
    pub fn trusted_certificates(&self) -> usize {
        self.trusted.len()
    }

    fn enrolled_key(&self, agent_id: &AgentId) -> Result<RsaPublicKey, ServerCommsError> {
        let pem = self
            .store
            .read_agent(agent_id)?
            .and_then(|record| record.certificate)
            .ok_or_else(|| ServerCommsError::UnknownPeer(agent_id.clone()))?;
        Certificate::from_pem(&pem)
            .and_then(|certificate| certificate.public_key())
            .map_err(|_| ServerCommsError::UnknownPeer(agent_id.clone()))
    }
}
