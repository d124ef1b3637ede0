//! # Agent Communicator
//!
//! Encodes outbound batches for the one server the agent talks to and decodes
//! its responses. Owned by the transport loop; nothing here is shared.

use crate::domain::errors::AgentCommsError;
use fc_01_wire_codec::{CodecError, Envelope, InboundCipher, LocalIdentity, SessionCipher};
use shared_crypto::hashing::Hash;
use shared_crypto::{Certificate, CertificateRequest, RsaKeyPair, RsaPublicKey};
use shared_types::{
    well_known, AgentId, AuthState, EnrollmentRequest, Message, MessageBody, SessionId,
    TimeSource, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, info};

struct ServerSession {
    common_name: String,
    key: RsaPublicKey,
    outbound: SessionCipher,
    inbound: Option<(Hash, InboundCipher)>,
}

/// Agent half of the protocol.
pub struct AgentCommunicator {
    local: LocalIdentity,
    agent_id: AgentId,
    ca_certificate: Certificate,
    server: Option<ServerSession>,
    last_timestamp: Timestamp,
    time: Arc<dyn TimeSource>,
}

impl AgentCommunicator {
    /// The agent's common name is its self-certifying id.
    pub fn new(key: RsaKeyPair, ca_certificate: Certificate, time: Arc<dyn TimeSource>) -> Self {
        let agent_id = AgentId::from_public_key_der(key.public_key().to_der());
        Self {
            local: LocalIdentity::new(agent_id.as_str(), key),
            agent_id,
            ca_certificate,
            server: None,
            last_timestamp: Timestamp::default(),
            time,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn has_server_certificate(&self) -> bool {
        self.server.is_some()
    }

    /// Verify `pem` against the CA and start a new session with its key.
    ///
    /// On failure the previously loaded certificate, if any, stays in place.
    pub fn load_server_certificate(&mut self, pem: &str) -> Result<(), AgentCommsError> {
        let certificate =
            Certificate::from_pem(pem).map_err(|e| AgentCommsError::Certificate(e.to_string()))?;
        let now_secs = self.time.now().as_micros() / 1_000_000;
        certificate
            .verify_issued_by(&self.ca_certificate, now_secs)
            .map_err(|e| AgentCommsError::Certificate(e.to_string()))?;
        let key = certificate
            .public_key()
            .map_err(|e| AgentCommsError::Certificate(e.to_string()))?;

        let outbound = SessionCipher::new(&self.local, &key)?;
        info!(
            "[fc-02] Loaded server certificate for {} (serial {})",
            certificate.common_name(),
            certificate.serial()
        );
        self.server = Some(ServerSession {
            common_name: certificate.common_name().to_string(),
            key,
            outbound,
            inbound: None,
        });
        Ok(())
    }

    /// Forget the server certificate; the next exchange refetches it.
    pub fn clear_server_certificate(&mut self) {
        if self.server.take().is_some() {
            debug!("[fc-02] Dropped server certificate");
        }
    }

    /// Seal `messages` for the server. Returns the envelope bytes and the
    /// timestamp embedded in them, which the response must echo.
    pub fn encode_messages(
        &mut self,
        messages: &[Message],
    ) -> Result<(Vec<u8>, Timestamp), AgentCommsError> {
        let server = self
            .server
            .as_ref()
            .ok_or(AgentCommsError::NoServerCertificate)?;
        let now = self.time.now();
        let timestamp = if now > self.last_timestamp {
            now
        } else {
            Timestamp::from_micros(self.last_timestamp.as_micros() + 1)
        };
        let bytes = server.outbound.seal(messages, timestamp)?.to_bytes()?;
        self.last_timestamp = timestamp;
        Ok((bytes, timestamp))
    }

    /// Open a server response to the envelope sent with `expected_nonce`.
    pub fn decode_messages(
        &mut self,
        bytes: &[u8],
        expected_nonce: Timestamp,
    ) -> Result<Vec<Message>, AgentCommsError> {
        let server = self
            .server
            .as_mut()
            .ok_or(AgentCommsError::NoServerCertificate)?;
        let envelope = Envelope::from_bytes(bytes)?;

        let cipher_key = envelope.cipher_key();
        let cached = matches!(&server.inbound, Some((key, _)) if *key == cipher_key);
        if !cached {
            let inbound = InboundCipher::unwrap(&envelope, self.local.key())?;
            if inbound.source_key().fingerprint() != server.key.fingerprint() {
                return Err(CodecError::Decryption(
                    "response not signed by the loaded server key".into(),
                )
                .into());
            }
            server.inbound = Some((cipher_key, inbound));
        }
        let Some((_, inbound)) = server.inbound.as_ref() else {
            return Err(AgentCommsError::NoServerCertificate);
        };

        let (mut messages, timestamp) = inbound.open(&envelope)?;
        if timestamp != expected_nonce {
            return Err(AgentCommsError::NonceMismatch {
                expected: expected_nonce,
                received: timestamp,
            });
        }
        for message in &mut messages {
            message.stamp(&server.common_name, AuthState::Authenticated);
        }
        Ok(messages)
    }

    /// Certificate request for the enrollment handler.
    pub fn enrollment_request(&self) -> Result<Message, AgentCommsError> {
        let csr = CertificateRequest::new(self.local.key(), self.agent_id.as_str())
            .map(|request| request.to_bytes())
            .map_err(|e| AgentCommsError::Enrollment(e.to_string()))?;
        Ok(Message::new(
            SessionId::well_known(well_known::ENROLMENT),
            "Enrol",
            MessageBody::Enrollment(EnrollmentRequest { csr }),
        ))
    }
}
