//! # Enrollment Worker
//!
//! Drains the `Enrol` handler queue. For each request it checks the
//! certificate request against the key the envelope was signed with, issues
//! a certificate and stores it on the agent record. After that the agent's
//! envelopes authenticate.

use fc_03_server_comms::AgentMetadataStore;
use fc_04_dispatch::{HandlerQueue, HandlerRequest};
use shared_crypto::{Certificate, CertificateAuthority, CertificateRequest};
use shared_types::{well_known, AgentId, MessageBody, StoreError, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What one pass over the queue did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentSummary {
    pub issued: usize,
    pub rejected: usize,
    /// Agent already held a valid certificate.
    pub skipped: usize,
}

enum Outcome {
    Issued,
    Rejected(String),
    Skipped,
}

/// Issues certificates for queued enrollment requests.
pub struct EnrollmentWorker<S: AgentMetadataStore> {
    ca: CertificateAuthority,
    store: Arc<S>,
    queue: Arc<dyn HandlerQueue>,
    time: Arc<dyn TimeSource>,
    validity_secs: u64,
}

impl<S: AgentMetadataStore> EnrollmentWorker<S> {
    pub fn new(
        ca: CertificateAuthority,
        store: Arc<S>,
        queue: Arc<dyn HandlerQueue>,
        time: Arc<dyn TimeSource>,
        validity_secs: u64,
    ) -> Self {
        Self {
            ca,
            store,
            queue,
            time,
            validity_secs,
        }
    }

    /// Handle every queued request once. Processed requests are deleted,
    /// rejected ones included.
    pub fn process_pending(&self) -> Result<EnrollmentSummary, StoreError> {
        let requests = self.queue.read_handler_requests(well_known::ENROLMENT)?;
        let mut summary = EnrollmentSummary::default();
        let mut done = Vec::with_capacity(requests.len());

        for request in &requests {
            match self.enroll(request)? {
                Outcome::Issued => summary.issued += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Rejected(reason) => {
                    warn!("Rejected enrollment from {}: {}", request.agent_id, reason);
                    summary.rejected += 1;
                }
            }
            done.push(request.request_id);
        }

        if !done.is_empty() {
            self.queue.delete_handler_requests(&done)?;
        }
        Ok(summary)
    }

    fn enroll(&self, request: &HandlerRequest) -> Result<Outcome, StoreError> {
        let MessageBody::Enrollment(enrollment) = &request.message.body else {
            return Ok(Outcome::Rejected(format!(
                "expected an enrollment body, got {}",
                request.message.kind()
            )));
        };
        let csr = match CertificateRequest::from_bytes(&enrollment.csr) {
            Ok(csr) => csr,
            Err(e) => return Ok(Outcome::Rejected(e.to_string())),
        };
        let key = match csr.public_key() {
            Ok(key) => key,
            Err(e) => return Ok(Outcome::Rejected(e.to_string())),
        };

        let requested = AgentId::from_public_key_der(key.to_der());
        if requested != request.agent_id || csr.common_name() != requested.as_str() {
            return Ok(Outcome::Rejected(format!(
                "request for {} arrived from {}",
                csr.common_name(),
                request.agent_id
            )));
        }

        let now = self.time.now();
        let now_secs = now.as_micros() / 1_000_000;
        let existing = self
            .store
            .read_agent(&requested)?
            .and_then(|record| record.certificate);
        if let Some(pem) = existing {
            let still_valid = Certificate::from_pem(&pem)
                .map(|cert| {
                    cert.public_key_der() == key.to_der() && self.ca.verify(&cert, now_secs).is_ok()
                })
                .unwrap_or(false);
            if still_valid {
                debug!("{} is already enrolled", requested);
                return Ok(Outcome::Skipped);
            }
        }

        let certificate = match self.ca.issue(&csr, now_secs, self.validity_secs) {
            Ok(cert) => cert,
            Err(e) => return Ok(Outcome::Rejected(e.to_string())),
        };

        self.store
            .set_certificate(&requested, certificate.to_pem(), now)?;
        info!("Enrolled agent {}", requested);
        Ok(Outcome::Issued)
    }

    /// Drain the queue every `interval` until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.process_pending() {
                        Ok(summary) if summary != EnrollmentSummary::default() => {
                            debug!("Enrollment pass: {:?}", summary);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Enrollment pass failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Enrollment worker stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::pair;
    use fc_03_server_comms::InMemoryAgentMetadataStore;
    use fc_04_dispatch::InMemoryHandlerQueue;
    use shared_crypto::RsaKeyPair;
    use shared_types::{
        AgentRecord, AuthState, EnrollmentRequest, ManualTimeSource, Message, SessionId,
        Timestamp,
    };
    use uuid::Uuid;

    const NOW_SECS: u64 = 1_700_000_000;
    const YEAR: u64 = 365 * 24 * 3600;

    struct Fixture {
        worker: EnrollmentWorker<InMemoryAgentMetadataStore>,
        store: Arc<InMemoryAgentMetadataStore>,
        queue: Arc<InMemoryHandlerQueue>,
    }

    fn fixture() -> Fixture {
        let ca = CertificateAuthority::new_self_signed(pair(0), "fleet-ca", NOW_SECS - 10, YEAR)
            .unwrap();
        let store = Arc::new(InMemoryAgentMetadataStore::new());
        let queue = Arc::new(InMemoryHandlerQueue::new());
        let time = Arc::new(ManualTimeSource::new(Timestamp::from_secs(NOW_SECS)));
        let worker = EnrollmentWorker::new(ca, store.clone(), queue.clone(), time, YEAR);
        Fixture {
            worker,
            store,
            queue,
        }
    }

    fn enqueue(queue: &InMemoryHandlerQueue, n: u8, sender: &RsaKeyPair, csr_key: &RsaKeyPair) {
        let agent_id = AgentId::from_public_key_der(sender.public_key().to_der());
        let csr_name = AgentId::from_public_key_der(csr_key.public_key().to_der());
        let csr = CertificateRequest::new(csr_key, csr_name.as_str())
            .unwrap()
            .to_bytes();
        queue
            .write_handler_request(HandlerRequest {
                request_id: Uuid::from_bytes([n; 16]),
                handler_name: well_known::ENROLMENT.into(),
                agent_id,
                auth_state: AuthState::Unauthenticated,
                message: Message::new(
                    SessionId::well_known(well_known::ENROLMENT),
                    "Enrol",
                    MessageBody::Enrollment(EnrollmentRequest { csr }),
                ),
                received_at: Timestamp::from_secs(NOW_SECS),
            })
            .unwrap();
    }

    #[test]
    fn test_issues_certificate_and_clears_queue() {
        let f = fixture();
        enqueue(&f.queue, 1, &pair(2), &pair(2));

        let summary = f.worker.process_pending().unwrap();
        assert_eq!(summary.issued, 1);
        assert!(f.queue.is_empty());

        let agent = AgentId::from_public_key_der(pair(2).public_key().to_der());
        let record = f.store.read_agent(&agent).unwrap().unwrap();
        let cert = Certificate::from_pem(record.certificate.as_deref().unwrap()).unwrap();
        assert_eq!(cert.common_name(), agent.as_str());
        assert_eq!(cert.public_key_der(), pair(2).public_key().to_der());
        assert_eq!(record.clock, None);
    }

    #[test]
    fn test_rejects_request_for_someone_elses_key() {
        let f = fixture();
        enqueue(&f.queue, 1, &pair(2), &pair(3));

        let summary = f.worker.process_pending().unwrap();
        assert_eq!(summary.rejected, 1);
        assert!(f.queue.is_empty());
        let other = AgentId::from_public_key_der(pair(3).public_key().to_der());
        assert!(f.store.read_agent(&other).unwrap().is_none());
    }

    #[test]
    fn test_enrollment_keeps_existing_labels() {
        let f = fixture();
        let agent = AgentId::from_public_key_der(pair(2).public_key().to_der());
        f.store
            .write_agent(AgentRecord::new(agent.clone(), Timestamp::from_secs(1)))
            .unwrap();
        f.store.add_labels(&agent, &["linux".into()]).unwrap();
        enqueue(&f.queue, 1, &pair(2), &pair(2));

        assert_eq!(f.worker.process_pending().unwrap().issued, 1);

        let record = f.store.read_agent(&agent).unwrap().unwrap();
        assert!(record.certificate.is_some());
        assert_eq!(record.labels, vec!["linux".to_string()]);
        assert_eq!(record.first_seen, Timestamp::from_secs(1));
    }

    #[test]
    fn test_duplicate_requests_issue_once() {
        let f = fixture();
        enqueue(&f.queue, 1, &pair(2), &pair(2));
        enqueue(&f.queue, 2, &pair(2), &pair(2));

        let summary = f.worker.process_pending().unwrap();
        assert_eq!(
            summary,
            EnrollmentSummary {
                issued: 1,
                rejected: 0,
                skipped: 1
            }
        );
    }
}
