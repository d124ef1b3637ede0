//! Unknown agent → 406 → enrollment → 200.

use crate::harness::Fleet;
use fc_02_agent_comms::{EnrollmentState, ExchangeOutcome, TransportConfig};
use fc_03_server_comms::AgentMetadataStore;
use fc_04_dispatch::HandlerQueue;
use shared_crypto::Certificate;
use shared_types::well_known;
use std::time::Duration;

#[tokio::test]
async fn test_enrollment_scenario() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());

    agent.enroll(&fleet).await;

    let record = fleet.app.metadata().read_agent(&agent.id).unwrap().unwrap();
    let certificate = Certificate::from_pem(record.certificate.as_deref().unwrap()).unwrap();
    assert_eq!(certificate.common_name(), agent.id.as_str());
    assert!(record.clock.is_some());
    assert!(fleet
        .app
        .stores()
        .handlers
        .read_handler_requests(well_known::ENROLMENT)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_single_enrollment_request_while_waiting() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());

    for _ in 0..4 {
        assert_eq!(agent.exchange().await, ExchangeOutcome::Success);
    }

    let queued = fleet
        .app
        .stores()
        .handlers
        .read_handler_requests(well_known::ENROLMENT)
        .unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].agent_id, agent.id);
    assert_eq!(
        agent.transport_loop.enrollment().state(),
        EnrollmentState::RequestSent
    );
}

#[tokio::test]
async fn test_enrollment_retried_after_interval() {
    let fleet = Fleet::new();
    let config = TransportConfig {
        enrollment_retry_interval: Duration::from_secs(60),
        ..TransportConfig::default()
    };
    let mut agent = fleet.agent(2, config);
    agent.exchange().await;
    agent.exchange().await;

    fleet.time.advance(Duration::from_secs(61));
    agent.exchange().await;

    let queued = fleet
        .app
        .stores()
        .handlers
        .read_handler_requests(well_known::ENROLMENT)
        .unwrap();
    assert_eq!(queued.len(), 2);

    let summary = fleet.app.enrollment().process_pending().unwrap();
    assert_eq!((summary.issued, summary.skipped), (1, 1));
}

#[tokio::test]
async fn test_forged_enrollment_for_other_key_rejected() {
    let fleet = Fleet::new();
    let mut honest = fleet.agent(2, TransportConfig::default());
    let mut forger = fleet.agent(3, TransportConfig::default());
    honest.exchange().await;
    forger.exchange().await;

    // The forger sends a request carrying the honest agent's CSR.
    let request = honest
        .transport_loop
        .communicator()
        .enrollment_request()
        .unwrap();
    forger.handle.send(request).unwrap();
    forger.exchange().await;

    let summary = fleet.app.enrollment().process_pending().unwrap();
    assert_eq!((summary.issued, summary.rejected), (1, 1));
    assert!(fleet.app.metadata().read_agent(&honest.id).unwrap().is_none());
    assert!(fleet.app.metadata().read_agent(&forger.id).unwrap().is_some());
}
