//! Server key rotation while agents are connected.

use crate::harness::Fleet;
use fc_02_agent_comms::{ExchangeOutcome, TransportConfig};
use fc_04_dispatch::HandlerQueue;
use shared_types::{well_known, Message, MessageBody, SessionId};

#[tokio::test]
async fn test_agent_recovers_after_rotation() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    let old_pem = fleet.app.frontend().comms().certificate_pem();

    fleet.app.rotate_server_key().unwrap();
    assert_ne!(fleet.app.frontend().comms().certificate_pem(), old_pem);

    // Still sealed for the old key: the frontend cannot open it.
    assert_eq!(agent.exchange().await, ExchangeOutcome::Retryable);
    assert!(!agent.transport_loop.communicator().has_server_certificate());

    // Refetches the certificate and carries on.
    assert_eq!(agent.exchange().await, ExchangeOutcome::Success);
    assert_eq!(agent.transport_loop.connection_errors(), 0);
}

#[tokio::test]
async fn test_queued_messages_survive_rotation() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;

    fleet.app.rotate_server_key().unwrap();
    let ping = Message::new(
        SessionId::well_known(well_known::FOREMAN),
        "Ping",
        MessageBody::Data(Vec::new()),
    );
    agent.handle.send(ping).unwrap();

    assert_eq!(agent.exchange().await, ExchangeOutcome::Retryable);
    assert_eq!(agent.transport_loop.out_queue().len(), 1);
    assert_eq!(agent.exchange().await, ExchangeOutcome::Success);
    assert!(agent.transport_loop.out_queue().is_empty());
    let queued = fleet
        .app
        .stores()
        .handlers
        .read_handler_requests(well_known::FOREMAN)
        .unwrap();
    assert_eq!(queued.len(), 1);
}
