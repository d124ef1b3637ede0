//! Tasks out, responses back, and what happens when an exchange is lost.

use crate::harness::{Fleet, NOW_SECS};
use agent_runtime::{ActionRegistry, TaskWorker};
use fc_02_agent_comms::{ExchangeOutcome, TransportConfig};
use fc_04_dispatch::{
    BlobId, BlobStore, CrashStore, FlowRequest, FlowStore, ResponsePayload, Task, TaskStore,
};
use shared_crypto::compression;
use shared_types::{
    well_known, Compression, DataBlob, FlowId, FlowStatus, Message, MessageBody, SessionId,
    StatusCode, Timestamp,
};
use std::time::Duration;

const FLOW: &str = "F:ABCD";

fn schedule(fleet: &Fleet, agent: &shared_types::AgentId, task_id: u64, action: &str) {
    let created_at = Timestamp::from_secs(NOW_SECS);
    let stores = fleet.app.stores();
    stores
        .flows
        .write_flow_requests(vec![FlowRequest {
            agent_id: agent.clone(),
            flow_id: FlowId(FLOW.into()),
            request_id: task_id,
            action: action.into(),
            created_at,
        }])
        .unwrap();
    stores
        .tasks
        .write_pending_tasks(
            agent,
            vec![Task {
                task_id,
                agent_id: agent.clone(),
                flow_id: FlowId(FLOW.into()),
                action: action.into(),
                args: b"hello".to_vec(),
                require_fastpoll: true,
                created_at,
            }],
        )
        .unwrap();
}

#[tokio::test]
async fn test_task_round_trip() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    schedule(&fleet, &agent.id, 11, "Echo");

    agent.exchange().await;
    let delivered = agent.received();
    assert_eq!(delivered.len(), 1);
    assert!(agent.transport_loop.poll_timer().is_fastpoll());

    let worker = TaskWorker::new(ActionRegistry::with_defaults());
    for reply in worker.replies_for(&delivered[0]) {
        agent.handle.send(reply).unwrap();
    }
    agent.exchange().await;

    let stores = fleet.app.stores();
    let flows = stores
        .flows
        .read_all_flow_requests_and_responses(&agent.id, &FlowId(FLOW.into()))
        .unwrap();
    let responses = &flows[0].1;
    assert_eq!(responses[&1].payload, ResponsePayload::Data(b"hello".to_vec()));
    assert!(matches!(
        &responses[&2].payload,
        ResponsePayload::Status(s) if s.code == StatusCode::Ok
    ));
    assert!(stores.tasks.read_pending_tasks(&agent.id).unwrap().is_empty());

    agent.exchange().await;
    assert!(agent.received().is_empty());
}

#[tokio::test]
async fn test_task_redelivered_until_status_arrives() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    schedule(&fleet, &agent.id, 12, "Echo");

    agent.exchange().await;
    agent.exchange().await;
    let delivered = agent.received();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].task_id, delivered[1].task_id);
}

#[tokio::test]
async fn test_expired_task_not_delivered() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    schedule(&fleet, &agent.id, 13, "Echo");

    fleet.time.advance(Duration::from_secs(601));
    agent.exchange().await;
    assert!(agent.received().is_empty());
    assert_eq!(
        fleet.app.stores().tasks.read_pending_tasks(&agent.id).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_lost_exchange_is_retransmitted() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    schedule(&fleet, &agent.id, 14, "Echo");

    let data = Message::new(
        SessionId::Flow(FlowId(FLOW.into())),
        "Echo",
        MessageBody::Data(b"partial".to_vec()),
    )
    .with_ids(14, 1);
    agent.handle.send(data).unwrap();
    agent.transport.drop_next(1);

    assert_eq!(agent.exchange().await, ExchangeOutcome::Retryable);
    assert_eq!(agent.transport_loop.out_queue().len(), 1);

    assert_eq!(agent.exchange().await, ExchangeOutcome::Success);
    assert!(agent.transport_loop.out_queue().is_empty());
    let flows = fleet
        .app
        .stores()
        .flows
        .read_all_flow_requests_and_responses(&agent.id, &FlowId(FLOW.into()))
        .unwrap();
    assert_eq!(
        flows[0].1[&1].payload,
        ResponsePayload::Data(b"partial".to_vec())
    );
}

#[tokio::test]
async fn test_blob_stored_once() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;

    let content = vec![42u8; 4096];
    let blob = |data: Vec<u8>, compression| {
        Message::new(
            SessionId::well_known(well_known::TRANSFER_STORE),
            "TransferBuffer",
            MessageBody::Blob(DataBlob { data, compression }),
        )
    };
    agent
        .handle
        .send(blob(content.clone(), Compression::Uncompressed))
        .unwrap();
    agent
        .handle
        .send(blob(
            compression::compress(&content).unwrap(),
            Compression::Zlib,
        ))
        .unwrap();
    assert_eq!(agent.exchange().await, ExchangeOutcome::Success);

    let id = BlobId::of(&content);
    let blobs = &fleet.app.stores().blobs;
    assert!(blobs.check_blob_exists(&id).unwrap());
    assert_eq!(blobs.read_blob(&id).unwrap(), Some(content));
}

#[tokio::test]
async fn test_client_killed_recorded() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    schedule(&fleet, &agent.id, 15, "Echo");

    let status = FlowStatus {
        code: StatusCode::ClientKilled,
        error_message: Some("killed by watchdog".into()),
        ..FlowStatus::ok()
    };
    let message = Message::new(
        SessionId::Flow(FlowId(FLOW.into())),
        "Echo",
        MessageBody::Status(status),
    )
    .with_ids(15, 1)
    .with_task_id(15);
    agent.handle.send(message).unwrap();
    agent.exchange().await;

    let crashes = fleet.app.stores().crashes.read_crash_info(&agent.id).unwrap();
    assert_eq!(crashes.len(), 1);
    assert_eq!(
        crashes[0].crash_message.as_deref(),
        Some("killed by watchdog")
    );
    assert!(fleet
        .app
        .stores()
        .tasks
        .read_pending_tasks(&agent.id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_stats_reach_frontend_after_handled_message() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    assert!(fleet.app.stats().latest(&agent.id).is_none());

    agent.handle.message_handled();
    fleet.time.advance(Duration::from_secs(61));
    agent.exchange().await;

    assert!(fleet.app.stats().latest(&agent.id).is_some());
}
