//! Replayed envelopes are answered but never trusted.

use crate::harness::{Fleet, NOW_SECS};
use fc_02_agent_comms::TransportConfig;
use fc_03_server_comms::AgentMetadataStore;
use fc_04_dispatch::{FlowRequest, FlowStore, Task, TaskStore};
use frontend_runtime::ControlResponse;
use shared_types::{FlowId, FlowStatus, Message, MessageBody, SessionId, Timestamp};
use std::time::Duration;

#[tokio::test]
async fn test_replayed_envelope_is_desynchronized() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    agent.exchange().await;
    agent.exchange().await;
    let posted = agent.transport.posted();
    let clock_before = fleet
        .app
        .metadata()
        .read_agent(&agent.id)
        .unwrap()
        .unwrap()
        .clock;

    fleet
        .app
        .stores()
        .tasks
        .write_pending_tasks(
            &agent.id,
            vec![Task {
                task_id: 3,
                agent_id: agent.id.clone(),
                flow_id: FlowId("F:1".into()),
                action: "Echo".into(),
                args: Vec::new(),
                require_fastpoll: false,
                created_at: Timestamp::from_secs(NOW_SECS),
            }],
        )
        .unwrap();

    // An authenticated envelope from earlier in the session.
    let stale = &posted[posted.len() - 2];
    let response = fleet.app.frontend().handle_control(stale);

    assert_eq!(response.status, ControlResponse::OK);
    let clock_after = fleet
        .app
        .metadata()
        .read_agent(&agent.id)
        .unwrap()
        .unwrap()
        .clock;
    assert_eq!(clock_before, clock_after);

    // The task is still there for the real agent.
    agent.exchange().await;
    assert_eq!(agent.received().len(), 1);
}

#[tokio::test]
async fn test_status_behind_the_clock_is_not_stored() {
    let fleet = Fleet::new();
    let mut agent = fleet.agent(2, TransportConfig::default());
    agent.enroll(&fleet).await;
    let flow = FlowId("F:2".into());
    let stores = fleet.app.stores();
    stores
        .flows
        .write_flow_requests(vec![FlowRequest {
            agent_id: agent.id.clone(),
            flow_id: flow.clone(),
            request_id: 1,
            action: "Echo".into(),
            created_at: Timestamp::from_secs(NOW_SECS),
        }])
        .unwrap();
    let status = Message::new(
        SessionId::Flow(flow.clone()),
        "Echo",
        MessageBody::Status(FlowStatus::ok()),
    )
    .with_ids(1, 1);

    // Same key, fresh clock: its timestamps trail what the server has seen.
    let mut clone = fleet.communicator(2);
    let (behind, _) = clone.encode_messages(&[status.clone()]).unwrap();
    assert_eq!(fleet.app.frontend().handle_control(&behind).status, 200);
    let stored = stores
        .flows
        .read_all_flow_requests_and_responses(&agent.id, &flow)
        .unwrap();
    assert!(stored[0].1.is_empty());

    fleet.time.advance(Duration::from_secs(1));
    let (ahead, _) = clone.encode_messages(&[status]).unwrap();
    assert_eq!(fleet.app.frontend().handle_control(&ahead).status, 200);
    let stored = stores
        .flows
        .read_all_flow_requests_and_responses(&agent.id, &flow)
        .unwrap();
    assert_eq!(stored[0].1.len(), 1);
}
