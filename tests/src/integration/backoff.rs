//! Unreachable frontend: exponential backoff, then give up.

use crate::harness::Fleet;
use fc_02_agent_comms::{AgentCommsError, ExchangeOutcome, LoopState, TransportConfig};
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test(start_paused = true)]
async fn test_loop_gives_up_after_limit() {
    let fleet = Fleet::new();
    let config = TransportConfig {
        connection_error_limit: 3,
        ..TransportConfig::default()
    };
    let agent = fleet.agent(2, config);
    agent.transport.set_reachable(false);
    let transport = agent.transport.clone();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = agent.transport_loop.run(shutdown_rx).await;

    assert_eq!(result, Err(AgentCommsError::ConnectionLimit(4)));
    assert_eq!(transport.attempts(), 4);
}

#[tokio::test]
async fn test_backoff_grows_and_resets() {
    let fleet = Fleet::new();
    let config = TransportConfig {
        poll_min: Duration::from_secs(1),
        poll_max: Duration::from_secs(4),
        ..TransportConfig::default()
    };
    let mut agent = fleet.agent(2, config);
    agent.enroll(&fleet).await;
    agent.transport.set_reachable(false);

    let mut sleeps = Vec::new();
    for _ in 0..4 {
        assert_eq!(agent.exchange().await, ExchangeOutcome::Retryable);
        assert_eq!(agent.transport_loop.state(), LoopState::BackingOff);
        sleeps.push(agent.transport_loop.poll_timer().next_sleep());
    }
    assert_eq!(
        sleeps,
        [1, 2, 4, 4].map(Duration::from_secs).to_vec()
    );

    agent.transport.set_reachable(true);
    assert_eq!(agent.exchange().await, ExchangeOutcome::Success);
    assert_eq!(agent.transport_loop.connection_errors(), 0);
    assert_eq!(agent.transport_loop.state(), LoopState::Idle);
}
