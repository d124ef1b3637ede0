//! # Transport Loop
//!
//! Single-writer polling loop. Each iteration:
//!
//! 1. Fetch the server certificate if none is loaded
//! 2. Drain replies from [`AgentHandle`]s into the out-queue
//! 3. Queue an enrollment request and a stats snapshot when due
//! 4. Encode the whole out-queue, POST it, and handle the status
//!
//! The out-queue is only cleared by a response from the server, so a failed
//! exchange re-sends the same messages next time.

use crate::communicator::AgentCommunicator;
use crate::domain::errors::{AgentCommsError, TransportError};
use crate::domain::poll::PollTimer;
use crate::domain::state::{EnrollmentTracker, ExchangeOutcome, LoopState};
use crate::domain::stats::StatsCollector;
use crate::ports::outbound::HttpTransport;
use fleet_telemetry::metrics::AGENT_CONNECTION_ERRORS;
use shared_types::{ClientStats, Message, TimeSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Loop tunables.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub poll_min: Duration,
    pub poll_max: Duration,
    /// Consecutive failures tolerated before the loop gives up.
    pub connection_error_limit: u32,
    /// Minimum spacing between enrollment requests.
    pub enrollment_retry_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_min: Duration::from_millis(200),
            poll_max: Duration::from_secs(600),
            connection_error_limit: 50,
            enrollment_retry_interval: Duration::from_secs(600),
        }
    }
}

/// Cloneable handle for code that produces replies to the server.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    outbox: mpsc::UnboundedSender<Message>,
    stats_requested: Arc<AtomicBool>,
}

impl AgentHandle {
    /// Queue a message for the next exchange.
    pub fn send(&self, message: Message) -> Result<(), AgentCommsError> {
        self.outbox
            .send(message)
            .map_err(|_| AgentCommsError::Shutdown)
    }

    /// Note that a server message was handled; the next stats snapshot may
    /// go out as soon as a minute has passed.
    pub fn message_handled(&self) {
        self.stats_requested.store(true, Ordering::Release);
    }
}

/// Agent polling loop.
pub struct TransportLoop<T: HttpTransport> {
    comms: AgentCommunicator,
    transport: T,
    config: TransportConfig,
    time: Arc<dyn TimeSource>,
    state: LoopState,
    poll: PollTimer,
    enrollment: EnrollmentTracker,
    stats: StatsCollector,
    out_queue: Vec<Message>,
    outbox: mpsc::UnboundedReceiver<Message>,
    inbox: mpsc::UnboundedSender<Message>,
    busy: bool,
    connection_errors: u32,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<T: HttpTransport> TransportLoop<T> {
    /// Build the loop. Server messages are delivered on the returned
    /// receiver; replies go back through the returned handle.
    pub fn new(
        comms: AgentCommunicator,
        transport: T,
        config: TransportConfig,
        time: Arc<dyn TimeSource>,
    ) -> (Self, AgentHandle, mpsc::UnboundedReceiver<Message>) {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let stats = StatsCollector::new(time.now());
        let handle = AgentHandle {
            outbox: outbox_tx,
            stats_requested: stats.request_flag(),
        };
        let transport_loop = Self {
            comms,
            transport,
            poll: PollTimer::new(config.poll_min, config.poll_max),
            enrollment: EnrollmentTracker::new(config.enrollment_retry_interval),
            config,
            time,
            state: LoopState::Idle,
            stats,
            out_queue: Vec::new(),
            outbox: outbox_rx,
            inbox: inbox_tx,
            busy: false,
            connection_errors: 0,
            bytes_sent: 0,
            bytes_received: 0,
        };
        (transport_loop, handle, inbox_rx)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn connection_errors(&self) -> u32 {
        self.connection_errors
    }

    pub fn out_queue(&self) -> &[Message] {
        &self.out_queue
    }

    pub fn enrollment(&self) -> &EnrollmentTracker {
        &self.enrollment
    }

    pub fn poll_timer(&self) -> &PollTimer {
        &self.poll
    }

    pub fn communicator(&self) -> &AgentCommunicator {
        &self.comms
    }

    /// Poll until shutdown is signalled or the error limit is exceeded.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), AgentCommsError> {
        info!("[fc-02] Transport loop started for {}", self.comms.agent_id());
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.run_once().await == ExchangeOutcome::Fatal {
                error!(
                    "[fc-02] Giving up after {} consecutive connection errors",
                    self.connection_errors
                );
                return Err(AgentCommsError::ConnectionLimit(self.connection_errors));
            }
            let sleep = self.poll.next_sleep();
            debug!("[fc-02] Sleeping {:?}", sleep);
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("[fc-02] Transport loop stopped");
        Ok(())
    }

    /// One exchange with the server.
    pub async fn run_once(&mut self) -> ExchangeOutcome {
        self.state = LoopState::Sending;

        if !self.comms.has_server_certificate() {
            if let Err(e) = self.fetch_server_certificate().await {
                return self.on_failure(&e);
            }
        }

        while let Ok(message) = self.outbox.try_recv() {
            self.out_queue.push(message);
            self.busy = true;
        }

        let now = self.time.now();
        if self.enrollment.should_send(now) {
            match self.comms.enrollment_request() {
                Ok(request) => {
                    info!("[fc-02] Requesting enrollment for {}", self.comms.agent_id());
                    self.out_queue.push(request);
                    self.enrollment.mark_sent(now);
                }
                Err(e) => warn!("[fc-02] {}", e),
            }
        }
        if self.stats.is_due(now, self.busy) {
            let snapshot = ClientStats {
                timestamp: now,
                out_queue_len: self.out_queue.len() as u64,
                connection_errors: self.connection_errors,
                bytes_sent: self.bytes_sent,
                bytes_received: self.bytes_received,
            };
            match self.stats.snapshot(&snapshot) {
                Ok(parcel) => self.out_queue.push(parcel),
                Err(e) => warn!("[fc-02] {}", e),
            }
        }

        let (body, nonce) = match self.comms.encode_messages(&self.out_queue) {
            Ok(encoded) => encoded,
            Err(e) => return self.on_failure(&e),
        };

        self.state = LoopState::AwaitingResponse;
        self.bytes_sent += body.len() as u64;
        let response = match self.transport.post_control(body).await {
            Ok(response) => response,
            Err(e) => return self.on_failure(&e.into()),
        };
        self.bytes_received += response.body.len() as u64;

        match response.status {
            200 => match self.comms.decode_messages(&response.body, nonce) {
                Ok(messages) => self.on_success(messages),
                Err(e) => {
                    self.comms.clear_server_certificate();
                    self.on_failure(&e)
                }
            },
            406 => {
                info!("[fc-02] Server does not know us; enrolling");
                self.out_queue.clear();
                self.enrollment.on_rejected();
                self.connection_errors = 0;
                self.poll
                    .on_success(self.enrollment.should_send(self.time.now()));
                self.state = LoopState::Idle;
                ExchangeOutcome::Success
            }
            500 => {
                self.comms.clear_server_certificate();
                self.on_failure(&TransportError::Status(500).into())
            }
            status => self.on_failure(&TransportError::Status(status).into()),
        }
    }

    async fn fetch_server_certificate(&mut self) -> Result<(), AgentCommsError> {
        let pem = self.transport.fetch_server_pem().await?;
        self.comms.load_server_certificate(&pem)
    }

    fn on_success(&mut self, messages: Vec<Message>) -> ExchangeOutcome {
        self.out_queue.clear();
        self.connection_errors = 0;
        self.enrollment.on_accepted();
        self.busy = !messages.is_empty();
        self.poll
            .on_success(messages.iter().any(|m| m.require_fastpoll));
        debug!("[fc-02] Received {} messages", messages.len());
        for message in messages {
            if self.inbox.send(message).is_err() {
                warn!("[fc-02] Inbox closed, dropping server message");
            }
        }
        self.state = LoopState::Idle;
        ExchangeOutcome::Success
    }

    fn on_failure(&mut self, error: &AgentCommsError) -> ExchangeOutcome {
        self.connection_errors += 1;
        AGENT_CONNECTION_ERRORS.inc();
        warn!(
            "[fc-02] Exchange failed ({} consecutive): {}",
            self.connection_errors, error
        );
        if self.connection_errors > self.config.connection_error_limit {
            self.state = LoopState::Fatal;
            return ExchangeOutcome::Fatal;
        }
        self.poll.on_error();
        self.state = LoopState::BackingOff;
        ExchangeOutcome::Retryable
    }
}
