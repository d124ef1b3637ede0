//! # In-Process Fleet
//!
//! A real [`FrontendApp`] and real agent transport loops, connected by a
//! transport that calls the frontend directly instead of going over HTTP.
//! Agents and frontend share one manual clock.

use async_trait::async_trait;
use fc_02_agent_comms::{
    AgentCommunicator, AgentHandle, EnrollmentState, ExchangeOutcome, HttpResponse,
    HttpTransport, TransportConfig, TransportError, TransportLoop,
};
use frontend_runtime::{FrontendApp, FrontendConfig, KeyMaterial};
use parking_lot::Mutex;
use shared_crypto::{Certificate, CertificateAuthority, RsaKeyPair};
use shared_types::{AgentId, ManualTimeSource, Message, Timestamp};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const NOW_SECS: u64 = 1_700_000_000;
const YEAR: u64 = 365 * 24 * 3600;

/// 0 = CA, 1 = server, 2.. = agents.
pub fn pair(index: usize) -> RsaKeyPair {
    static KEYS: OnceLock<Vec<RsaKeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| {
        (0..6)
            .map(|_| RsaKeyPair::generate(2048).expect("key generation"))
            .collect()
    })[index]
        .clone()
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Calls the frontend in-process. Can be made unreachable or told to drop
/// the next few posts.
pub struct InProcessTransport {
    app: Arc<FrontendApp>,
    reachable: AtomicBool,
    drop_next: AtomicU32,
    attempts: AtomicUsize,
    posted: Mutex<Vec<Vec<u8>>>,
}

impl InProcessTransport {
    pub fn new(app: Arc<FrontendApp>) -> Self {
        Self {
            app,
            reachable: AtomicBool::new(true),
            drop_next: AtomicU32::new(0),
            attempts: AtomicUsize::new(0),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `n` posts with a connection error.
    pub fn drop_next(&self, n: u32) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    /// Calls of either method, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Bodies that reached the frontend, oldest first.
    pub fn posted(&self) -> Vec<Vec<u8>> {
        self.posted.lock().clone()
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Connection("connection refused".into()))
        }
    }
}

#[async_trait]
impl HttpTransport for InProcessTransport {
    async fn post_control(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        self.check_reachable()?;
        let dropped = self
            .drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(TransportError::Connection("connection reset".into()));
        }
        self.posted.lock().push(body.clone());
        let response = self.app.frontend().handle_control(&body);
        Ok(HttpResponse::new(response.status, response.body))
    }

    async fn fetch_server_pem(&self) -> Result<String, TransportError> {
        self.check_reachable()?;
        Ok(self.app.frontend().comms().certificate_pem())
    }
}

// =============================================================================
// FLEET
// =============================================================================

pub struct Fleet {
    pub app: Arc<FrontendApp>,
    pub time: Arc<ManualTimeSource>,
    ca_certificate: Certificate,
    _key_dir: TempDir,
}

impl Fleet {
    pub fn new() -> Self {
        let key_dir = TempDir::new().expect("temp dir");
        let time = Arc::new(ManualTimeSource::new(Timestamp::from_secs(NOW_SECS)));

        let ca = CertificateAuthority::new_self_signed(pair(0), "fleet-ca", NOW_SECS - 10, YEAR)
            .expect("CA");
        let server_certificate = ca
            .issue_for_key_pair(&pair(1), "fleet-frontend", NOW_SECS - 10, YEAR)
            .expect("server certificate");
        let ca_certificate = ca.certificate().clone();
        let keys = KeyMaterial {
            ca,
            server_key: pair(1),
            server_certificate,
        };
        let config = FrontendConfig {
            key_dir: key_dir.path().to_path_buf(),
            key_bits: 2048,
            ..FrontendConfig::default()
        };

        let app = FrontendApp::build(config, keys, time.clone()).expect("frontend");
        Self {
            app: Arc::new(app),
            time,
            ca_certificate,
            _key_dir: key_dir,
        }
    }

    /// Bare communicator for key `index`, holding the current server
    /// certificate.
    pub fn communicator(&self, index: usize) -> AgentCommunicator {
        let mut comms =
            AgentCommunicator::new(pair(index), self.ca_certificate.clone(), self.time.clone());
        comms
            .load_server_certificate(&self.app.frontend().comms().certificate_pem())
            .expect("server certificate");
        comms
    }

    /// Agent using key `index` (2 or above).
    pub fn agent(&self, index: usize, config: TransportConfig) -> TestAgent {
        let comms = AgentCommunicator::new(pair(index), self.ca_certificate.clone(), self.time.clone());
        let id = comms.agent_id().clone();
        let transport = Arc::new(InProcessTransport::new(self.app.clone()));
        let (transport_loop, handle, inbox) =
            TransportLoop::new(comms, transport.clone(), config, self.time.clone());
        TestAgent {
            id,
            transport_loop,
            handle,
            inbox,
            transport,
        }
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TestAgent {
    pub id: AgentId,
    pub transport_loop: TransportLoop<Arc<InProcessTransport>>,
    pub handle: AgentHandle,
    pub inbox: mpsc::UnboundedReceiver<Message>,
    pub transport: Arc<InProcessTransport>,
}

impl TestAgent {
    pub async fn exchange(&mut self) -> ExchangeOutcome {
        self.transport_loop.run_once().await
    }

    /// Drive the agent from unknown to enrolled: rejected, enrollment
    /// request sent, certificate issued, accepted.
    pub async fn enroll(&mut self, fleet: &Fleet) {
        assert_eq!(self.exchange().await, ExchangeOutcome::Success);
        assert_eq!(
            self.transport_loop.enrollment().state(),
            EnrollmentState::NoCertificate
        );
        assert_eq!(self.exchange().await, ExchangeOutcome::Success);
        let summary = fleet
            .app
            .enrollment()
            .process_pending()
            .expect("enrollment pass");
        assert_eq!(summary.issued, 1);
        assert_eq!(self.exchange().await, ExchangeOutcome::Success);
        assert_eq!(
            self.transport_loop.enrollment().state(),
            EnrollmentState::Enrolled
        );
    }

    /// Server messages delivered so far.
    pub fn received(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }
}
