//! # Application Wiring
//!
//! Builds every component of the frontend from configuration and key
//! material. The metadata and dispatch stores are in-memory.

use crate::config::FrontendConfig;
use crate::enrollment::EnrollmentWorker;
use crate::frontend::FrontendServer;
use crate::http;
use crate::keys::{KeyError, KeyMaterial};
use crate::sinks::ClientStatsSink;
use axum::Router;
use fc_03_server_comms::{
    InMemoryAgentMetadataStore, ServerCommsConfig, ServerCommsError, ServerCommunicator,
};
use fc_04_dispatch::{
    DispatchConfig, DispatchRouter, DispatchStores, InMemoryBlobStore, InMemoryCrashStore,
    InMemoryFlowStore, InMemoryHandlerQueue, InMemoryTaskStore, SinkRegistry,
};
use parking_lot::Mutex;
use shared_types::{TimeSource, CLIENT_STATS_SINK};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

type Store = InMemoryAgentMetadataStore;

/// Startup and rotation failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Comms(#[from] ServerCommsError),

    #[error(transparent)]
    Keys(#[from] KeyError),
}

/// A fully wired frontend.
pub struct FrontendApp {
    config: FrontendConfig,
    keys: Mutex<KeyMaterial>,
    time: Arc<dyn TimeSource>,
    metadata: Arc<Store>,
    frontend: Arc<FrontendServer<Store>>,
    enrollment: Arc<EnrollmentWorker<Store>>,
    stats: Arc<ClientStatsSink>,
}

impl FrontendApp {
    pub fn build(
        config: FrontendConfig,
        keys: KeyMaterial,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, AppError> {
        let metadata = Arc::new(Store::new());
        let comms = Arc::new(ServerCommunicator::new(
            keys.server_key.clone(),
            keys.server_certificate.clone(),
            keys.ca.certificate().clone(),
            metadata.clone(),
            time.clone(),
            ServerCommsConfig {
                cipher_cache_size: config.cipher_cache_size,
            },
        )?);

        let handlers = Arc::new(InMemoryHandlerQueue::new());
        let stores = DispatchStores {
            flows: Arc::new(InMemoryFlowStore::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
            crashes: Arc::new(InMemoryCrashStore::new()),
            handlers: handlers.clone(),
            tasks: Arc::new(InMemoryTaskStore::new()),
        };

        let stats = Arc::new(ClientStatsSink::new());
        let mut sinks = SinkRegistry::new();
        sinks.register(CLIENT_STATS_SINK, stats.clone());

        let dispatch = DispatchConfig {
            message_expiry: config.message_expiry(),
            ..DispatchConfig::default()
        };
        let router = Arc::new(DispatchRouter::new(stores, sinks, dispatch, time.clone()));

        let enrollment = Arc::new(EnrollmentWorker::new(
            keys.ca.clone(),
            metadata.clone(),
            handlers,
            time.clone(),
            config.certificate_validity_secs(),
        ));

        info!("Frontend {} ready", keys.server_certificate.common_name());
        Ok(Self {
            config,
            keys: Mutex::new(keys),
            time,
            metadata,
            frontend: Arc::new(FrontendServer::new(comms, router)),
            enrollment,
            stats,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn frontend(&self) -> &Arc<FrontendServer<Store>> {
        &self.frontend
    }

    pub fn metadata(&self) -> &Arc<Store> {
        &self.metadata
    }

    pub fn stores(&self) -> &DispatchStores {
        self.frontend.router().stores()
    }

    pub fn stats(&self) -> &Arc<ClientStatsSink> {
        &self.stats
    }

    pub fn enrollment(&self) -> &Arc<EnrollmentWorker<Store>> {
        &self.enrollment
    }

    /// Axum router serving this app.
    pub fn http_router(&self) -> Router {
        http::router(self.frontend.clone(), self.config.max_body_bytes)
    }

    /// Replace the server key, persisting it under the configured key
    /// directory. Agents pick up the new certificate after their next
    /// failed exchange.
    pub fn rotate_server_key(&self) -> Result<(), AppError> {
        let now_secs = self.time.now().as_micros() / 1_000_000;
        let mut keys = self.keys.lock();
        keys.rotate_server_key(
            &self.config.key_dir,
            self.config.key_bits,
            now_secs,
            self.config.certificate_validity_secs(),
        )?;
        self.frontend
            .comms()
            .rotate_keys(keys.server_key.clone(), keys.server_certificate.clone())?;
        Ok(())
    }
}
