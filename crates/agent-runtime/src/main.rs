//! # fc-agent
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging
//! 2. Load configuration (optional TOML path as the first argument, then `FC_AGENT_*`)
//! 3. Load or generate the agent key, load the CA certificate
//! 4. Start the task worker and the transport loop
//! 5. Run until Ctrl+C or until the connection error limit is hit

use agent_runtime::{load_ca_certificate, load_or_generate_key, ActionRegistry, AgentConfig, TaskWorker};
use anyhow::{Context, Result};
use fc_02_agent_comms::{AgentCommunicator, ReqwestTransport, TransportLoop};
use fleet_telemetry::{init_telemetry, TelemetryConfig};
use shared_types::{SystemTimeSource, TimeSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(&TelemetryConfig::from_env().with_service_name("fc-agent"))
        .context("Failed to initialize telemetry")?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        AgentConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let key = load_or_generate_key(&config.key_path, config.key_bits)
        .with_context(|| format!("Failed to load key from {}", config.key_path.display()))?;
    let ca_certificate = load_ca_certificate(&config.ca_cert_path).with_context(|| {
        format!(
            "Failed to load CA certificate from {}",
            config.ca_cert_path.display()
        )
    })?;

    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let comms = AgentCommunicator::new(key, ca_certificate, time.clone());
    info!("Agent {} polling {}", comms.agent_id(), config.server_url);

    let transport = ReqwestTransport::new(&config.server_url, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let (transport_loop, handle, inbox) =
        TransportLoop::new(comms, transport, config.transport(), time);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = TaskWorker::new(ActionRegistry::with_defaults());
    let worker_task = tokio::spawn(worker.run(inbox, handle, shutdown_rx.clone()));

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Initiating graceful shutdown...");
        if let Err(e) = shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    let result = transport_loop.run(shutdown_rx).await;
    worker_task.await?;
    result.context("Transport loop stopped")?;
    info!("Agent stopped");
    Ok(())
}
