//! # fc-frontend
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load configuration (optional TOML path as the first argument, then `FC_*`)
//! 3. Load or generate the CA and server identity
//! 4. Start the enrollment worker
//! 5. Serve HTTP until Ctrl+C
//!
//! On Unix, `SIGHUP` rotates the server key.

use anyhow::{Context, Result};
use fleet_telemetry::{init_telemetry, TelemetryConfig};
use frontend_runtime::{FrontendApp, FrontendConfig, KeyMaterial};
use shared_types::{SystemTimeSource, TimeSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(&TelemetryConfig::from_env().with_service_name("fc-frontend"))
            .context("Failed to initialize telemetry")?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        FrontendConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let now_secs = time.now().as_micros() / 1_000_000;
    let keys = KeyMaterial::load_or_generate(
        &config.key_dir,
        &config.common_name,
        config.key_bits,
        now_secs,
        config.certificate_validity_secs(),
    )
    .with_context(|| format!("Failed to load keys from {}", config.key_dir.display()))?;

    let app = Arc::new(FrontendApp::build(config.clone(), keys, time)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let enrollment = app.enrollment().clone();
    let interval = config.enrollment_interval();
    let enrollment_shutdown = shutdown_rx.clone();
    let enrollment_task =
        tokio::spawn(async move { enrollment.run(interval, enrollment_shutdown).await });

    #[cfg(unix)]
    spawn_rotation_on_hangup(app.clone(), shutdown_rx.clone())?;

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on {}", listener.local_addr()?);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Initiating graceful shutdown...");
        if let Err(e) = shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app.http_router())
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await
        .context("HTTP server failed")?;

    enrollment_task.await?;
    info!("Frontend stopped");
    Ok(())
}

#[cfg(unix)]
fn spawn_rotation_on_hangup(
    app: Arc<FrontendApp>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    let app = app.clone();
                    match tokio::task::spawn_blocking(move || app.rotate_server_key()).await {
                        Ok(Ok(())) => info!("Server key rotated"),
                        Ok(Err(e)) => error!("Key rotation failed: {}", e),
                        Err(e) => error!("Key rotation task failed: {}", e),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    });
    Ok(())
}
