//! Sentinel - always-on crash-risk inference engine
//!
//! Reads the crawler's market-depth file every interval, scores the last
//! `sequence_length` observations with the LSTM, publishes the dashboard feed
//! and triggers a crash proof when risk crosses the crash threshold.

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use sentinel::config::AppConfig;
use sentinel::engine::InferenceEngine;
use sentinel::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    info!("================================================");
    info!("   SENTINEL - crash-risk inference engine");
    info!("================================================");
    info!(config = %config.digest(), "Configuration loaded");

    let mut engine = match InferenceEngine::initialize(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "❌ Failed to initialize engine");
            return Err(e.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await?;

    info!("✅ Sentinel shut down cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
