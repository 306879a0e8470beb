//! Interop relay monitor - watches cross-chain messages on every configured chain
//!
//! Loads the chain set from configuration, starts one poller per chain and
//! logs every message lifecycle transition until shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use interop_relay_monitor::chain::ChainClientPool;
use interop_relay_monitor::config::Settings;
use interop_relay_monitor::metrics::{self, MetricsServer};
use interop_relay_monitor::{LifecycleMonitor, MessageStatus};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting interop relay monitor v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let pool = Arc::new(
        ChainClientPool::connect(&settings)
            .await
            .context("Failed to initialize chain clients")?,
    );
    info!("Chain clients initialized for {:?}", pool.chain_ids());

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let monitor = Arc::new(LifecycleMonitor::new(pool.clone(), settings.monitor.clone()));
    monitor.start_monitoring(log_status).await;

    let health_handle = tokio::spawn({
        let pool = pool.clone();
        async move {
            loop {
                tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;

                let health = pool.health_check().await;
                let unhealthy: Vec<u64> = health
                    .into_iter()
                    .filter(|(_, healthy)| !healthy)
                    .map(|(chain_id, _)| chain_id)
                    .collect();

                if unhealthy.is_empty() {
                    metrics::record_health_check();
                } else {
                    warn!("Health check failed for chains {:?}", unhealthy);
                    metrics::record_health_check_failure();
                }
            }
        }
    });

    info!("Interop relay monitor is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    monitor.stop_monitoring().await;
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!(
        "Interop relay monitor stopped with {} tracked messages",
        monitor.tracked_statuses().await.len()
    );
    Ok(())
}

fn log_status(status: MessageStatus) {
    match &status.error {
        Some(reason) => warn!(
            message_hash = ?status.message_hash,
            source = status.source_chain_id(),
            destination = status.destination_chain_id(),
            "Message {}: {}",
            status.state,
            reason
        ),
        None => info!(
            message_hash = ?status.message_hash,
            source = status.source_chain_id(),
            destination = status.destination_chain_id(),
            relay_tx = ?status.relay_tx_hash,
            "Message {}",
            status.state
        ),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,interop_relay_monitor=debug,hyper=warn")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format == "json")
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(|| fmt::layer().with_target(true).with_thread_ids(true)))
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
