mod api;
mod broadcast;
mod config;
mod control;
mod error;
mod stats;
mod store;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::{net::TcpListener, signal, time};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{api::AppState, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Shared state: broadcaster, event store and control service
    let state = AppState::new(
        config.subscriber_buffer,
        Duration::from_millis(config.command_lock_timeout_ms),
    );

    // Spawn the retention task — the store only exposes the purge operation,
    // this loop is the trigger.
    if config.purge_interval_secs > 0 {
        let store = state.store.clone();
        let retention_days = config.retention_days;
        let interval = Duration::from_secs(config.purge_interval_secs);

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            info!(
                interval_secs = interval.as_secs(),
                retention_days, "Retention loop started"
            );

            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                let removed = store.purge_readings_older_than(cutoff).await;
                if removed > 0 {
                    info!(removed, "Purged expired readings");
                }
            }
        });
    }

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
