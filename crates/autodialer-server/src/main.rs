//! # autodialer-server
//!
//! Coordination hub for a fleet of Android dialing devices.
//!
//! This binary provides:
//! - **Device registry** with a periodic liveness sweep
//! - **Per-device message queues** drained by HTTP polls or a WebSocket
//! - **Call lists** split into conference groups and dispatched to every
//!   reachable device
//! - **REST API** (axum) for the dashboard and the devices
//! - Optional **SQLite mirror** of devices, lists and call history

mod api;
mod config;
mod error;
mod extract;
mod hub;
mod lists;
mod mirror;
mod queue;
mod registry;
mod ws;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::{Hub, SharedHub};
use crate::mirror::Mirror;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,autodialer_server=debug")),
        )
        .init();

    info!("Starting autodialer server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // The mirror is optional; the hub never reads from it.
    let mirror = match &config.database_path {
        Some(path) => match Mirror::open(path) {
            Ok(mirror) => {
                info!(path = %path.display(), "SQLite mirror enabled");
                mirror
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not open SQLite mirror, continuing without it");
                Mirror::disabled()
            }
        },
        None => Mirror::disabled(),
    };

    let hub = Hub::new(&config).shared();

    let app_state = AppState {
        hub: hub.clone(),
        mirror: mirror.clone(),
        config: Arc::new(config.clone()),
        started_at: Instant::now(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    spawn_liveness_sweep(hub, mirror, config.sweep_interval);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Periodically flag devices that stopped polling as `disconnected`.
fn spawn_liveness_sweep(hub: SharedHub, mirror: Mirror, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;

            let (swept, records) = {
                let mut hub = hub.lock().await;
                let swept = hub.sweep();
                let records = if swept > 0 && mirror.is_enabled() {
                    hub.registry.list()
                } else {
                    Vec::new()
                };
                (swept, records)
            };

            if swept > 0 {
                info!(swept, "Marked stale devices disconnected");
                mirror.devices(records);
            }
        }
    });
}
