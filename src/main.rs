//! strangerd - anonymous-chat matchmaking daemon.
//!
//! Hosts one or more matchmaking engine instances over a shared
//! coordination store. Sessions are created by the transport layer through
//! the library API; this binary only runs engines and observability.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use strangerd::config::Config;
use strangerd::matchmaker::Matchmaker;
use strangerd::{http, metrics, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        backend = %config.store.backend,
        engines = config.matchmaker.engines,
        "Starting strangerd"
    );

    // Connect the coordination store. An unrecognized backend is fatal.
    let store = store::from_config(&config.store).await.map_err(|e| {
        error!(backend = %config.store.backend, error = %e, "Failed to set up store backend");
        e
    })?;

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // Start matchmaking engines
    let cancel = CancellationToken::new();
    let engines = Matchmaker::spawn_engines(Arc::clone(&store), &config.matchmaker, &cancel);
    info!(count = engines.len(), "Matchmaking engines started");

    tokio::signal::ctrl_c().await?;
    info!("Stopping strangerd");
    cancel.cancel();
    for engine in engines {
        if let Err(e) = engine.await {
            warn!(error = %e, "Engine task did not shut down cleanly");
        }
    }

    Ok(())
}
