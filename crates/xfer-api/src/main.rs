//! # xfer-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Binds to `PORT` (default 8080).

use std::net::SocketAddr;

use xfer_api::config::AppConfig;
use xfer_core::TransferConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid server configuration: {e}");
        e
    })?;
    let transfer = TransferConfig::from_env().map_err(|e| {
        tracing::error!("Invalid transfer configuration: {e}");
        e
    })?;

    let port = config.port;
    let sweep_interval = config.sweep_interval;
    let metrics_enabled = config.metrics_enabled;

    let mut state = xfer_api::bootstrap::bootstrap(config, transfer)
        .await
        .map_err(|e| {
            tracing::error!("Bootstrap failed: {e}");
            e
        })?;

    if metrics_enabled {
        let handle = xfer_api::middleware::metrics::install_recorder()?;
        state = state.with_metrics(handle);
    }

    if let Some(every) = sweep_interval {
        xfer_api::reaper::spawn(state.sweeper(), every);
    } else {
        tracing::info!("Expiry sweeper disabled");
    }

    let app = xfer_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("xfer API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Structured logging: `RUST_LOG` filter (default `info`), JSON output when
/// `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
