//! # xfer-api — Axum HTTP Surface for xfer
//!
//! Ephemeral file transfer: `PUT` a file, get back a link; each `GET` of the
//! link redirects to a short-lived signed URL until the redemption limit is
//! reached.
//!
//! ## API Surface
//!
//! | Route                 | Module                    | Purpose |
//! |-----------------------|---------------------------|---------|
//! | `PUT /{filename}`     | [`routes::transfers`]     | upload, returns link |
//! | `GET /{key}/{name}`   | [`routes::transfers`]     | redeem, 302 to signed URL |
//! | `GET /_blobs/{key}`   | [`routes::blobs`]         | serve a signed local blob |
//! | `GET /health/*`       | this module               | liveness / readiness |
//! | `GET /metrics`        | this module               | Prometheus scrape |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → DefaultBodyLimit → Handler
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod reaper;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::routes::transfers::reserved_filename;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/metrics` sit outside the body limit and request
/// metrics. `/metrics` is mounted only when a recorder handle is present.
pub fn app(state: AppState) -> Router {
    let mut api = Router::new()
        .merge(routes::transfers::router())
        .merge(routes::blobs::router())
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    if state.metrics.is_some() {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    let api = api
        .layer(middleware::tracing_layer::layer())
        .with_state(state.clone());

    let mut probes = Router::new()
        .route("/health/liveness", get(liveness).put(reserved_filename))
        .route("/health/readiness", get(readiness).put(reserved_filename));

    if state.metrics.is_some() {
        probes = probes.route("/metrics", get(prometheus_metrics).put(reserved_filename));
    }

    Router::new().merge(probes.with_state(state)).merge(api)
}

/// GET /metrics: Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn liveness() -> &'static str {
    "ok"
}

/// GET /health/readiness: both stores must answer their health checks.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.records.health_check().await {
        tracing::warn!("Record store health check failed: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "record store unreachable").into_response();
    }
    if let Err(e) = state.blobs.health_check().await {
        tracing::warn!("Blob store health check failed: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "blob store unreachable").into_response();
    }
    (StatusCode::OK, "ready").into_response()
}
