//! # Transfer Routes
//!
//! | Method | Path                 | Outcome |
//! |--------|----------------------|---------|
//! | `PUT`  | `/{filename}`        | 200 with the public link as `text/plain` |
//! | `GET`  | `/{key}/{filename}`  | 302 to a signed URL, or 404 |
//!
//! Both share one wildcard route; any other method is 405. `HEAD` gets an
//! explicit 405 because the router would otherwise answer it with the `GET`
//! handler and charge a redemption.
//!
//! Filenames whose first segment is one of [`RESERVED_SEGMENTS`] belong to
//! fixed routes and are refused with 422, including on the fixed routes
//! themselves, so such a name never yields a link.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::extractors::SourceAddress;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{*path}",
        get(download).put(upload).head(head_not_allowed),
    )
}

/// First path segments taken by fixed routes.
pub const RESERVED_SEGMENTS: &[&str] = &["_blobs", "health", "metrics"];

pub fn is_reserved(filename: &str) -> bool {
    let first = filename.split('/').next().unwrap_or(filename);
    RESERVED_SEGMENTS.contains(&first)
}

/// `PUT` handler for fixed routes.
pub async fn reserved_filename() -> AppError {
    AppError::Validation("filename is reserved".into())
}

async fn head_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, HeaderValue::from_static("GET,PUT"))],
    )
        .into_response()
}

/// PUT /{filename}: store the body and return its link.
async fn upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    SourceAddress(source): SourceAddress,
    body: Bytes,
) -> Result<Response, AppError> {
    if is_reserved(&filename) {
        return Err(reserved_filename().await);
    }
    let registration = state
        .registration
        .register(&filename, &source, &body)
        .await
        .map_err(AppError::from_upload)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        registration.link,
    )
        .into_response())
}

/// GET /{key}/{filename}: charge one redemption and redirect.
async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let redemption = state
        .redemption
        .redeem(&path)
        .await
        .map_err(AppError::from_redemption)?;

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, redemption.url.url),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response())
}
