//! # Local Blob Serving
//!
//! `GET /_blobs/{key}?expires=..&nonce=..&sig=..` redeems a URL issued by
//! the filesystem blob store. When the state carries no local store every
//! request is 404.
//!
//! The redemption counter was already charged when the URL was issued, so
//! this route only checks the signature and expiry.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use xfer_core::TransferKey;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/_blobs/{key}",
        get(serve_blob).put(super::transfers::reserved_filename),
    )
}

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: i64,
    pub nonce: u64,
    pub sig: String,
}

async fn serve_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    params: Result<Query<SignedParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Some(store) = state.local_blobs.as_ref() else {
        return Err(AppError::not_found());
    };
    let key = TransferKey::parse(&key).map_err(|_| AppError::not_found())?;
    let Query(params) = params.map_err(|_| AppError::Forbidden("missing signature".into()))?;

    store
        .verify(&key, params.expires, params.nonce, &params.sig, Utc::now())
        .map_err(|e| {
            tracing::info!(%key, reason = %e, "signed blob URL refused");
            AppError::Forbidden(e.to_string())
        })?;

    let object = store
        .read(&key)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(AppError::not_found)?;

    let disposition = HeaderValue::from_bytes(object.meta.content_disposition.as_bytes())
        .map_err(|e| AppError::Internal(format!("stored content disposition: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        object.bytes,
    )
        .into_response())
}
