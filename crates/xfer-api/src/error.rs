//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`TransferError`] outcomes to HTTP status codes and returns a JSON
//! body `{ "error": { "code", "message" } }`. Internal details are logged,
//! never returned.
//!
//! The mapping depends on which operation failed:
//!
//! - upload: malformed input is 422, everything else 500.
//! - download: every refusal cause and malformed paths are one
//!   indistinguishable 404, so callers cannot probe for key existence.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use xfer_core::TransferError;

/// Fixed message for every download refusal.
pub const NOT_FOUND_MESSAGE: &str = "transfer not found";

/// Structured JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND").
    pub code: &'static str,
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// 404.
    #[error("{0}")]
    NotFound(String),

    /// Request content was unacceptable (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Signed URL missing, forged or expired (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Map a failed registration.
    pub fn from_upload(err: TransferError) -> Self {
        match err {
            TransferError::MalformedInput(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }

    /// Map a failed redemption.
    pub fn from_redemption(err: TransferError) -> Self {
        if err.is_not_found() {
            Self::not_found()
        } else {
            Self::Internal(err.to_string())
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound(NOT_FOUND_MESSAGE.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}
