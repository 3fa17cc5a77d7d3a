//! # Error Types
//!
//! Failure taxonomy for the transfer lifecycle. All errors use `thiserror`
//! for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Store adapters report [`StoreError`]; the coordinators lift it into
//!   [`TransferError`] according to which step of the protocol failed.
//! - Redemption rejections keep their cause ([`RedemptionRejection`]) so that
//!   logs and metrics can tell "absent" from "exhausted". The HTTP boundary
//!   collapses every cause into a single not-found outcome.

use std::fmt;

use thiserror::Error;

/// Error reported by a Record Store or Blob Store adapter.
///
/// Condition failures (key collision, redemption limit) are *not* errors at
/// this level; they are ordinary outcomes of the conditional primitives.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend was unreachable or rejected the call for a reason other
    /// than a failed condition.
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        /// Short backend name (e.g. "postgres", "s3").
        backend: &'static str,
        /// Backend-supplied detail. Logged, never shown to callers.
        reason: String,
    },

    /// A stored item could not be decoded into a transfer record.
    #[error("corrupt {backend} item: {reason}")]
    Corrupt {
        /// Short backend name.
        backend: &'static str,
        /// What was wrong with the item.
        reason: String,
    },

    /// Local I/O failure (filesystem blob store).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(backend: &'static str, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`StoreError::Corrupt`].
    pub fn corrupt(backend: &'static str, reason: impl fmt::Display) -> Self {
        Self::Corrupt {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Why a conditional redemption increment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedemptionRejection {
    /// No record exists under the key.
    Absent,
    /// The record has already been redeemed the maximum number of times.
    Exhausted,
    /// The record's retention window has passed.
    Expired,
}

impl RedemptionRejection {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Exhausted => "exhausted",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RedemptionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a failed `register` or `redeem` invocation.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The operating system's randomness source could not be read.
    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// Every candidate key collided with an existing record.
    #[error("keyspace exhausted after {attempts} attempts")]
    KeyspaceExhausted {
        /// Number of candidate keys tried.
        attempts: u32,
    },

    /// A backing store was unreachable or rejected the call.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The conditional redemption increment was refused.
    #[error("redemption refused: {0}")]
    ConditionFailed(RedemptionRejection),

    /// Caller-supplied input could not be interpreted.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The key was reserved but the payload could not be stored. The
    /// reservation has been rolled back (best effort).
    #[error("upload failed: {0}")]
    UploadFailed(#[source] StoreError),
}

impl TransferError {
    /// Stable label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntropyUnavailable(_) => "entropy_unavailable",
            Self::KeyspaceExhausted { .. } => "keyspace_exhausted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ConditionFailed(rejection) => rejection.as_str(),
            Self::MalformedInput(_) => "malformed",
            Self::UploadFailed(_) => "upload_failed",
        }
    }

    /// Whether this outcome is reported to HTTP callers as "not found".
    ///
    /// Only meaningful for redemption: malformed paths and every refusal
    /// cause are indistinguishable from an unknown key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConditionFailed(_) | Self::MalformedInput(_))
    }
}
