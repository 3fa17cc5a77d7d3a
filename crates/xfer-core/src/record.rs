//! # Transfer Records
//!
//! The sole persistent entity. A record is created by the registration
//! coordinator, mutated only by the atomic redemption increment, and removed
//! only by the registration rollback or the expiry sweeper.
//!
//! ## Lifecycle
//!
//! ```text
//! Reserved ──blob stored──▶ Stored ──redeem──▶ Redeemed(1) … Redeemed(max-1) ──redeem──▶ Exhausted
//!     │
//!     └──blob write failed──▶ (deleted)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::TransferKey;

/// Metadata for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Primary lookup key; unique across live records.
    pub key: TransferKey,
    /// Name supplied at upload. Presentation only, never used for lookup.
    pub filename: String,
    /// Network origin of the uploader. Advisory.
    pub source_address: String,
    /// Instant after which the record is no longer redeemable.
    pub expires_at: DateTime<Utc>,
    /// Number of successful redemptions so far.
    pub redemption_count: u32,
}

impl TransferRecord {
    /// Build a fresh, never-redeemed record.
    pub fn new(
        key: TransferKey,
        filename: impl Into<String>,
        source_address: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            filename: filename.into(),
            source_address: source_address.into(),
            expires_at,
            redemption_count: 0,
        }
    }

    /// Whether the retention window has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Redemptions left before the record is exhausted.
    pub fn remaining_redemptions(&self, max_redemptions: u32) -> u32 {
        max_redemptions.saturating_sub(self.redemption_count)
    }
}

/// Observable lifecycle state of a transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Key inserted, payload not yet confirmed in the blob store.
    Reserved,
    /// Payload stored, never redeemed.
    Stored,
    /// Redeemed `n` times with `0 < n < max`.
    Redeemed(u32),
    /// Redeemed `max` times; no further transitions.
    Exhausted,
}

impl RecordState {
    /// State of a stored record after `count` redemptions.
    pub fn after_redemptions(count: u32, max_redemptions: u32) -> Self {
        if count >= max_redemptions {
            Self::Exhausted
        } else if count == 0 {
            Self::Stored
        } else {
            Self::Redeemed(count)
        }
    }

    /// Whether a redemption attempt can still succeed from this state.
    pub fn is_redeemable(&self) -> bool {
        matches!(self, Self::Stored | Self::Redeemed(_))
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => f.write_str("reserved"),
            Self::Stored => f.write_str("stored"),
            Self::Redeemed(n) => write!(f, "redeemed({n})"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}
