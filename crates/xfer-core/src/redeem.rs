//! # Redemption Coordinator
//!
//! Turns a `{key}/{filename}` download path into a short-lived signed URL,
//! charging one redemption against the record.
//!
//! The signed URL is produced *before* the counter is charged. Presigning has
//! no side effects, so a presign failure costs the caller nothing, while a
//! successful increment is always paired with a URL to return. If the
//! increment is refused the URL is discarded unseen.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::key::TransferKey;
use crate::link::DownloadPath;
use crate::record::RecordState;
use crate::store::{BlobStore, IncrementOutcome, RecordStore, SignedUrl};

/// A successful redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    /// The redeemed key.
    pub key: TransferKey,
    /// Signed URL the caller should be redirected to.
    pub url: SignedUrl,
    /// Redemption count after this call.
    pub count: u32,
    /// Record state after this call.
    pub state: RecordState,
}

/// Orchestrates downloads across the record and blob stores.
#[derive(Debug, Clone)]
pub struct RedemptionCoordinator {
    config: Arc<TransferConfig>,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl RedemptionCoordinator {
    pub fn new(
        config: Arc<TransferConfig>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            records,
            blobs,
        }
    }

    /// Redeem the transfer named by `path`.
    pub async fn redeem(&self, path: &str) -> Result<Redemption, TransferError> {
        let result = self.try_redeem(path).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.as_str(),
        };
        counter!("xfer_redemptions_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_redeem(&self, path: &str) -> Result<Redemption, TransferError> {
        let DownloadPath { key, .. } = DownloadPath::parse(path)?;

        let url = self
            .blobs
            .presign_get(&key, self.config.link_ttl)
            .await
            .map_err(TransferError::StoreUnavailable)?;

        let max = self.config.max_redemptions;
        match self
            .records
            .increment_if_below_limit(&key, max, Utc::now())
            .await
            .map_err(TransferError::StoreUnavailable)?
        {
            IncrementOutcome::Incremented { count } => {
                let state = RecordState::after_redemptions(count, max);
                tracing::info!(%key, count, %state, "transfer redeemed");
                Ok(Redemption {
                    key,
                    url,
                    count,
                    state,
                })
            }
            IncrementOutcome::Rejected(cause) => {
                tracing::info!(%key, %cause, "redemption refused");
                Err(TransferError::ConditionFailed(cause))
            }
        }
    }
}
