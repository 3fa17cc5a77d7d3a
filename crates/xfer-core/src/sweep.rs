//! Expiry sweeper.
//!
//! Removes records whose retention window has passed, then their blobs.
//! Records go first: once the record is gone no redemption can succeed, so a
//! blob left behind by a failed delete is unreachable rather than leaked to a
//! caller. Backends with native item expiry return nothing from
//! `purge_expired`, which makes a sweep a no-op for them.
//!
//! A purged key is free to be drawn again by a concurrent registration, so
//! blobs are deleted only if they were stored before the sweep started.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::error::TransferError;
use crate::store::{BlobStore, RecordStore};

/// Default number of records purged per sweep.
pub const DEFAULT_SWEEP_BATCH: usize = 500;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records deleted.
    pub records_removed: usize,
    /// Blobs whose delete failed after their record was removed.
    pub blob_failures: usize,
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    batch_size: usize,
}

impl ExpirySweeper {
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            records,
            blobs,
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Purge one batch of records expired at `now`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, TransferError> {
        let started = Utc::now();
        let keys = self
            .records
            .purge_expired(now, self.batch_size)
            .await
            .map_err(TransferError::StoreUnavailable)?;

        let mut report = SweepReport {
            records_removed: keys.len(),
            blob_failures: 0,
        };
        for key in &keys {
            match self.blobs.delete_if_stored_before(key, started).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(%key, "no blob older than the sweep"),
                Err(e) => {
                    report.blob_failures += 1;
                    tracing::warn!(%key, error = %e, "failed to delete expired blob");
                }
            }
        }

        if report.records_removed > 0 {
            counter!("xfer_swept_records_total").increment(report.records_removed as u64);
            tracing::info!(
                removed = report.records_removed,
                blob_failures = report.blob_failures,
                "expired transfers swept"
            );
        }
        Ok(report)
    }
}
