//! In-memory store backends using DashMap.
//!
//! DashMap's per-shard write lock makes `entry()` and `get_mut()` atomic with
//! respect to every other operation on the same key, which is exactly the
//! guarantee the conditional primitives need. Data is lost on restart; these
//! backends serve development, single-process deployments, and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{RedemptionRejection, StoreError};
use crate::key::TransferKey;
use crate::link::content_disposition;
use crate::record::TransferRecord;
use crate::store::{BlobStore, IncrementOutcome, InsertOutcome, RecordStore, SignedUrl};

/// Record store held in process memory.
///
/// Cheaply cloneable via `Arc`; all clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<DashMap<TransferKey, TransferRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record under `key`.
    pub fn get(&self, key: &TransferKey) -> Option<TransferRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, record: &TransferRecord) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn delete_by_key(&self, key: &TransferKey) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }

    async fn increment_if_below_limit(
        &self,
        key: &TransferKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError> {
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(IncrementOutcome::Rejected(RedemptionRejection::Absent));
        };
        if record.is_expired(now) {
            return Ok(IncrementOutcome::Rejected(RedemptionRejection::Expired));
        }
        if record.redemption_count >= limit {
            return Ok(IncrementOutcome::Rejected(RedemptionRejection::Exhausted));
        }
        record.redemption_count += 1;
        Ok(IncrementOutcome::Incremented {
            count: record.redemption_count,
        })
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TransferKey>, StoreError> {
        // Collect first: removing while iterating would deadlock on the shard lock.
        let candidates: Vec<TransferKey> = self
            .records
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| r.key().clone())
            .take(limit)
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|key| self.records.remove_if(key, |_, r| r.is_expired(now)).is_some())
            .collect())
    }
}

/// A payload held by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_disposition: String,
    pub stored_at: DateTime<Utc>,
}

/// Blob store held in process memory.
///
/// Presigned URLs use the `memory://` scheme; they identify the object and
/// carry an expiry and a per-call nonce but cannot be fetched over HTTP.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<TransferKey, StoredBlob>>,
    nonce: Arc<AtomicU64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the object under `key`.
    pub fn get(&self, key: &TransferKey) -> Option<StoredBlob> {
        self.blobs.get(key).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &TransferKey,
        bytes: &[u8],
        display_name: &str,
    ) -> Result<(), StoreError> {
        self.blobs.insert(
            key.clone(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_disposition: content_disposition(display_name),
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn presign_get(&self, key: &TransferKey, ttl: Duration) -> Result<SignedUrl, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::unavailable("memory", format!("invalid ttl: {e}")))?;
        let expires_at = Utc::now() + ttl;
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        Ok(SignedUrl {
            url: format!(
                "memory://{key}?expires={}&nonce={nonce}",
                expires_at.timestamp()
            ),
            expires_at,
        })
    }

    async fn delete(&self, key: &TransferKey) -> Result<(), StoreError> {
        self.blobs.remove(key);
        Ok(())
    }

    async fn delete_if_stored_before(
        &self,
        key: &TransferKey,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .blobs
            .remove_if(key, |_, blob| blob.stored_at < cutoff)
            .is_some())
    }
}
