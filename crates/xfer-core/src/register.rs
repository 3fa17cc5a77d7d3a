//! # Registration Coordinator
//!
//! Reserve-then-store saga for uploads:
//!
//! 1. Generate a candidate key and atomically insert the record only if the
//!    key is unused. A collision discards the candidate and retries, up to
//!    `max_key_attempts` times.
//! 2. Write the payload to the blob store under the reserved key.
//! 3. If the blob write fails, delete the reservation (compensating action)
//!    and report `UploadFailed`. A failed rollback is logged and counted but
//!    never replaces the original error.
//!
//! Reserving first makes the record store's insert the single point of truth
//! for uniqueness, and lets the blob write be retried without a new key.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::key::{KeyGenerator, OsKeyGenerator, TransferKey};
use crate::link::{compose_link, validate_filename};
use crate::record::{RecordState, TransferRecord};
use crate::store::{BlobStore, InsertOutcome, RecordStore};

/// A completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The reserved key.
    pub key: TransferKey,
    /// Public link: `{domain}/{key}/{filename}`.
    pub link: String,
    /// When the record stops being redeemable.
    pub expires_at: DateTime<Utc>,
}

/// Orchestrates uploads across the record and blob stores.
#[derive(Debug, Clone)]
pub struct RegistrationCoordinator {
    config: Arc<TransferConfig>,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    keys: Arc<dyn KeyGenerator>,
}

impl RegistrationCoordinator {
    /// Create a coordinator drawing keys from the OS CSPRNG.
    pub fn new(
        config: Arc<TransferConfig>,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            records,
            blobs,
            keys: Arc::new(OsKeyGenerator),
        }
    }

    /// Replace the key generator.
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    /// Register an upload of `payload` named `filename` from `source_address`.
    pub async fn register(
        &self,
        filename: &str,
        source_address: &str,
        payload: &[u8],
    ) -> Result<Registration, TransferError> {
        let result = self.try_register(filename, source_address, payload).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.as_str(),
        };
        counter!("xfer_registrations_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_register(
        &self,
        filename: &str,
        source_address: &str,
        payload: &[u8],
    ) -> Result<Registration, TransferError> {
        validate_filename(filename)?;
        let expires_at = expiry_after(Utc::now(), self.config.retention);
        let record = self.reserve(filename, source_address, expires_at).await?;

        if let Err(e) = self.blobs.put(&record.key, payload, filename).await {
            tracing::warn!(key = %record.key, error = %e, "blob write failed after reservation");
            self.roll_back(&record.key).await;
            return Err(TransferError::UploadFailed(e));
        }

        tracing::info!(
            key = %record.key,
            bytes = payload.len(),
            state = %RecordState::Stored,
            "transfer registered"
        );

        Ok(Registration {
            link: compose_link(&self.config.domain, &record.key, filename),
            key: record.key,
            expires_at,
        })
    }

    /// Insert a record under a fresh key, retrying on collision.
    async fn reserve(
        &self,
        filename: &str,
        source_address: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<TransferRecord, TransferError> {
        let attempts = self.config.max_key_attempts;
        for attempt in 1..=attempts {
            let key = self.keys.generate(self.config.key_length)?;
            let record = TransferRecord::new(key, filename, source_address, expires_at);

            match self
                .records
                .insert_if_absent(&record)
                .await
                .map_err(TransferError::StoreUnavailable)?
            {
                InsertOutcome::Inserted => {
                    tracing::debug!(
                        key = %record.key,
                        attempt,
                        state = %RecordState::Reserved,
                        "transfer key reserved"
                    );
                    return Ok(record);
                }
                InsertOutcome::AlreadyExists => {
                    counter!("xfer_key_collisions_total").increment(1);
                    tracing::warn!(key = %record.key, attempt, "candidate key collided, retrying");
                }
            }
        }
        Err(TransferError::KeyspaceExhausted { attempts })
    }

    /// Compensating delete for a reservation whose blob write failed.
    async fn roll_back(&self, key: &TransferKey) {
        match self.records.delete_by_key(key).await {
            Ok(()) => {
                counter!("xfer_rollbacks_total", "result" => "ok").increment(1);
                tracing::info!(%key, "reservation rolled back");
            }
            Err(e) => {
                counter!("xfer_rollbacks_total", "result" => "failed").increment(1);
                tracing::error!(
                    %key,
                    error = %e,
                    "rollback failed; orphaned record left for offline cleanup"
                );
            }
        }
    }
}

/// `now + window`, saturating at the latest representable instant.
pub(crate) fn expiry_after(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::{MemoryBlobStore, MemoryRecordStore};
    use crate::store::{IncrementOutcome, SignedUrl};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use url::Url;

    /// Hands out a fixed sequence of keys, then repeats the last one.
    #[derive(Debug)]
    struct ScriptedKeys(Mutex<VecDeque<TransferKey>>);

    impl ScriptedKeys {
        fn new(keys: &[&str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                keys.iter().map(|k| TransferKey::parse(k).unwrap()).collect(),
            )))
        }
    }

    impl KeyGenerator for ScriptedKeys {
        fn generate(&self, _length: usize) -> Result<TransferKey, TransferError> {
            let mut q = self.0.lock().unwrap();
            if q.len() > 1 {
                Ok(q.pop_front().unwrap())
            } else {
                Ok(q.front().cloned().unwrap())
            }
        }
    }

    #[derive(Debug)]
    struct NoEntropy;

    impl KeyGenerator for NoEntropy {
        fn generate(&self, _length: usize) -> Result<TransferKey, TransferError> {
            Err(TransferError::EntropyUnavailable("getrandom failed".into()))
        }
    }

    #[derive(Debug)]
    struct FailingBlobs;

    #[async_trait]
    impl BlobStore for FailingBlobs {
        async fn put(&self, _: &TransferKey, _: &[u8], _: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("blob", "disk full"))
        }
        async fn presign_get(&self, _: &TransferKey, _: Duration) -> Result<SignedUrl, StoreError> {
            Err(StoreError::unavailable("blob", "disk full"))
        }
        async fn delete(&self, _: &TransferKey) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete_if_stored_before(
            &self,
            _: &TransferKey,
            _: chrono::DateTime<chrono::Utc>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Record store that accepts inserts but cannot delete.
    #[derive(Debug, Default)]
    struct UndeletableRecords(MemoryRecordStore);

    #[async_trait]
    impl RecordStore for UndeletableRecords {
        async fn insert_if_absent(&self, r: &TransferRecord) -> Result<InsertOutcome, StoreError> {
            self.0.insert_if_absent(r).await
        }
        async fn delete_by_key(&self, _: &TransferKey) -> Result<(), StoreError> {
            Err(StoreError::unavailable("records", "timeout"))
        }
        async fn increment_if_below_limit(
            &self,
            key: &TransferKey,
            limit: u32,
            now: DateTime<Utc>,
        ) -> Result<IncrementOutcome, StoreError> {
            self.0.increment_if_below_limit(key, limit, now).await
        }
    }

    #[derive(Debug)]
    struct UnreachableRecords;

    #[async_trait]
    impl RecordStore for UnreachableRecords {
        async fn insert_if_absent(&self, _: &TransferRecord) -> Result<InsertOutcome, StoreError> {
            Err(StoreError::unavailable("records", "connection refused"))
        }
        async fn delete_by_key(&self, _: &TransferKey) -> Result<(), StoreError> {
            Ok(())
        }
        async fn increment_if_below_limit(
            &self,
            _: &TransferKey,
            _: u32,
            _: DateTime<Utc>,
        ) -> Result<IncrementOutcome, StoreError> {
            Err(StoreError::unavailable("records", "connection refused"))
        }
    }

    fn config() -> Arc<TransferConfig> {
        Arc::new(TransferConfig::new(Url::parse("https://example.com").unwrap()))
    }

    #[tokio::test]
    async fn register_returns_link_with_hex_key() {
        let records = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let coordinator =
            RegistrationCoordinator::new(config(), Arc::new(records.clone()), Arc::new(blobs.clone()));

        let reg = coordinator
            .register("report.pdf", "1.2.3.4", b"%PDF-1.7")
            .await
            .unwrap();

        assert_eq!(reg.key.as_str().len(), 10);
        assert_eq!(
            reg.link,
            format!("https://example.com/{}/report.pdf", reg.key)
        );
        let record = records.get(&reg.key).unwrap();
        assert_eq!(record.filename, "report.pdf");
        assert_eq!(record.source_address, "1.2.3.4");
        assert_eq!(record.redemption_count, 0);
        assert_eq!(blobs.get(&reg.key).unwrap().bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn expiry_is_retention_after_now() {
        let before = Utc::now();
        let coordinator = RegistrationCoordinator::new(
            config(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        let reg = coordinator.register("a.txt", "::1", b"a").await.unwrap();
        let window = reg.expires_at - before;
        assert!(window >= chrono::Duration::hours(72));
        assert!(window < chrono::Duration::hours(72) + chrono::Duration::minutes(1));
    }

    #[tokio::test]
    async fn collision_retries_with_new_key() {
        let records = MemoryRecordStore::new();
        let taken = TransferKey::parse("aaaaaaaaaa").unwrap();
        records
            .insert_if_absent(&TransferRecord::new(taken.clone(), "x", "y", Utc::now()))
            .await
            .unwrap();

        let coordinator = RegistrationCoordinator::new(
            config(),
            Arc::new(records.clone()),
            Arc::new(MemoryBlobStore::new()),
        )
        .with_key_generator(ScriptedKeys::new(&["aaaaaaaaaa", "bbbbbbbbbb"]));

        let reg = coordinator.register("b.txt", "::1", b"b").await.unwrap();
        assert_eq!(reg.key.as_str(), "bbbbbbbbbb");
        assert_eq!(records.get(&taken).unwrap().filename, "x");
    }

    #[tokio::test]
    async fn persistent_collisions_exhaust_the_keyspace() {
        let records = MemoryRecordStore::new();
        records
            .insert_if_absent(&TransferRecord::new(
                TransferKey::parse("cc").unwrap(),
                "x",
                "y",
                Utc::now(),
            ))
            .await
            .unwrap();
        let blobs = MemoryBlobStore::new();
        let coordinator =
            RegistrationCoordinator::new(config(), Arc::new(records.clone()), Arc::new(blobs.clone()))
                .with_key_generator(ScriptedKeys::new(&["cc"]));

        let err = coordinator.register("c.txt", "::1", b"c").await.unwrap_err();
        assert!(matches!(err, TransferError::KeyspaceExhausted { attempts: 5 }));
        assert_eq!(records.len(), 1);
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn blob_failure_rolls_back_reservation() {
        let records = MemoryRecordStore::new();
        let coordinator =
            RegistrationCoordinator::new(config(), Arc::new(records.clone()), Arc::new(FailingBlobs));

        let err = coordinator.register("d.txt", "::1", b"d").await.unwrap_err();
        assert!(matches!(err, TransferError::UploadFailed(_)));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_still_reports_upload_failure() {
        let records = Arc::new(UndeletableRecords::default());
        let coordinator =
            RegistrationCoordinator::new(config(), records.clone(), Arc::new(FailingBlobs));

        let err = coordinator.register("e.txt", "::1", b"e").await.unwrap_err();
        assert!(matches!(err, TransferError::UploadFailed(_)));
        // The orphan remains; it is left for offline cleanup.
        assert_eq!(records.0.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_record_store_aborts_without_blob_write() {
        let blobs = MemoryBlobStore::new();
        let coordinator =
            RegistrationCoordinator::new(config(), Arc::new(UnreachableRecords), Arc::new(blobs.clone()));

        let err = coordinator.register("f.txt", "::1", b"f").await.unwrap_err();
        assert!(matches!(err, TransferError::StoreUnavailable(_)));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn entropy_failure_is_fatal() {
        let records = MemoryRecordStore::new();
        let coordinator = RegistrationCoordinator::new(
            config(),
            Arc::new(records.clone()),
            Arc::new(MemoryBlobStore::new()),
        )
        .with_key_generator(Arc::new(NoEntropy));

        let err = coordinator.register("g.txt", "::1", b"g").await.unwrap_err();
        assert!(matches!(err, TransferError::EntropyUnavailable(_)));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn invalid_filename_is_rejected_before_reserving() {
        let records = MemoryRecordStore::new();
        let coordinator = RegistrationCoordinator::new(
            config(),
            Arc::new(records.clone()),
            Arc::new(MemoryBlobStore::new()),
        );
        let err = coordinator.register("", "::1", b"h").await.unwrap_err();
        assert!(matches!(err, TransferError::MalformedInput(_)));
        assert!(records.is_empty());
    }

    #[test]
    fn expiry_saturates_instead_of_overflowing() {
        let far = expiry_after(Utc::now(), Duration::from_secs(u64::MAX));
        assert_eq!(far, DateTime::<Utc>::MAX_UTC);
    }
}
