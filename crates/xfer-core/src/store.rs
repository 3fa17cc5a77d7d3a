//! # Store Interfaces
//!
//! The two narrow interfaces the coordinators call through. Every
//! cross-invocation guarantee of the service rests on two atomic primitives
//! supplied by the Record Store:
//!
//! - [`RecordStore::insert_if_absent`]: resolves racing registrations that
//!   drew the same candidate key. At most one insert wins.
//! - [`RecordStore::increment_if_below_limit`]: resolves racing redemptions.
//!   The counter never exceeds the limit, and exactly the callers that saw the
//!   condition hold get a success.
//!
//! Implementations must provide each as a single atomic operation; the
//! coordinators never read-then-write shared state.
//!
//! Both traits are object-safe and `Send + Sync` so backends can be selected
//! at runtime and shared behind an `Arc`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{RedemptionRejection, StoreError};
use crate::key::TransferKey;
use crate::record::TransferRecord;

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was created.
    Inserted,
    /// A record with this key already exists; nothing was written.
    AlreadyExists,
}

/// Result of an atomic increment-if-below-limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was incremented to `count`.
    Incremented {
        /// Redemption count after the increment.
        count: u32,
    },
    /// The condition did not hold; nothing was written.
    Rejected(RedemptionRejection),
}

/// A time-limited retrieval reference produced by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    /// The URL a client can fetch without further credentials.
    pub url: String,
    /// When the signature stops being honoured.
    pub expires_at: DateTime<Utc>,
}

/// Durable, key-indexed metadata store with atomic conditional writes.
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Insert `record` only if no record with the same key exists.
    async fn insert_if_absent(&self, record: &TransferRecord) -> Result<InsertOutcome, StoreError>;

    /// Delete the record under `key`. Deleting an absent key succeeds.
    async fn delete_by_key(&self, key: &TransferKey) -> Result<(), StoreError>;

    /// Increment the redemption counter of `key` only if the record exists,
    /// has not expired at `now`, and its counter is below `limit`.
    async fn increment_if_below_limit(
        &self,
        key: &TransferKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError>;

    /// Remove up to `limit` records that expired at or before `now`,
    /// returning their keys.
    ///
    /// Backends whose storage expires items natively (e.g. a TTL attribute)
    /// keep the default, which removes nothing.
    async fn purge_expired(
        &self,
        _now: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<TransferKey>, StoreError> {
        Ok(Vec::new())
    }

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Durable object store addressed by transfer key.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Store `bytes` under `key`, tagged so a later fetch suggests
    /// `display_name` to the receiving client.
    async fn put(&self, key: &TransferKey, bytes: &[u8], display_name: &str)
        -> Result<(), StoreError>;

    /// Produce a signed reference to the object under `key`, valid for `ttl`.
    ///
    /// Must be free of side effects: no state is mutated.
    async fn presign_get(&self, key: &TransferKey, ttl: Duration) -> Result<SignedUrl, StoreError>;

    /// Delete the object under `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &TransferKey) -> Result<(), StoreError>;

    /// Delete the object under `key` only if it was stored strictly before
    /// `cutoff`. Returns whether an object was removed.
    ///
    /// Used by expiry sweeps: once a record is purged its key can be drawn
    /// again, and an object stored after the purge belongs to the new
    /// transfer and must survive.
    async fn delete_if_stored_before(
        &self,
        key: &TransferKey,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
