//! S3 blob store.
//!
//! Objects are stored under the bare transfer key with a
//! `Content-Disposition` header, so presigned GETs download under the
//! uploader's filename.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use xfer_core::{content_disposition, BlobStore, SignedUrl, StoreError, TransferKey};

const BACKEND: &str = "s3";

/// Blob store backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn from_config(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self::new(Client::new(config), bucket)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &TransferKey,
        bytes: &[u8],
        display_name: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(ByteStream::from(bytes.to_vec()))
            .content_disposition(content_disposition(display_name))
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn presign_get(&self, key: &TransferKey, ttl: Duration) -> Result<SignedUrl, StoreError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| StoreError::unavailable(BACKEND, format!("invalid ttl: {e}")))?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StoreError::unavailable(BACKEND, format!("invalid ttl: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .presigned(presigning)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;

        Ok(SignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }

    async fn delete(&self, key: &TransferKey) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }

    /// Sweeps never reach this with the DynamoDB record store, whose
    /// `purge_expired` leaves expiry to the table TTL and a bucket lifecycle
    /// rule. The head and the delete are separate calls.
    async fn delete_if_stored_before(
        &self,
        key: &TransferKey,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let head = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(head) => head,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                return Ok(false)
            }
            Err(e) => return Err(StoreError::unavailable(BACKEND, DisplayErrorContext(&e))),
        };
        // Second granularity: an object modified in the cutoff's second is kept.
        match head.last_modified() {
            Some(modified) if modified.secs() < cutoff.timestamp() => {}
            _ => return Ok(false),
        }
        self.delete(key).await?;
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }
}
