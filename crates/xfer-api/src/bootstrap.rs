//! # Backend Bootstrap
//!
//! Builds [`AppState`] from configuration at startup:
//!
//! 1. **Select backends** from `STORE_BACKEND`.
//! 2. **Connect** to PostgreSQL (running migrations) or load AWS SDK config.
//! 3. **Load the blob signing key** from `BLOB_SIGNING_KEY`, or generate an
//!    ephemeral one with a warning.
//! 4. **Log** the resulting deployment shape.

use std::sync::Arc;

use xfer_core::{MemoryRecordStore, RecordStore, StoreError, TransferConfig};
use xfer_store::{FsBlobStore, PgRecordStore, SigningKeyError, UrlSigningKey};

use crate::config::{AppConfig, StoreBackend};
use crate::state::AppState;

/// Errors during startup wiring.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("blob store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("invalid BLOB_SIGNING_KEY: {0}")]
    SigningKey(#[from] SigningKeyError),

    #[error("{0} environment variable is required for the selected backend")]
    Missing(&'static str),

    /// `STORE_BACKEND=aws` on a binary built without the `aws` feature.
    #[error("STORE_BACKEND=aws requires building with the `aws` feature")]
    AwsUnavailable,
}

/// Connect the configured backends and assemble the application state.
pub async fn bootstrap(
    config: AppConfig,
    transfer: TransferConfig,
) -> Result<AppState, BootstrapError> {
    let state = match config.backend {
        StoreBackend::Local => {
            let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
            tracing::warn!("Using in-memory record store. Transfers will not survive restarts.");
            let blobs = open_local_blobs(&config, &transfer).await?;
            AppState::with_local_blobs(config, transfer, records, blobs)
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(BootstrapError::Missing("DATABASE_URL"))?;
            let records: Arc<dyn RecordStore> = Arc::new(PgRecordStore::connect(url).await?);
            let blobs = open_local_blobs(&config, &transfer).await?;
            AppState::with_local_blobs(config, transfer, records, blobs)
        }
        StoreBackend::Aws => aws_state(config, transfer).await?,
    };

    tracing::info!(
        backend = ?state.config.backend,
        domain = %state.transfer.domain,
        key_length = state.transfer.key_length,
        max_redemptions = state.transfer.max_redemptions,
        retention_secs = state.transfer.retention.as_secs(),
        link_ttl_secs = state.transfer.link_ttl.as_secs(),
        "xfer bootstrapped"
    );
    Ok(state)
}

async fn open_local_blobs(
    config: &AppConfig,
    transfer: &TransferConfig,
) -> Result<Arc<FsBlobStore>, BootstrapError> {
    let signing_key = match config.blob_signing_key.as_deref() {
        Some(hex) => UrlSigningKey::from_hex(hex)?,
        None => {
            tracing::warn!(
                "BLOB_SIGNING_KEY not set. Using an ephemeral key; \
                 issued download URLs stop working after a restart."
            );
            UrlSigningKey::generate()
        }
    };
    let store = FsBlobStore::open(&config.blob_dir, transfer.domain.clone(), signing_key).await?;
    Ok(Arc::new(store))
}

#[cfg(feature = "aws")]
async fn aws_state(config: AppConfig, transfer: TransferConfig) -> Result<AppState, BootstrapError> {
    use xfer_store::aws::{load_sdk_config, DynamoRecordStore, S3BlobStore};

    let bucket = config
        .blob_bucket
        .clone()
        .ok_or(BootstrapError::Missing("BLOB_BUCKET"))?;
    let table = config
        .record_table
        .clone()
        .ok_or(BootstrapError::Missing("RECORD_TABLE"))?;

    let sdk = load_sdk_config(config.region.as_deref()).await;
    tracing::info!(%bucket, %table, "Using DynamoDB record store and S3 blob store");
    let records = Arc::new(DynamoRecordStore::from_config(&sdk, table));
    let blobs = Arc::new(S3BlobStore::from_config(&sdk, bucket));
    Ok(AppState::new(config, transfer, records, blobs))
}

#[cfg(not(feature = "aws"))]
async fn aws_state(_config: AppConfig, _transfer: TransferConfig) -> Result<AppState, BootstrapError> {
    Err(BootstrapError::AwsUnavailable)
}
