//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Cloning is cheap: everything is behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use xfer_core::{
    BlobStore, ExpirySweeper, RecordStore, RedemptionCoordinator, RegistrationCoordinator,
    TransferConfig,
};
use xfer_store::FsBlobStore;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transfer: Arc<TransferConfig>,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub registration: Arc<RegistrationCoordinator>,
    pub redemption: Arc<RedemptionCoordinator>,
    /// Set when blobs live on the local filesystem and are served by
    /// `/_blobs/{key}`.
    pub local_blobs: Option<Arc<FsBlobStore>>,
    /// Set when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire both coordinators over the given stores.
    pub fn new(
        config: AppConfig,
        transfer: TransferConfig,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let transfer = Arc::new(transfer);
        Self {
            config: Arc::new(config),
            registration: Arc::new(RegistrationCoordinator::new(
                Arc::clone(&transfer),
                Arc::clone(&records),
                Arc::clone(&blobs),
            )),
            redemption: Arc::new(RedemptionCoordinator::new(
                Arc::clone(&transfer),
                Arc::clone(&records),
                Arc::clone(&blobs),
            )),
            transfer,
            records,
            blobs,
            local_blobs: None,
            metrics: None,
        }
    }

    /// Use a filesystem blob store for both storage and `/_blobs` serving.
    pub fn with_local_blobs(
        config: AppConfig,
        transfer: TransferConfig,
        records: Arc<dyn RecordStore>,
        blobs: Arc<FsBlobStore>,
    ) -> Self {
        let mut state = Self::new(config, transfer, records, blobs.clone());
        state.local_blobs = Some(blobs);
        state
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// A sweeper over this state's stores.
    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(Arc::clone(&self.records), Arc::clone(&self.blobs))
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("transfer", &self.transfer)
            .field("records", &self.records)
            .field("blobs", &self.blobs)
            .field("local_blobs", &self.local_blobs.as_ref().map(|_| "[enabled]"))
            .field("metrics", &self.metrics.as_ref().map(|_| "[installed]"))
            .finish()
    }
}
