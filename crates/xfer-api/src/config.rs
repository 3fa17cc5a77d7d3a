//! # Process Configuration
//!
//! Server-level options read from the environment at startup. Transfer
//! lifecycle limits (`DOMAIN`, `KEY_LEN`, ...) live in
//! [`xfer_core::TransferConfig`]; this covers listening, backend selection
//! and housekeeping.
//!
//! | Variable               | Default         | Meaning |
//! |------------------------|-----------------|---------|
//! | `PORT`                 | `8080`          | listen port |
//! | `STORE_BACKEND`        | `local`         | `local`, `postgres` or `aws` |
//! | `DATABASE_URL`         | (none)          | required for `postgres` |
//! | `REGION`               | provider chain  | AWS region for `aws` |
//! | `BLOB_BUCKET`          | (none)          | required for `aws` |
//! | `RECORD_TABLE`         | (none)          | required for `aws` |
//! | `BLOB_DIR`             | `./data/blobs`  | filesystem blob root |
//! | `BLOB_SIGNING_KEY`     | ephemeral       | hex HMAC key for `/_blobs` URLs |
//! | `MAX_UPLOAD_BYTES`     | 50 MiB          | request body limit |
//! | `SWEEP_INTERVAL_SECS`  | `300`           | expiry sweep period, `0` disables |
//! | `XFER_METRICS_ENABLED` | `true`          | mount `/metrics` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default request body limit (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
/// Default expiry sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Which store backends to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-memory records, filesystem blobs.
    #[default]
    Local,
    /// PostgreSQL records, filesystem blobs.
    Postgres,
    /// DynamoDB records, S3 blobs.
    Aws,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "postgres" => Ok(Self::Postgres),
            "aws" => Ok(Self::Aws),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub region: Option<String>,
    pub blob_bucket: Option<String>,
    pub record_table: Option<String>,
    pub blob_dir: PathBuf,
    /// Hex-encoded signing key. `None` means generate an ephemeral one.
    pub blob_signing_key: Option<String>,
    pub max_upload_bytes: usize,
    /// `None` disables the background sweeper.
    pub sweep_interval: Option<Duration>,
    pub metrics_enabled: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("region", &self.region)
            .field("blob_bucket", &self.blob_bucket)
            .field("record_table", &self.record_table)
            .field("blob_dir", &self.blob_dir)
            .field(
                "blob_signing_key",
                &self.blob_signing_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("sweep_interval", &self.sweep_interval)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            backend: StoreBackend::Local,
            database_url: None,
            region: None,
            blob_bucket: None,
            record_table: None,
            blob_dir: PathBuf::from("./data/blobs"),
            blob_signing_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse().ok()) {
            config.port = port;
        }
        if let Some(backend) = non_empty("STORE_BACKEND") {
            config.backend = backend.parse()?;
        }
        config.database_url = non_empty("DATABASE_URL");
        config.region = non_empty("REGION");
        config.blob_bucket = non_empty("BLOB_BUCKET");
        config.record_table = non_empty("RECORD_TABLE");
        if let Some(dir) = non_empty("BLOB_DIR") {
            config.blob_dir = PathBuf::from(dir);
        }
        config.blob_signing_key = non_empty("BLOB_SIGNING_KEY");
        if let Some(limit) = non_empty("MAX_UPLOAD_BYTES").and_then(|v| v.trim().parse().ok()) {
            config.max_upload_bytes = limit;
        }
        if let Some(secs) = non_empty("SWEEP_INTERVAL_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
            config.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config.metrics_enabled = lookup("XFER_METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        config.validate()?;
        Ok(config)
    }

    /// Check that the selected backend has what it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            StoreBackend::Local => {}
            StoreBackend::Postgres => {
                if self.database_url.is_none() {
                    return Err(ConfigError::Missing("DATABASE_URL"));
                }
            }
            StoreBackend::Aws => {
                if self.blob_bucket.is_none() {
                    return Err(ConfigError::Missing("BLOB_BUCKET"));
                }
                if self.record_table.is_none() {
                    return Err(ConfigError::Missing("RECORD_TABLE"));
                }
            }
        }
        Ok(())
    }
}

/// Server configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required for the selected backend")]
    Missing(&'static str),
    #[error("unknown STORE_BACKEND {0:?} (expected local, postgres or aws)")]
    UnknownBackend(String),
}
