//! Transfer lifecycle configuration.
//!
//! Built once at process start and shared read-only by both coordinators.

use std::time::Duration;

use url::Url;

/// Default bytes of entropy per key (10 hex characters).
pub const DEFAULT_KEY_LENGTH: usize = 5;
/// Upper bound on `key_length`.
pub const MAX_KEY_LENGTH: usize = 64;
/// Default number of downloads per upload.
pub const DEFAULT_MAX_REDEMPTIONS: u32 = 3;
/// Default retention window (72 hours).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(72 * 60 * 60);
/// Default validity of a signed download URL (15 minutes).
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(15 * 60);
/// Default cap on candidate keys per registration.
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 5;

/// Immutable configuration for registration and redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Public link prefix, e.g. `https://example.com`.
    pub domain: Url,
    /// Bytes of entropy per generated key.
    pub key_length: usize,
    /// Downloads allowed per upload.
    pub max_redemptions: u32,
    /// How long a record stays redeemable after upload.
    pub retention: Duration,
    /// Validity window of each signed download URL.
    pub link_ttl: Duration,
    /// Candidate keys tried before giving up with `KeyspaceExhausted`.
    pub max_key_attempts: u32,
}

impl TransferConfig {
    /// Configuration with default limits for the given public domain.
    pub fn new(domain: Url) -> Self {
        Self {
            domain,
            key_length: DEFAULT_KEY_LENGTH,
            max_redemptions: DEFAULT_MAX_REDEMPTIONS,
            retention: DEFAULT_RETENTION,
            link_ttl: DEFAULT_LINK_TTL,
            max_key_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DOMAIN` (required, absolute URL)
    /// - `KEY_LEN` (default: 5)
    /// - `MAX_REDEMPTIONS` (default: 3)
    /// - `RETENTION_HOURS` (default: 72)
    /// - `LINK_TTL_SECS` (default: 900)
    ///
    /// Non-numeric values fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_domain = lookup("DOMAIN").ok_or(ConfigError::Missing("DOMAIN"))?;
        let domain = Url::parse(&raw_domain)
            .map_err(|e| ConfigError::InvalidUrl("DOMAIN".to_string(), e.to_string()))?;

        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        let mut config = Self::new(domain);
        if let Some(len) = parsed("KEY_LEN") {
            config.key_length = usize::try_from(len).unwrap_or(usize::MAX);
        }
        if let Some(max) = parsed("MAX_REDEMPTIONS") {
            config.max_redemptions = u32::try_from(max).unwrap_or(u32::MAX);
        }
        if let Some(hours) = parsed("RETENTION_HOURS") {
            config.retention = Duration::from_secs(hours.saturating_mul(3600));
        }
        if let Some(secs) = parsed("LINK_TTL_SECS") {
            config.link_ttl = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which registration or redemption can never succeed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_length == 0 || self.key_length > MAX_KEY_LENGTH {
            return Err(ConfigError::KeyLength(self.key_length));
        }
        if self.max_redemptions == 0 {
            return Err(ConfigError::Zero("MAX_REDEMPTIONS"));
        }
        if self.max_key_attempts == 0 {
            return Err(ConfigError::Zero("max_key_attempts"));
        }
        if self.retention.is_zero() {
            return Err(ConfigError::Zero("RETENTION_HOURS"));
        }
        if self.link_ttl.is_zero() {
            return Err(ConfigError::Zero("LINK_TTL_SECS"));
        }
        if self.domain.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(
                "DOMAIN".to_string(),
                "not a base URL".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("KEY_LEN must be between 1 and {MAX_KEY_LENGTH}, got {0}")]
    KeyLength(usize),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
