//! # Transfer Keys
//!
//! Opaque, guess-resistant identifiers for transfer records.
//!
//! A key is `length` bytes drawn from the operating system CSPRNG,
//! hex-encoded into `2 * length` lowercase characters. The generator offers
//! no uniqueness guarantee; uniqueness is established by the Record Store's
//! atomic insert-if-absent at registration time.

use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TransferError;

/// Reason a caller-supplied string is not a transfer key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key string was empty.
    #[error("key is empty")]
    Empty,

    /// The key has an odd number of hex digits.
    #[error("key has odd length {0}")]
    OddLength(usize),

    /// The key contains a character outside `[0-9a-f]`.
    #[error("key contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A hex-encoded transfer key.
///
/// Constructed either by a [`KeyGenerator`] or by [`TransferKey::parse`],
/// which rejects anything that is not non-empty, even-length lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferKey(String);

impl TransferKey {
    /// Parse a caller-supplied key.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        if s.is_empty() {
            return Err(KeyError::Empty);
        }
        if let Some(c) = s.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(KeyError::InvalidCharacter(c));
        }
        if s.len() % 2 != 0 {
            return Err(KeyError::OddLength(s.len()));
        }
        Ok(Self(s.to_string()))
    }

    /// Hex-encode raw entropy into a key.
    pub fn from_entropy(bytes: &[u8]) -> Self {
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Return the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TransferKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of candidate transfer keys.
///
/// Implementations must be `Send + Sync` so a single generator can be shared
/// by concurrent registrations behind an `Arc`.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    /// Produce a candidate key from `length` bytes of entropy.
    ///
    /// Fails with [`TransferError::EntropyUnavailable`] if the entropy source
    /// cannot be read; callers must not retry.
    fn generate(&self, length: usize) -> Result<TransferKey, TransferError>;
}

/// Key generator backed by the operating system CSPRNG.
///
/// Holds no state; every call reads fresh bytes from `OsRng`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeyGenerator;

impl KeyGenerator for OsKeyGenerator {
    fn generate(&self, length: usize) -> Result<TransferKey, TransferError> {
        generate(length)
    }
}

/// Draw `length` bytes from the OS CSPRNG and hex-encode them.
pub fn generate(length: usize) -> Result<TransferKey, TransferError> {
    let mut buf = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| TransferError::EntropyUnavailable(e.to_string()))?;
    Ok(TransferKey::from_entropy(&buf))
}
