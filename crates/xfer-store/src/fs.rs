//! # Filesystem Blob Store
//!
//! Stores payloads under a local directory and issues HMAC-SHA256 signed
//! download URLs served by the API's `/_blobs/{key}` route.
//!
//! ## Layout
//!
//! ```text
//! {root}/{key}.bin    payload bytes
//! {root}/{key}.json   metadata (content disposition, size, stored_at)
//! ```
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! reader never observes a partially written object. Keys are lowercase hex,
//! which makes them safe path components. Writes and conditional deletes are
//! serialized by a store-wide lock so a sweep cannot remove an object that
//! was rewritten between its metadata check and the unlink.
//!
//! ## Signed URLs
//!
//! `{base}/_blobs/{key}?expires={unix}&nonce={u64}&sig={hex}` where `sig` is
//! the HMAC-SHA256 of `"{key}\n{expires}\n{nonce}"`. The nonce makes every
//! issued URL distinct. Verification is constant-time via `Mac::verify_slice`.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use xfer_core::{content_disposition, BlobStore, SignedUrl, StoreError, TransferKey};

type HmacSha256 = Hmac<Sha256>;

const BACKEND: &str = "filesystem";

/// Minimum accepted signing-key length in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Secret used to sign and verify download URLs. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UrlSigningKey(Vec<u8>);

impl UrlSigningKey {
    /// Decode a hex-encoded key of at least [`MIN_SIGNING_KEY_BYTES`] bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, SigningKeyError> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| SigningKeyError::Hex(e.to_string()))?;
        if bytes.len() < MIN_SIGNING_KEY_BYTES {
            return Err(SigningKeyError::TooShort(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Generate a random 32-byte key.
    ///
    /// URLs signed with an ephemeral key stop verifying after a restart.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SIGNING_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.0)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }
}

impl fmt::Debug for UrlSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UrlSigningKey([REDACTED])")
    }
}

/// A signing key could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningKeyError {
    #[error("signing key is not valid hex: {0}")]
    Hex(String),
    #[error("signing key is {0} bytes, need at least {MIN_SIGNING_KEY_BYTES}")]
    TooShort(usize),
}

/// Why a signed download URL was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match")]
    Invalid,
    #[error("signed URL has expired")]
    Expired,
}

/// Metadata stored next to each payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub content_disposition: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// A payload read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub meta: BlobMeta,
}

/// Blob store rooted at a local directory.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base: Url,
    signing_key: UrlSigningKey,
    write_lock: Mutex<()>,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// `public_base` is the externally visible origin under which the
    /// `/_blobs` route is served.
    pub async fn open(
        root: impl Into<PathBuf>,
        public_base: Url,
        signing_key: UrlSigningKey,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "filesystem blob store opened");
        Ok(Self {
            root,
            public_base,
            signing_key,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &TransferKey) -> PathBuf {
        self.root.join(format!("{key}.bin"))
    }

    fn meta_path(&self, key: &TransferKey) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    async fn remove_object(&self, key: &TransferKey) -> Result<(), StoreError> {
        remove_if_present(&self.meta_path(key)).await?;
        remove_if_present(&self.blob_path(key)).await?;
        Ok(())
    }

    fn signature(&self, key: &TransferKey, expires: i64, nonce: u64) -> HmacSha256 {
        let mut mac = self.signing_key.mac();
        mac.update(format!("{key}\n{expires}\n{nonce}").as_bytes());
        mac
    }

    /// Check a signed URL's parameters at `now`.
    ///
    /// The signature is checked before the expiry so that a forged URL is
    /// always reported as invalid.
    pub fn verify(
        &self,
        key: &TransferKey,
        expires: i64,
        nonce: u64,
        sig: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let provided = hex::decode(sig).map_err(|_| SignatureError::Invalid)?;
        self.signature(key, expires, nonce)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Invalid)?;
        if expires <= now.timestamp() {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    /// Read the object under `key`, or `None` if it does not exist.
    pub async fn read(&self, key: &TransferKey) -> Result<Option<StoredObject>, StoreError> {
        let bytes = match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let raw_meta = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: BlobMeta = serde_json::from_slice(&raw_meta)
            .map_err(|e| StoreError::corrupt(BACKEND, format!("{key}.json: {e}")))?;
        Ok(Some(StoredObject { bytes, meta }))
    }
}

/// Write `contents` to `path` via a temporary sibling and an atomic rename.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &TransferKey,
        bytes: &[u8],
        display_name: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let meta = BlobMeta {
            content_disposition: content_disposition(display_name),
            size: bytes.len() as u64,
            stored_at: Utc::now(),
        };
        let meta = serde_json::to_vec(&meta)
            .map_err(|e| StoreError::corrupt(BACKEND, format!("encode metadata: {e}")))?;

        // Payload first: an object is only visible once its metadata exists.
        let blob_path = self.blob_path(key);
        write_atomic(&blob_path, bytes).await?;
        if let Err(e) = write_atomic(&self.meta_path(key), &meta).await {
            if let Err(cleanup) = remove_if_present(&blob_path).await {
                tracing::warn!(%key, error = %cleanup, "failed to remove payload after metadata write failed");
            }
            return Err(e.into());
        }
        tracing::debug!(%key, size = bytes.len(), "blob written");
        Ok(())
    }

    async fn presign_get(&self, key: &TransferKey, ttl: Duration) -> Result<SignedUrl, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::unavailable(BACKEND, format!("invalid ttl: {e}")))?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let nonce = OsRng.next_u64();
        let sig = hex::encode(self.signature(key, expires, nonce).finalize().into_bytes());

        let url = format!(
            "{}/_blobs/{key}?expires={expires}&nonce={nonce}&sig={sig}",
            self.public_base.as_str().trim_end_matches('/')
        );
        Ok(SignedUrl { url, expires_at })
    }

    async fn delete(&self, key: &TransferKey) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.remove_object(key).await
    }

    async fn delete_if_stored_before(
        &self,
        key: &TransferKey,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let raw_meta = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let meta: BlobMeta = serde_json::from_slice(&raw_meta)
            .map_err(|e| StoreError::corrupt(BACKEND, format!("{key}.json: {e}")))?;
        if meta.stored_at >= cutoff {
            return Ok(false);
        }
        self.remove_object(key).await?;
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StoreError::unavailable(
                BACKEND,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> FsBlobStore {
        FsBlobStore::open(
            dir.path().join("blobs"),
            Url::parse("https://files.example.com").unwrap(),
            UrlSigningKey::from_hex(&"ab".repeat(32)).unwrap(),
        )
        .await
        .unwrap()
    }

    fn key() -> TransferKey {
        TransferKey::parse("a1b2c3d4e5").unwrap()
    }

    /// Pull `expires`, `nonce`, and `sig` back out of a signed URL.
    fn params(url: &str) -> (i64, u64, String) {
        let url = Url::parse(url).unwrap();
        let get = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        (get("expires").parse().unwrap(), get("nonce").parse().unwrap(), get("sig"))
    }

    #[tokio::test]
    async fn put_then_read_round_trips_with_disposition() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        blobs.put(&key(), b"payload", "report.pdf").await.unwrap();

        let obj = blobs.read(&key()).await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"payload");
        assert_eq!(obj.meta.size, 7);
        assert_eq!(obj.meta.content_disposition, "attachment; filename=\"report.pdf\"");
        assert!(!dir.path().join("blobs/a1b2c3d4e5.bin.tmp").exists());
    }

    #[tokio::test]
    async fn read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).await.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        blobs.put(&key(), b"x", "x").await.unwrap();
        blobs.delete(&key()).await.unwrap();
        blobs.delete(&key()).await.unwrap();
        assert!(blobs.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn presigned_url_verifies_and_is_unique() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        let ttl = Duration::from_secs(900);
        let a = blobs.presign_get(&key(), ttl).await.unwrap();
        let b = blobs.presign_get(&key(), ttl).await.unwrap();
        assert_ne!(a.url, b.url);
        assert!(a.url.starts_with("https://files.example.com/_blobs/a1b2c3d4e5?"));

        let (expires, nonce, sig) = params(&a.url);
        assert_eq!(blobs.verify(&key(), expires, nonce, &sig, Utc::now()), Ok(()));
    }

    #[tokio::test]
    async fn tampered_parameters_are_invalid() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        let signed = blobs.presign_get(&key(), Duration::from_secs(60)).await.unwrap();
        let (expires, nonce, sig) = params(&signed.url);
        let now = Utc::now();

        let other = TransferKey::parse("ffffffffff").unwrap();
        assert_eq!(
            blobs.verify(&other, expires, nonce, &sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            blobs.verify(&key(), expires + 3600, nonce, &sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            blobs.verify(&key(), expires, nonce.wrapping_add(1), &sig, now),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            blobs.verify(&key(), expires, nonce, "not-hex", now),
            Err(SignatureError::Invalid)
        );
    }

    #[tokio::test]
    async fn expired_url_is_refused() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        let signed = blobs.presign_get(&key(), Duration::from_secs(60)).await.unwrap();
        let (expires, nonce, sig) = params(&signed.url);
        let later = signed.expires_at + chrono::Duration::seconds(1);
        assert_eq!(
            blobs.verify(&key(), expires, nonce, &sig, later),
            Err(SignatureError::Expired)
        );
    }

    #[tokio::test]
    async fn urls_from_another_key_do_not_verify() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        let signed = blobs.presign_get(&key(), Duration::from_secs(60)).await.unwrap();
        let (expires, nonce, sig) = params(&signed.url);

        let other_dir = TempDir::new().unwrap();
        let other = FsBlobStore::open(
            other_dir.path(),
            Url::parse("https://files.example.com").unwrap(),
            UrlSigningKey::generate(),
        )
        .await
        .unwrap();
        assert_eq!(
            other.verify(&key(), expires, nonce, &sig, Utc::now()),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn short_or_malformed_signing_keys_are_rejected() {
        assert_eq!(
            UrlSigningKey::from_hex("abcd").unwrap_err(),
            SigningKeyError::TooShort(2)
        );
        assert!(matches!(
            UrlSigningKey::from_hex("zz").unwrap_err(),
            SigningKeyError::Hex(_)
        ));
    }

    #[test]
    fn signing_key_debug_is_redacted() {
        let key = UrlSigningKey::generate();
        assert_eq!(format!("{key:?}"), "UrlSigningKey([REDACTED])");
    }

    #[tokio::test]
    async fn health_check_passes_for_existing_root() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).await.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn failed_metadata_write_removes_payload() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        // A directory where the metadata file belongs makes the rename fail.
        std::fs::create_dir(dir.path().join("blobs/a1b2c3d4e5.json")).unwrap();

        assert!(blobs.put(&key(), b"payload", "report.pdf").await.is_err());
        assert!(!dir.path().join("blobs/a1b2c3d4e5.bin").exists());
    }

    #[tokio::test]
    async fn conditional_delete_keeps_objects_stored_after_cutoff() {
        let dir = TempDir::new().unwrap();
        let blobs = store(&dir).await;
        blobs.put(&key(), b"payload", "report.pdf").await.unwrap();
        let stored_at = blobs.read(&key()).await.unwrap().unwrap().meta.stored_at;

        assert!(!blobs.delete_if_stored_before(&key(), stored_at).await.unwrap());
        assert!(blobs.read(&key()).await.unwrap().is_some());

        let later = stored_at + chrono::Duration::seconds(1);
        assert!(blobs.delete_if_stored_before(&key(), later).await.unwrap());
        assert!(blobs.read(&key()).await.unwrap().is_none());
        assert!(!dir.path().join("blobs/a1b2c3d4e5.bin").exists());
    }
}
