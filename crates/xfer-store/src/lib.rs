//! # xfer-store
//!
//! Persistent implementations of the `xfer-core` store interfaces.
//!
//! | backend     | trait         | module     |
//! |-------------|---------------|------------|
//! | PostgreSQL  | `RecordStore` | [`postgres`] |
//! | filesystem  | `BlobStore`   | [`fs`]     |
//! | DynamoDB    | `RecordStore` | `aws` (feature `aws`) |
//! | S3          | `BlobStore`   | `aws` (feature `aws`) |
//!
//! In-memory stores for development and tests live in `xfer_core::memory`.

pub mod fs;
pub mod postgres;

#[cfg(feature = "aws")]
pub mod aws;

pub use fs::{FsBlobStore, SignatureError, SigningKeyError, StoredObject, UrlSigningKey};
pub use postgres::{init_pool, PgRecordStore};
