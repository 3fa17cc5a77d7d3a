//! # xfer-core
//!
//! Domain core of the ephemeral file-transfer service: an uploader receives
//! an unguessable link, and the link can be redeemed a bounded number of
//! times within a retention window.
//!
//! ## Modules
//!
//! - [`key`]: hex transfer keys drawn from the OS CSPRNG.
//! - [`record`]: the transfer record and its lifecycle states.
//! - [`store`]: the [`RecordStore`] and [`BlobStore`] seams, whose atomic
//!   conditional primitives carry every concurrency guarantee.
//! - [`register`]: reserve-then-store upload saga with rollback.
//! - [`redeem`]: conditional-increment download path.
//! - [`sweep`]: background removal of expired transfers.
//! - [`memory`]: DashMap-backed stores for development and tests.
//!
//! Persistent backends live in `xfer-store`; the HTTP surface in `xfer-api`.

pub mod config;
pub mod error;
pub mod key;
pub mod link;
pub mod memory;
pub mod record;
pub mod redeem;
pub mod register;
pub mod store;
pub mod sweep;

pub use config::{ConfigError, TransferConfig};
pub use error::{RedemptionRejection, StoreError, TransferError};
pub use key::{KeyGenerator, OsKeyGenerator, TransferKey};
pub use link::{compose_link, content_disposition, DownloadPath};
pub use memory::{MemoryBlobStore, MemoryRecordStore};
pub use record::{RecordState, TransferRecord};
pub use redeem::{Redemption, RedemptionCoordinator};
pub use register::{Registration, RegistrationCoordinator};
pub use store::{BlobStore, IncrementOutcome, InsertOutcome, RecordStore, SignedUrl};
pub use sweep::{ExpirySweeper, SweepReport};
