//! # Route Modules
//!
//! - [`transfers`]: upload and download of transfers.
//! - [`blobs`]: signed local blob serving.

pub mod blobs;
pub mod transfers;
