//! # AWS Backends
//!
//! DynamoDB record store and S3 blob store. Requires the `aws` feature.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! profile, instance role). The region can be overridden explicitly.

mod dynamo;
mod s3;

pub use dynamo::DynamoRecordStore;
pub use s3::S3BlobStore;

/// Load shared SDK configuration, optionally pinning the region.
pub async fn load_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::from_env();
    if let Some(r) = region {
        loader = loader.region(aws_config::Region::new(r.to_string()));
    }
    loader.load().await
}
