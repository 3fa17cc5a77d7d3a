//! DynamoDB record store.
//!
//! Item layout (partition key `s3key`):
//!
//! | attribute   | type | meaning                          |
//! |-------------|------|----------------------------------|
//! | `s3key`     | S    | transfer key                     |
//! | `filename`  | S    | name supplied at upload          |
//! | `ip`        | S    | uploader source address          |
//! | `expire_at` | N    | unix seconds; the table TTL attr |
//! | `times`     | N    | redemption count                 |
//!
//! Expiry is left to DynamoDB's native TTL on `expire_at`, so
//! `purge_expired` keeps the default no-op. TTL deletion is lazy, which is
//! why the increment condition also checks `expire_at` itself.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};

use xfer_core::{
    IncrementOutcome, InsertOutcome, RecordStore, RedemptionRejection, StoreError, TransferKey,
    TransferRecord,
};

const BACKEND: &str = "dynamodb";

const KEY_ATTR: &str = "s3key";
const TIMES_ATTR: &str = "times";
const EXPIRE_ATTR: &str = "expire_at";

/// Record store backed by a DynamoDB table.
#[derive(Debug, Clone)]
pub struct DynamoRecordStore {
    client: Client,
    table: String,
}

impl DynamoRecordStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub fn from_config(config: &aws_config::SdkConfig, table: impl Into<String>) -> Self {
        Self::new(Client::new(config), table)
    }
}

fn number(attrs: &HashMap<String, AttributeValue>, name: &str) -> Option<i64> {
    attrs.get(name)?.as_n().ok()?.parse().ok()
}

/// Classify a refused increment from the item's pre-image.
fn rejection(item: Option<&HashMap<String, AttributeValue>>, now: DateTime<Utc>) -> RedemptionRejection {
    match item {
        None => RedemptionRejection::Absent,
        Some(attrs) if attrs.is_empty() => RedemptionRejection::Absent,
        Some(attrs) => match number(attrs, EXPIRE_ATTR) {
            Some(expire_at) if expire_at <= now.timestamp() => RedemptionRejection::Expired,
            _ => RedemptionRejection::Exhausted,
        },
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn insert_if_absent(&self, record: &TransferRecord) -> Result<InsertOutcome, StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .item(KEY_ATTR, AttributeValue::S(record.key.to_string()))
            .item("filename", AttributeValue::S(record.filename.clone()))
            .item("ip", AttributeValue::S(record.source_address.clone()))
            .item(EXPIRE_ATTR, AttributeValue::N(record.expires_at.timestamp().to_string()))
            .item(TIMES_ATTR, AttributeValue::N(record.redemption_count.to_string()))
            .condition_expression("attribute_not_exists(s3key)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) => match e.into_service_error() {
                PutItemError::ConditionalCheckFailedException(_) => Ok(InsertOutcome::AlreadyExists),
                other => Err(StoreError::unavailable(BACKEND, DisplayErrorContext(&other))),
            },
        }
    }

    async fn delete_by_key(&self, key: &TransferKey) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn increment_if_below_limit(
        &self,
        key: &TransferKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome, StoreError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .update_expression("ADD times :one")
            .condition_expression("attribute_exists(s3key) AND times < :max AND expire_at > :now")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":max", AttributeValue::N(limit.to_string()))
            .expression_attribute_values(":now", AttributeValue::N(now.timestamp().to_string()))
            .return_values(ReturnValue::UpdatedNew)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await;

        match result {
            Ok(output) => {
                let count = output
                    .attributes()
                    .and_then(|attrs| number(attrs, TIMES_ATTR))
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| StoreError::corrupt(BACKEND, "update returned no counter"))?;
                Ok(IncrementOutcome::Incremented { count })
            }
            Err(e) => match e.into_service_error() {
                UpdateItemError::ConditionalCheckFailedException(failed) => Ok(
                    IncrementOutcome::Rejected(rejection(failed.item(), now)),
                ),
                other => Err(StoreError::unavailable(BACKEND, DisplayErrorContext(&other))),
            },
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, DisplayErrorContext(&e)))?;
        Ok(())
    }
}
