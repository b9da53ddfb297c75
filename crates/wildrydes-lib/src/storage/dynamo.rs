use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::retry::RetryConfig;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_json::Value;
use tracing::debug;

use super::RideStore;
use crate::config::Config;
use crate::error::StorageError;
use crate::ride::RideRequest;

/// Error codes DynamoDB uses for throttling and transient server trouble.
const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
];

/// [`RideStore`] backed by a DynamoDB table with partition key `RideId`.
#[derive(Debug, Clone)]
pub struct DynamoRideStore {
    client: Client,
    table_name: String,
}

impl DynamoRideStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Build a client from the AWS environment, honoring the configured
    /// endpoint override and timeout.
    ///
    /// SDK retries are disabled; [`StorageClient`](super::StorageClient)
    /// owns the retry bound.
    pub async fn from_config(config: &Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout)
                    .build(),
            );
        if let Some(endpoint) = &config.storage_endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(Client::from_conf(builder.build()), &config.table_name)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl RideStore for DynamoRideStore {
    async fn put(&self, record: &RideRequest) -> Result<(), StorageError> {
        debug!(table = %self.table_name, ride_id = %record.ride_id, "PutItem");

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map(|_| ())
            .map_err(classify_put_error)
    }
}

/// Convert a ride into a DynamoDB item.
///
/// Attribute names: `RideId` (S), `UserId` (S), `Payload` (M),
/// `CreatedAt` (S, RFC 3339).
pub fn record_to_item(record: &RideRequest) -> HashMap<String, AttributeValue> {
    let payload = record
        .payload
        .iter()
        .map(|(k, v)| (k.clone(), json_to_attribute(v)))
        .collect();

    HashMap::from([
        (
            "RideId".to_string(),
            AttributeValue::S(record.ride_id.as_str().to_string()),
        ),
        ("UserId".to_string(), AttributeValue::S(record.user_id.clone())),
        ("Payload".to_string(), AttributeValue::M(payload)),
        (
            "CreatedAt".to_string(),
            AttributeValue::S(record.created_at.to_rfc3339()),
        ),
    ])
}

fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

fn classify_put_error<R>(err: SdkError<PutItemError, R>) -> StorageError
where
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Unavailable(format!("{:?}", err))
        }
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let code = service_err.code().unwrap_or("Unknown");
            let message = service_err.message().unwrap_or_default();
            if RETRYABLE_CODES.contains(&code) {
                StorageError::Unavailable(format!("{}: {}", code, message))
            } else {
                StorageError::Internal(format!("{}: {}", code, message))
            }
        }
        _ => StorageError::Internal(format!("{:?}", err)),
    }
}
