use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{join_key, Config};
use crate::store::{ObjectStore, StoreError};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const STATUS_PROCESSED: &str = "processed";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("source object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },
    #[error("failed reading source object - {0}")]
    StorageRead(#[source] StoreError),
    #[error("raw record is not valid - {0}")]
    Decode(String),
    #[error("payload field `{field}` {reason}")]
    TypeMismatch { field: String, reason: String },
    #[error("failed serializing processed record - {0}")]
    Encode(String),
    #[error("failed storing processed record - {0}")]
    StorageWrite(#[source] StoreError),
}

/// Names of the payload fields the transformation derives values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRules {
    pub string_field: String,
    pub list_field: String,
}

impl Default for TransformRules {
    fn default() -> Self {
        TransformRules {
            string_field: "value2".to_string(),
            list_field: "items".to_string(),
        }
    }
}

impl From<&Config> for TransformRules {
    fn from(config: &Config) -> Self {
        TransformRules {
            string_field: config.string_field.clone(),
            list_field: config.list_field.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub bucket: String,
    pub key: String,
    pub document: Map<String, Value>,
}

pub struct RecordTransformer {
    store: Arc<dyn ObjectStore>,
    destination_bucket: String,
    processed_prefix: String,
    rules: TransformRules,
}

impl RecordTransformer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        destination_bucket: impl Into<String>,
        processed_prefix: impl Into<String>,
        rules: TransformRules,
    ) -> Self {
        RecordTransformer {
            store,
            destination_bucket: destination_bucket.into(),
            processed_prefix: processed_prefix.into(),
            rules,
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.bucket_name.clone(),
            config.processed_prefix.clone(),
            TransformRules::from(config),
        )
    }

    /// Fetches `bucket/key`, transforms it and stores the result under the
    /// processed prefix. Nothing is written unless every step before the
    /// upload succeeded, and the destination key depends only on `key`.
    pub async fn transform(&self, bucket: &str, key: &str) -> Result<ProcessedRecord, TransformError> {
        info!("Downloading object: s3://{}/{}", bucket, key);
        let raw = self.store.get(bucket, key).await.map_err(|e| match e {
            StoreError::NotFound { bucket, key } => TransformError::NotFound { bucket, key },
            other => TransformError::StorageRead(other),
        })?;

        let document = transform_document(&raw, &self.rules, Utc::now())?;
        let destination = destination_key(key, &self.processed_prefix);
        let body = encode_document(&document)?;

        self.store
            .put(&self.destination_bucket, &destination, body, CONTENT_TYPE_JSON)
            .await
            .map_err(TransformError::StorageWrite)?;

        info!(
            "Finished transforming s3://{}/{} into s3://{}/{}",
            bucket, key, self.destination_bucket, destination
        );

        Ok(ProcessedRecord {
            bucket: self.destination_bucket.clone(),
            key: destination,
            document,
        })
    }
}

/// Pretty JSON with sorted keys.
pub fn encode_document(document: &Map<String, Value>) -> Result<Vec<u8>, TransformError> {
    serde_json::to_vec_pretty(document).map_err(|e| TransformError::Encode(e.to_string()))
}

/// `processed_data/transformed-<file name of source_key>`
pub fn destination_key(source_key: &str, processed_prefix: &str) -> String {
    let filename = source_key
        .rsplit_once('/')
        .map_or(source_key, |(_, name)| name);
    join_key(processed_prefix, &format!("transformed-{}", filename))
}

/// The pure part of the transformation: everything except fetching and storing.
pub fn transform_document(
    raw: &[u8],
    rules: &TransformRules,
    processed_at: DateTime<Utc>,
) -> Result<Map<String, Value>, TransformError> {
    let mut document = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(TransformError::Decode(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            )))
        }
        Err(e) => return Err(TransformError::Decode(e.to_string())),
    };

    let payload = match document.get_mut("payload") {
        Some(Value::Object(payload)) => payload,
        Some(other) => {
            return Err(TransformError::Decode(format!(
                "`payload` must be an object, got {}",
                json_type(other)
            )))
        }
        None => return Err(TransformError::Decode("`payload` is missing".to_string())),
    };

    if let Some(value) = payload.get_mut(&rules.string_field) {
        let upper = value
            .as_str()
            .ok_or_else(|| TransformError::TypeMismatch {
                field: rules.string_field.clone(),
                reason: format!("must be a string, got {}", json_type(value)),
            })?
            .to_uppercase();
        *value = Value::String(upper);
    }

    if let Some(Value::Array(items)) = payload.get(&rules.list_field) {
        let count = items.len();
        let sum = sum_numbers(&rules.list_field, items)?;
        debug!("{} has {} items summing to {}", rules.list_field, count, sum);
        payload.insert(format!("{}_count", rules.list_field), Value::from(count));
        payload.insert(format!("{}_sum", rules.list_field), Value::Number(sum));
    }

    document.insert(
        "processingTimestamp".to_string(),
        Value::String(processed_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    document.insert(
        "status".to_string(),
        Value::String(STATUS_PROCESSED.to_string()),
    );

    Ok(document)
}

// Integer lists keep an integer sum; any float (or i64 overflow) switches to f64.
fn sum_numbers(field: &str, items: &[Value]) -> Result<Number, TransformError> {
    let mut int_sum = Some(0i64);
    let mut float_sum = 0f64;
    for (index, item) in items.iter().enumerate() {
        let Value::Number(n) = item else {
            return Err(TransformError::TypeMismatch {
                field: field.to_string(),
                reason: format!("element {} is {}, expected a number", index, json_type(item)),
            });
        };
        int_sum = int_sum.and_then(|sum| n.as_i64().and_then(|v| sum.checked_add(v)));
        float_sum += n.as_f64().unwrap_or(f64::NAN);
    }

    match int_sum {
        Some(sum) => Ok(Number::from(sum)),
        None => Number::from_f64(float_sum).ok_or_else(|| TransformError::TypeMismatch {
            field: field.to_string(),
            reason: "sum is not a finite number".to_string(),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
