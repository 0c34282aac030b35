use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{join_key, Config, ConfigError};
use crate::store::{ObjectStore, StoreError};
use crate::transform::CONTENT_TYPE_JSON;

pub const CONTENT_TYPE_CSV: &str = "text/csv";
pub const RECORD_SOURCE: &str = "DataUploaderLambda";

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed serializing generated data - {0}")]
    Encode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A synthetic raw record as it is written to the raw namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub event_id: Uuid,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub payload: Map<String, Value>,
}

/// One line of the product CSV consumed by the batch job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i32,
    pub last_updated: String,
}

pub struct RecordGenerator {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    raw_prefix: String,
    product_prefix: String,
}

impl RecordGenerator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        raw_prefix: impl Into<String>,
        product_prefix: impl Into<String>,
    ) -> Self {
        RecordGenerator {
            store,
            bucket: bucket.into(),
            raw_prefix: raw_prefix.into(),
            product_prefix: product_prefix.into(),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.bucket_name.clone(),
            config.raw_prefix.clone(),
            config.product_prefix.clone(),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn produce(&self) -> RawRecord {
        RawRecord {
            event_id: Uuid::new_v4(),
            timestamp: Local::now().naive_local(),
            source: RECORD_SOURCE.to_string(),
            payload: sample_payload(),
        }
    }

    /// Stores `record` as `<raw-prefix>/<timestamp>-<event id>.json` and returns the key.
    pub async fn write(&self, record: &RawRecord) -> Result<String, GeneratorError> {
        self.ensure_bucket()?;

        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| GeneratorError::Encode(e.to_string()))?;
        let key = record_key(&self.raw_prefix, record);

        tracing::info!("Uploading data to S3 Bucket: {}, Key: {}", self.bucket, key);
        self.store
            .put(&self.bucket, &key, body, CONTENT_TYPE_JSON)
            .await?;
        Ok(key)
    }

    pub fn produce_products(&self) -> Vec<Product> {
        sample_products(&Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
    }

    /// Stores the products as CSV with a header row and returns the key.
    pub async fn write_products(&self, products: &[Product]) -> Result<String, GeneratorError> {
        self.ensure_bucket()?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for product in products {
            writer
                .serialize(product)
                .map_err(|e| GeneratorError::Encode(e.to_string()))?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| GeneratorError::Encode(e.to_string()))?;

        let file_name = format!("raw_products_{}.csv", Local::now().format("%Y%m%d%H%M%S"));
        let key = join_key(&self.product_prefix, &file_name);

        tracing::info!(
            "Uploading {} products to S3 Bucket: {}, Key: {}",
            products.len(),
            self.bucket,
            key
        );
        self.store
            .put(&self.bucket, &key, body, CONTENT_TYPE_CSV)
            .await?;
        Ok(key)
    }

    fn ensure_bucket(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Empty {
                name: "S3_BUCKET_NAME",
            });
        }
        Ok(())
    }
}

pub fn record_key(raw_prefix: &str, record: &RawRecord) -> String {
    let file_name = format!(
        "{}-{}.json",
        record.timestamp.format("%Y-%m-%d-%H-%M-%S"),
        record.event_id
    );
    join_key(raw_prefix, &file_name)
}

fn sample_payload() -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("value1".to_string(), json!(123.45));
    payload.insert("value2".to_string(), json!("example_string"));
    payload.insert("items".to_string(), json!([1, 2, 3, 4, 5]));
    payload.insert(
        "metadata".to_string(),
        json!({ "version": "1.0", "status": "new" }),
    );
    payload
}

fn sample_products(last_updated: &str) -> Vec<Product> {
    [
        ("prod101", "Laptop Pro", "Electronics", 1200.50, 50),
        ("prod102", "Wireless Mouse", "Accessories", 25.99, 150),
        ("prod103", "Office Chair", "Furniture", 150.75, 30),
        ("prod104", "LED Monitor", "Electronics", 300.00, 75),
        // out of stock, dropped by the batch job
        ("prod105", "Mechanical Keyboard", "Accessories", 75.20, 0),
    ]
    .into_iter()
    .map(|(id, name, category, price, stock)| Product {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        price,
        stock,
        last_updated: last_updated.to_string(),
    })
    .collect()
}
