use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object s3://{bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },
    #[error("failed reading s3://{bucket}/{key} - {reason}")]
    Read {
        bucket: String,
        key: String,
        reason: String,
    },
    #[error("failed uploading s3://{bucket}/{key} - {reason}")]
    Write {
        bucket: String,
        key: String,
        reason: String,
    },
    #[error("failed listing s3://{bucket}/{prefix} - {reason}")]
    List {
        bucket: String,
        prefix: String,
        reason: String,
    },
}

/// Object storage used by every pipeline stage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// All keys under `prefix`, recursively, in listing order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        S3ObjectStore { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let start_time = Instant::now();
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Read {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        reason: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;
        tracing::debug!(
            "Received response from S3 in {}ms",
            start_time.elapsed().as_millis()
        );

        let capacity = response.content_length.unwrap_or(64 * 1024).max(0) as usize;
        let mut data = Vec::with_capacity(capacity);
        let mut body = response.body;
        while let Some(result) = body.next().await {
            let bytes = result.map_err(|e| StoreError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            data.extend_from_slice(&bytes[..])
        }

        tracing::info!(
            "Downloaded s3://{}/{} in {}ms ({} bytes)",
            bucket,
            key,
            start_time.elapsed().as_millis(),
            data.len()
        );

        Ok(data)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let start_time = Instant::now();
        let size = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Write {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::info!(
            "Uploaded s3://{}/{} in {}ms ({} bytes)",
            bucket,
            key,
            start_time.elapsed().as_millis(),
            size
        );
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_owned)),
            );
        }

        tracing::debug!("Listed {} objects under s3://{}/{}", keys.len(), bucket, prefix);
        Ok(keys)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store keyed by `(bucket, key)`. Writes to `failing_bucket` are rejected.
    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<BTreeMap<(String, String), (Vec<u8>, String)>>,
        pub puts: Mutex<Vec<(String, String)>>,
        pub failing_bucket: Option<String>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                (body.into(), "application/octet-stream".to_string()),
            );
        }

        pub fn object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, String)> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
        }

        pub fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
            self.object(bucket, key)
                .map(|(body, _)| body)
                .ok_or_else(|| StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> Result<(), StoreError> {
            if self.failing_bucket.as_deref() == Some(bucket) {
                return Err(StoreError::Write {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: "service unavailable".to_string(),
                });
            }
            self.puts
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                (body, content_type.to_string()),
            );
            Ok(())
        }

        async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|(b, k)| b == bucket && k.starts_with(prefix))
                .map(|(_, k)| k.clone())
                .collect())
        }
    }
}
