use aws_config::SdkConfig;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::store::{ObjectStore, S3ObjectStore};

/// A type used to hold the AWS clients required by the pipeline stages.
#[derive(Clone)]
pub struct AwsClients {
    pub s3: S3Client,
}

impl AwsClients {
    pub fn new(sdk_config: &SdkConfig, config: &Config) -> Self {
        AwsClients {
            s3: s3_client(
                sdk_config,
                config.s3_max_attempts,
                Duration::from_secs(config.s3_operation_timeout_secs),
            ),
        }
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::new(S3ObjectStore::new(self.s3.clone()))
    }
}

/// S3 client with standard retries and a bounded time per operation.
pub fn s3_client(sdk_config: &SdkConfig, max_attempts: u32, operation_timeout: Duration) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .retry_config(RetryConfig::standard().with_max_attempts(max_attempts.max(1)))
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(operation_timeout)
                .build(),
        )
        .build();
    S3Client::from_conf(s3_config)
}
