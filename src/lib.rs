use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::{Envelope, Normalized, NotRecognized};
use crate::generator::RecordGenerator;
use crate::transform::RecordTransformer;

pub mod batch;
pub mod capabilities;
pub mod clients;
pub mod config;
pub mod events;
pub mod generator;
pub mod store;
pub mod transform;

pub use crate::clients::AwsClients;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Proxy-style response; `body` holds JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: String,
}

impl Response {
    pub fn json(status_code: u16, body: Value) -> Self {
        Response {
            status_code,
            body: body.to_string(),
        }
    }

    fn message(message: &str) -> Self {
        Self::json(200, json!({ "message": message }))
    }

    fn error(status_code: u16, error: impl ToString) -> Self {
        Self::json(status_code, json!({ "error": error.to_string() }))
    }
}

// lambda handler for object-created notifications
pub async fn function_handler(
    transformer: &RecordTransformer,
    config: &Config,
    evt: LambdaEvent<Envelope>,
) -> Result<Response, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    let (bucket, key) = match events::normalize(&evt.payload, &config.raw_prefix) {
        Ok(Normalized::Object { bucket, key }) => (bucket, key),
        Ok(Normalized::Skipped { key, .. }) => {
            info!(
                "Skipping {}; does not start with prefix '{}'",
                key, config.raw_prefix
            );
            return Ok(Response::message("Skipped"));
        }
        Err(NotRecognized) => {
            warn!("Unrecognized event format: {:?}", evt.payload);
            return Ok(Response::error(400, "Bad event format"));
        }
    };

    info!("Received event for bucket={}, key={}", bucket, key);
    match transformer.transform(&bucket, &key).await {
        Ok(_) => Ok(Response::message("Success")),
        Err(e) => {
            error!("Error processing s3://{}/{} - {}", bucket, key, e);
            Ok(Response::error(500, e))
        }
    }
}

// scheduled lambda handler writing one synthetic raw record
pub async fn upload_handler(
    generator: &RecordGenerator,
    evt: LambdaEvent<Value>,
) -> Result<Response, Error> {
    debug!("Handling scheduled event: {:?}", evt.payload);
    let record = generator.produce();
    match generator.write(&record).await {
        Ok(key) => Ok(Response::json(
            200,
            json!({
                "message": "Data uploaded successfully!",
                "bucket": generator.bucket(),
                "key": key,
            }),
        )),
        Err(e) => {
            error!("Error uploading data: {}", e);
            Ok(Response::error(500, e))
        }
    }
}

// scheduled lambda handler writing the sample product csv
pub async fn product_data_handler(
    generator: &RecordGenerator,
    evt: LambdaEvent<Value>,
) -> Result<Response, Error> {
    debug!("Handling scheduled event: {:?}", evt.payload);
    let products = generator.produce_products();
    match generator.write_products(&products).await {
        Ok(key) => Ok(Response::json(
            200,
            json!({
                "message": format!("Successfully uploaded {} products", products.len()),
                "bucket": generator.bucket(),
                "key": key,
            }),
        )),
        Err(e) => {
            error!("Error uploading to S3: {}", e);
            Ok(Response::error(500, e))
        }
    }
}
