use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use raw_record_pipeline::config::{self, FunctionMode};
use raw_record_pipeline::events::Envelope;
use raw_record_pipeline::generator::RecordGenerator;
use raw_record_pipeline::transform::RecordTransformer;
use serde_json::Value;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    raw_record_pipeline::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = config::Config::load_from_env()?;
    let aws_config = aws_config::load_defaults(BehaviorVersion::v2023_11_09()).await;
    let clients = raw_record_pipeline::AwsClients::new(&aws_config, &config);
    let store = clients.object_store();
    info!("Running in {} mode", config.mode);

    match config.mode {
        FunctionMode::Transform => {
            let transformer = RecordTransformer::from_config(store, &config);
            run(service_fn(|request: LambdaEvent<Envelope>| {
                raw_record_pipeline::function_handler(&transformer, &config, request)
            }))
            .await
        }
        FunctionMode::Upload => {
            let generator = RecordGenerator::from_config(store, &config);
            run(service_fn(|request: LambdaEvent<Value>| {
                raw_record_pipeline::upload_handler(&generator, request)
            }))
            .await
        }
        FunctionMode::ProductData => {
            let generator = RecordGenerator::from_config(store, &config);
            run(service_fn(|request: LambdaEvent<Value>| {
                raw_record_pipeline::product_data_handler(&generator, request)
            }))
            .await
        }
    }
}
