use anyhow::Context;
use aws_config::BehaviorVersion;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use raw_record_pipeline::batch::{BatchEtl, JobArgs, FETCH_CONCURRENCY};
use raw_record_pipeline::clients::s3_client;
use raw_record_pipeline::store::S3ObjectStore;

/// Filters the product CSVs, applies the discount and writes one Parquet file.
#[derive(Parser, Debug)]
#[command(name = "batch-etl")]
#[command(version)]
struct Cli {
    #[arg(long = "JOB_NAME")]
    job_name: String,
    /// s3://bucket/prefix holding the raw product CSVs
    #[arg(long = "SOURCE_S3_PATH")]
    source_s3_path: String,
    /// s3://bucket/prefix receiving the Parquet output
    #[arg(long = "TARGET_S3_PATH")]
    target_s3_path: String,
    /// Fraction taken off every price, in [0, 1)
    #[arg(long = "DISCOUNT_RATE")]
    discount_rate: f64,
    #[arg(long = "FETCH_CONCURRENCY", default_value_t = FETCH_CONCURRENCY)]
    fetch_concurrency: usize,
    #[arg(long = "S3_MAX_ATTEMPTS", default_value_t = 3)]
    s3_max_attempts: u32,
    #[arg(long = "S3_OPERATION_TIMEOUT_SECS", default_value_t = 30)]
    s3_operation_timeout_secs: u64,
}

async fn run_job(cli: Cli) -> anyhow::Result<()> {
    let args = JobArgs::new(
        &cli.job_name,
        &cli.source_s3_path,
        &cli.target_s3_path,
        cli.discount_rate,
    )
    .context("invalid job arguments")?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::v2023_11_09()).await;
    let client = s3_client(
        &aws_config,
        cli.s3_max_attempts,
        Duration::from_secs(cli.s3_operation_timeout_secs),
    );
    let etl = BatchEtl::new(Arc::new(S3ObjectStore::new(client)))
        .with_fetch_concurrency(cli.fetch_concurrency);

    let summary = etl
        .run(&args)
        .await
        .with_context(|| format!("job {} failed", args.job_name))?;
    info!(
        "Job {} finished: {} rows read, {} rows written, output {:?}",
        args.job_name, summary.rows_read, summary.rows_written, summary.output_key
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    raw_record_pipeline::set_up_logging();
    let cli = Cli::parse();

    match run_job(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
