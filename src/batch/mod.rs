//! Scheduled batch job over the product CSVs.
//!
//! Lists every `.csv` / `.csv.gz` object under the source path once, parses
//! them with their header row as schema, drops rows without stock, derives
//! `discounted_price` and `etl_processed_at`, and writes the whole result as a
//! single Parquet object under the target path. Any failure aborts the run
//! before the output is stored, so a run either writes all rows or nothing.

use chrono::{DateTime, Utc};
use futures::stream::{StreamExt, TryStreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{join_key, ConfigError, S3Location};
use crate::store::{ObjectStore, StoreError};

pub mod columnar;
pub mod rows;

pub const FETCH_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{file}:{line}: cannot cast `{field}` value {value:?} - {reason}")]
    Parse {
        file: String,
        line: u64,
        field: String,
        value: String,
        reason: String,
    },
    #[error("{file}: malformed csv - {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("{file}: failed to ungzip - {source}")]
    Decompress {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("discounted price {value} of product {id} does not fit decimal(10,2)")]
    OutOfRange { id: String, value: f64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed encoding parquet output - {0}")]
    Encode(#[from] parquet::errors::ParquetError),
}

/// Job parameters, validated once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct JobArgs {
    pub job_name: String,
    pub source: S3Location,
    pub target: S3Location,
    pub discount_rate: f64,
}

impl JobArgs {
    pub fn new(
        job_name: &str,
        source_path: &str,
        target_path: &str,
        discount_rate: f64,
    ) -> Result<Self, ConfigError> {
        if job_name.trim().is_empty() {
            return Err(ConfigError::Empty { name: "JOB_NAME" });
        }
        if !(0.0..1.0).contains(&discount_rate) {
            return Err(ConfigError::Invalid {
                name: "DISCOUNT_RATE",
                reason: format!("{} is outside [0, 1)", discount_rate),
            });
        }
        let source = source_path
            .parse::<S3Location>()
            .map_err(|reason| ConfigError::Invalid {
                name: "SOURCE_S3_PATH",
                reason,
            })?;
        let target = target_path
            .parse::<S3Location>()
            .map_err(|reason| ConfigError::Invalid {
                name: "TARGET_S3_PATH",
                reason,
            })?;

        Ok(JobArgs {
            job_name: job_name.to_string(),
            source,
            target,
            discount_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub rows_read: usize,
    pub rows_written: usize,
    /// Key of the Parquet object, `None` when there was no input.
    pub output_key: Option<String>,
}

pub struct BatchEtl {
    store: Arc<dyn ObjectStore>,
    fetch_concurrency: usize,
}

impl BatchEtl {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        BatchEtl {
            store,
            fetch_concurrency: FETCH_CONCURRENCY,
        }
    }

    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    pub async fn run(&self, args: &JobArgs) -> Result<Summary, EtlError> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!(
            "Starting job {} from {} to {} with discount rate {}",
            args.job_name, args.source, args.target, args.discount_rate
        );

        // objects written after this listing belong to the next run
        let keys = self
            .store
            .list(&args.source.bucket, &args.source.prefix)
            .await?
            .into_iter()
            .filter(|key| rows::is_tabular(key))
            .collect_vec();
        info!("Found {} tabular objects under {}", keys.len(), args.source);

        let bucket = args.source.bucket.as_str();
        let files: Vec<Vec<rows::BatchRow>> = futures::stream::iter(keys)
            .map(|key| async move {
                let data = self.store.get(bucket, &key).await?;
                let parsed = rows::parse_rows(&key, &data)?;
                debug!("Read {} rows from {}", parsed.len(), key);
                Ok::<_, EtlError>(parsed)
            })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        let all_rows = files.into_iter().flatten().collect_vec();
        let rows_read = all_rows.len();
        if rows_read == 0 {
            info!("No data found in {}. Skipping transformation.", args.source);
            return Ok(Summary {
                rows_read: 0,
                rows_written: 0,
                output_key: None,
            });
        }

        let enriched = rows::enrich(all_rows, args.discount_rate)?;
        info!(
            "{} of {} rows in stock after filtering",
            enriched.len(),
            rows_read
        );

        let data = columnar::encode(&enriched, started_at)?;
        let output_key = output_key(&args.target, &args.job_name, started_at);
        self.store
            .put(
                &args.target.bucket,
                &output_key,
                data,
                columnar::CONTENT_TYPE_PARQUET,
            )
            .await?;

        info!(
            "Job {} wrote {} rows to s3://{}/{} in {}ms",
            args.job_name,
            enriched.len(),
            args.target.bucket,
            output_key,
            start_time.elapsed().as_millis()
        );

        Ok(Summary {
            rows_read,
            rows_written: enriched.len(),
            output_key: Some(output_key),
        })
    }
}

/// One new part file per run: `<target>/part-<run start>-<job name>.parquet`.
pub fn output_key(target: &S3Location, job_name: &str, started_at: DateTime<Utc>) -> String {
    let job: String = job_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    join_key(
        &target.prefix,
        &format!("part-{}-{}.parquet", started_at.format("%Y%m%d%H%M%S"), job),
    )
}
