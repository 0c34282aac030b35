use std::env;
use std::fmt;
use std::str::FromStr;
use std::string::String;

use thiserror::Error;

pub const DEFAULT_RAW_PREFIX: &str = "raw_data/";
pub const DEFAULT_PROCESSED_PREFIX: &str = "processed_data/";
pub const DEFAULT_PRODUCT_PREFIX: &str = "product_data/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} not set - {source}")]
    Missing {
        name: &'static str,
        source: env::VarError,
    },
    #[error("{name} is empty")]
    Empty { name: &'static str },
    #[error("error parsing {name} - {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: FunctionMode,
    pub bucket_name: String,
    pub raw_prefix: String,
    pub processed_prefix: String,
    pub product_prefix: String,
    pub string_field: String,
    pub list_field: String,
    pub s3_operation_timeout_secs: u64,
    pub s3_max_attempts: u32,
}

/// Which job the lambda binary runs for each invocation.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FunctionMode {
    Transform,
    Upload,
    ProductData,
}

impl FromStr for FunctionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "Transform" => Ok(FunctionMode::Transform),
            "Upload" => Ok(FunctionMode::Upload),
            "Uploader" => Ok(FunctionMode::Upload),
            "ProductData" => Ok(FunctionMode::ProductData),
            other => Err(format!("Invalid or Unsupported function mode {}", other)),
        }
    }
}

impl fmt::Display for FunctionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Config {
    pub fn load_from_env() -> Result<Config, ConfigError> {
        let bucket_name = env::var("S3_BUCKET_NAME")
            .or_else(|_| env::var("SOURCE_S3_BUCKET"))
            .map_err(|source| ConfigError::Missing {
                name: "S3_BUCKET_NAME",
                source,
            })?;
        if bucket_name.trim().is_empty() {
            return Err(ConfigError::Empty {
                name: "S3_BUCKET_NAME",
            });
        }

        let conf = Config {
            mode: env::var("FUNCTION_MODE")
                .unwrap_or("Transform".to_string())
                .parse::<FunctionMode>()
                .map_err(|reason| ConfigError::Invalid {
                    name: "FUNCTION_MODE",
                    reason,
                })?,
            bucket_name,
            raw_prefix: env::var("SOURCE_DATA_PREFIX").unwrap_or(DEFAULT_RAW_PREFIX.to_string()),
            processed_prefix: env::var("PROCESSED_DATA_PREFIX")
                .unwrap_or(DEFAULT_PROCESSED_PREFIX.to_string()),
            product_prefix: env::var("PRODUCT_DATA_PREFIX")
                .unwrap_or(DEFAULT_PRODUCT_PREFIX.to_string()),
            string_field: env::var("STRING_FIELD")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("value2".to_string()),
            list_field: env::var("LIST_FIELD")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("items".to_string()),
            s3_operation_timeout_secs: env::var("S3_OPERATION_TIMEOUT_SECS")
                .unwrap_or("30".to_string())
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid {
                    name: "S3_OPERATION_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?,
            s3_max_attempts: env::var("S3_MAX_ATTEMPTS")
                .unwrap_or("3".to_string())
                .parse::<u32>()
                .map_err(|e| ConfigError::Invalid {
                    name: "S3_MAX_ATTEMPTS",
                    reason: e.to_string(),
                })?,
        };

        Ok(conf)
    }
}

/// Bucket and key prefix parsed from an `s3://bucket/prefix` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub prefix: String,
}

impl FromStr for S3Location {
    type Err = String;

    fn from_str(s3_path: &str) -> Result<Self, String> {
        let path = s3_path
            .strip_prefix("s3://")
            .ok_or_else(|| format!("Invalid S3 path format: {}. Expected s3://bucket/prefix", s3_path))?;
        let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(format!("Invalid S3 path format: {}. Bucket is empty", s3_path));
        }

        // the prefix names a folder: `a/b` must not match `a/b_old/`
        let prefix = prefix.trim_end_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        Ok(S3Location {
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Joins a namespace prefix and a file name with exactly one `/`.
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_from_env_defaults() {
        temp_env::with_vars(
            [
                ("S3_BUCKET_NAME", Some("pipeline-bucket")),
                ("FUNCTION_MODE", None),
                ("SOURCE_DATA_PREFIX", None),
                ("PROCESSED_DATA_PREFIX", None),
                ("STRING_FIELD", None),
                ("LIST_FIELD", None),
            ],
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config.mode, FunctionMode::Transform);
                assert_eq!(config.bucket_name, "pipeline-bucket");
                assert_eq!(config.raw_prefix, "raw_data/");
                assert_eq!(config.processed_prefix, "processed_data/");
                assert_eq!(config.string_field, "value2");
                assert_eq!(config.list_field, "items");
                assert_eq!(config.s3_max_attempts, 3);
            },
        );
    }

    #[test]
    fn test_missing_bucket_is_fatal() {
        temp_env::with_vars(
            [
                ("S3_BUCKET_NAME", None::<&str>),
                ("SOURCE_S3_BUCKET", None),
            ],
            || {
                let err = Config::load_from_env().unwrap_err();
                assert!(matches!(err, ConfigError::Missing { name: "S3_BUCKET_NAME", .. }));
            },
        );
    }

    #[test]
    fn test_source_bucket_alias_and_mode() {
        temp_env::with_vars(
            [
                ("S3_BUCKET_NAME", None),
                ("SOURCE_S3_BUCKET", Some("products")),
                ("FUNCTION_MODE", Some("ProductData")),
            ],
            || {
                let config = Config::load_from_env().unwrap();
                assert_eq!(config.bucket_name, "products");
                assert_eq!(config.mode, FunctionMode::ProductData);
            },
        );
    }

    #[test]
    fn test_invalid_mode() {
        temp_env::with_vars(
            [
                ("S3_BUCKET_NAME", Some("bucket")),
                ("FUNCTION_MODE", Some("Glue")),
            ],
            || {
                assert!(matches!(
                    Config::load_from_env(),
                    Err(ConfigError::Invalid { name: "FUNCTION_MODE", .. })
                ));
            },
        );
    }

    #[test]
    fn test_parse_s3_location() {
        let loc: S3Location = "s3://source-bucket/product_data/".parse().unwrap();
        assert_eq!(loc.bucket, "source-bucket");
        assert_eq!(loc.prefix, "product_data/");

        let loc: S3Location = "s3://source-bucket/product_data".parse().unwrap();
        assert_eq!(loc.prefix, "product_data/");

        let loc: S3Location = "s3://source-bucket/product_data//".parse().unwrap();
        assert_eq!(loc.prefix, "product_data/");

        let loc: S3Location = "s3://only-bucket".parse().unwrap();
        assert_eq!(loc.prefix, "");

        let loc: S3Location = "s3://only-bucket/".parse().unwrap();
        assert_eq!(loc.prefix, "");

        assert!("https://example.com/x".parse::<S3Location>().is_err());
        assert!("s3:///prefix".parse::<S3Location>().is_err());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("processed_data/", "a.json"), "processed_data/a.json");
        assert_eq!(join_key("processed_data", "a.json"), "processed_data/a.json");
        assert_eq!(join_key("", "a.json"), "a.json");
    }
}
