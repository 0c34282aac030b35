use serde::de::{Deserialize, Deserializer};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Object-created notification in one of the shapes the pipeline accepts.
#[derive(Debug)]
pub enum Envelope {
    /// Direct bucket notification: `Records[0].s3.bucket.name` / `Records[0].s3.object.key`.
    Native(NativeEvent),
    /// Notification routed through an event bus: `detail.bucket.name` / `detail.object.key`.
    Bridged(BridgedEvent),
    Unrecognized(Value),
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct NativeEvent {
    #[serde(rename = "Records")]
    pub records: Vec<Value>,
}

impl NativeEvent {
    /// Only the first record is read; later entries may have any shape.
    pub fn first_record(&self) -> Option<NativeRecord> {
        self.records
            .first()
            .and_then(|record| NativeRecord::deserialize(record).ok())
    }
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct NativeRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct BridgedEvent {
    #[serde(rename = "detail-type", default)]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub detail: S3Entity,
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, serde::Deserialize, Serialize)]
pub struct ObjectRef {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

// Any valid JSON deserializes; unknown shapes become `Unrecognized`.
impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        Ok(Envelope::from_value(raw_value))
    }
}

impl Envelope {
    pub fn from_value(raw_value: Value) -> Self {
        if let Ok(event) = NativeEvent::deserialize(&raw_value) {
            // an empty Records list must fall through to the bridged shape
            if event.first_record().is_some_and(|r| r.s3.is_some()) {
                tracing::debug!("native s3 event detected");
                return Envelope::Native(event);
            }
        }

        if let Ok(event) = BridgedEvent::deserialize(&raw_value) {
            tracing::debug!("bridged s3 event detected");
            return Envelope::Bridged(event);
        }

        Envelope::Unrecognized(raw_value)
    }
}

/// Result of normalizing an envelope that carried a bucket and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Object { bucket: String, key: String },
    /// The key lies outside the raw namespace. Not an error.
    Skipped { bucket: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotRecognized;

/// Extracts the `(bucket, key)` pair and applies the raw-prefix filter.
pub fn normalize(envelope: &Envelope, raw_prefix: &str) -> Result<Normalized, NotRecognized> {
    let S3Entity { bucket, object } = match envelope {
        Envelope::Native(event) => {
            debug!("S3 Event: {:?}", event);
            event
                .first_record()
                .and_then(|r| r.s3)
                .ok_or(NotRecognized)?
        }
        Envelope::Bridged(event) => {
            debug!("Bridged Event: {:?}", event);
            event.detail.clone()
        }
        Envelope::Unrecognized(_) => return Err(NotRecognized),
    };

    let key = decode_key(&object.key).map_err(|_| NotRecognized)?;
    let bucket = bucket.name;

    if in_namespace(&key, raw_prefix) {
        Ok(Normalized::Object { bucket, key })
    } else {
        Ok(Normalized::Skipped { bucket, key })
    }
}

/// Notification keys are form-encoded: `+` stands for a space.
pub fn decode_key(key: &str) -> Result<String, std::str::Utf8Error> {
    let decoded = percent_encoding::percent_decode_str(&key.replace('+', " "))
        .decode_utf8()?
        .to_string();
    Ok(decoded)
}

pub fn in_namespace(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty() || key.starts_with(&format!("{}/", prefix))
}
