//! Object-created notifications as delivered by S3.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Object key {0:?} is not valid UTF-8 once decoded")]
    InvalidKey(String),
}

/// S3 event notification body
#[derive(Debug, Deserialize)]
pub struct S3Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: Option<S3Bucket>,
    pub object: S3Object,
}

#[derive(Debug, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct S3Object {
    /// URL-encoded object key
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl S3Notification {
    pub fn from_slice(body: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decoded object keys of every record, in delivery order
    pub fn object_keys(&self) -> Result<Vec<String>, EventError> {
        self.records
            .iter()
            .map(|record| decode_object_key(&record.s3.object.key))
            .collect()
    }
}

/// Decode a notification key: `+` is a space, then percent-decoding applies
pub fn decode_object_key(raw: &str) -> Result<String, EventError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| EventError::InvalidKey(raw.to_string()))
}
