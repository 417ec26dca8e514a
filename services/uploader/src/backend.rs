//! Object storage seam used by the upload pipeline.
//!
//! The pipeline only ever talks to storage through [`MultipartBackend`];
//! [`crate::s3_backend::S3Backend`] is the production implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Failure reported by the storage backend
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    /// Backend operation that failed
    pub operation: &'static str,
    /// Backend supplied detail
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Acknowledgment for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartAck {
    /// 1-based part number, equal to the chunk sequence index
    pub part_number: u32,
    /// Integrity tag (ETag) required at finalization
    pub integrity_tag: String,
}

/// Multipart-capable object storage
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Start a multipart upload for `key` and return its session id
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, BackendError>;

    /// Upload one part and return its integrity tag
    async fn upload_part(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BackendError>;

    /// Stitch the acknowledged parts into the final object and return its location
    async fn complete_multipart_upload(
        &self,
        key: &str,
        session_id: &str,
        parts: &[PartAck],
    ) -> Result<String, BackendError>;

    /// Discard a pending multipart upload
    async fn abort_multipart_upload(&self, key: &str, session_id: &str)
        -> Result<(), BackendError>;

    /// Store a complete object in a single request
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError>;
}
