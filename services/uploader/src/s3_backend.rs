use crate::backend::{BackendError, MultipartBackend, PartAck};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// S3 implementation of the multipart storage backend
pub struct S3Backend {
    client: S3Client,
    bucket: String,
}

impl S3Backend {
    /// Create a new S3 backend
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 backend initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn fallback_location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

fn backend_error<E>(operation: &'static str, err: E) -> BackendError
where
    E: std::error::Error,
{
    BackendError::new(operation, DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl MultipartBackend for S3Backend {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| backend_error("CreateMultipartUpload", e))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| BackendError::new("CreateMultipartUpload", "no upload ID in response"))?;

        debug!(upload_id = %upload_id, "Multipart upload created");
        Ok(upload_id.to_string())
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn upload_part(
        &self,
        key: &str,
        session_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BackendError> {
        let part_number = i32::try_from(part_number)
            .map_err(|_| BackendError::new("UploadPart", "part number out of range"))?;
        let content_length = body.len() as i64;

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| backend_error("UploadPart", e))?;

        response
            .e_tag()
            .map(String::from)
            .ok_or_else(|| BackendError::new("UploadPart", "no ETag in response"))
    }

    #[instrument(skip(self, parts), fields(bucket = %self.bucket, parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        key: &str,
        session_id: &str,
        parts: &[PartAck],
    ) -> Result<String, BackendError> {
        let completed_parts = parts
            .iter()
            .map(|ack| {
                CompletedPart::builder()
                    .part_number(ack.part_number as i32)
                    .e_tag(&ack.integrity_tag)
                    .build()
            })
            .collect();

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| backend_error("CompleteMultipartUpload", e))?;

        Ok(response
            .location()
            .map(String::from)
            .unwrap_or_else(|| self.fallback_location(key)))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn abort_multipart_upload(
        &self,
        key: &str,
        session_id: &str,
    ) -> Result<(), BackendError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(session_id)
            .send()
            .await
            .map_err(|e| backend_error("AbortMultipartUpload", e))?;

        Ok(())
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| backend_error("PutObject", e))?;

        Ok(self.fallback_location(key))
    }
}
