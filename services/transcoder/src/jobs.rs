use crate::config::TranscoderConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_elastictranscoder::error::DisplayErrorContext;
use aws_sdk_elastictranscoder::types::{CreateJobOutput, JobInput};
use aws_sdk_elastictranscoder::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

/// Input parameters are detected by the service
const AUTO: &str = "auto";

#[derive(Debug, Error)]
#[error("Transcode job submission failed: {0}")]
pub struct JobError(pub String);

/// One transcode request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscodeRequest {
    pub input_key: String,
    pub output_key: String,
}

/// Submits transcode jobs to an external service
#[async_trait]
pub trait TranscodeJobs: Send + Sync {
    /// Submit one job, returning the service-assigned job id
    async fn submit(&self, request: &TranscodeRequest) -> Result<String, JobError>;
}

/// Elastic Transcoder implementation
pub struct ElasticTranscoderJobs {
    client: Client,
    pipeline_id: String,
    preset_id: String,
}

impl ElasticTranscoderJobs {
    pub async fn new(config: &TranscoderConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        info!(
            pipeline_id = %config.pipeline_id,
            preset_id = %config.preset_id,
            region = %config.region,
            "Elastic Transcoder client initialized"
        );

        Self {
            client: Client::new(&aws_config),
            pipeline_id: config.pipeline_id.clone(),
            preset_id: config.preset_id.clone(),
        }
    }
}

#[async_trait]
impl TranscodeJobs for ElasticTranscoderJobs {
    #[instrument(skip(self), fields(pipeline_id = %self.pipeline_id))]
    async fn submit(&self, request: &TranscodeRequest) -> Result<String, JobError> {
        let input = JobInput::builder()
            .key(&request.input_key)
            .frame_rate(AUTO)
            .resolution(AUTO)
            .aspect_ratio(AUTO)
            .interlaced(AUTO)
            .container(AUTO)
            .build();

        let output = CreateJobOutput::builder()
            .key(&request.output_key)
            .thumbnail_pattern("")
            .preset_id(&self.preset_id)
            .rotate(AUTO)
            .build();

        let response = self
            .client
            .create_job()
            .pipeline_id(&self.pipeline_id)
            .input(input)
            .output(output)
            .send()
            .await
            .map_err(|e| JobError(DisplayErrorContext(&e).to_string()))?;

        let job_id = response
            .job()
            .and_then(|job| job.id())
            .ok_or_else(|| JobError("response carried no job id".to_string()))?
            .to_string();

        Ok(job_id)
    }
}
