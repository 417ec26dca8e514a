//! Turns notifications into detached job submissions.

use crate::config::TranscoderConfig;
use crate::jobs::{TranscodeJobs, TranscodeRequest};
use crate::output_key::{derive_output_key, has_extension};
use metrics::counter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct Dispatcher {
    jobs: Arc<dyn TranscodeJobs>,
    source_extension: String,
    output_extension: String,
}

impl Dispatcher {
    pub fn new(jobs: Arc<dyn TranscodeJobs>, config: &TranscoderConfig) -> Self {
        Self {
            jobs,
            source_extension: config.source_extension.clone(),
            output_extension: config.output_extension.clone(),
        }
    }

    /// Requests for the keys that carry the source extension.
    ///
    /// Other keys, including the transcoder's own outputs, are skipped.
    pub fn plan(&self, keys: Vec<String>) -> Vec<TranscodeRequest> {
        keys.into_iter()
            .filter_map(|key| {
                if !has_extension(&key, &self.source_extension) {
                    debug!(key = %key, "Skipping object without source extension");
                    counter!("transcoder.objects.skipped").increment(1);
                    return None;
                }
                let output_key = derive_output_key(&key, &self.output_extension);
                Some(TranscodeRequest {
                    input_key: key,
                    output_key,
                })
            })
            .collect()
    }

    /// Submit each request on its own task without waiting for the result
    pub fn dispatch(&self, requests: Vec<TranscodeRequest>) -> Vec<JoinHandle<()>> {
        requests
            .into_iter()
            .map(|request| {
                let jobs = self.jobs.clone();
                tokio::spawn(async move {
                    match jobs.submit(&request).await {
                        Ok(job_id) => {
                            counter!("transcoder.jobs.submitted").increment(1);
                            info!(
                                job_id = %job_id,
                                input_key = %request.input_key,
                                output_key = %request.output_key,
                                "Transcode job submitted"
                            );
                        }
                        Err(e) => {
                            counter!("transcoder.jobs.failed").increment(1);
                            error!(
                                error = %e,
                                input_key = %request.input_key,
                                "Failed to submit transcode job"
                            );
                        }
                    }
                })
            })
            .collect()
    }
}
