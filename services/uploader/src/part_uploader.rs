use crate::backend::{BackendError, PartAck};
use crate::chunk_source::Chunk;
use crate::config::UploadConfig;
use crate::progress::ProgressReporter;
use crate::upload_session::{UploadError, UploadSession};
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Bounded exponential backoff for failed part uploads.
///
/// `max_retries = 0` means a failed part is fatal on the first error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Uploads chunks as numbered parts, one at a time.
///
/// `upload` takes `&mut self`, so a single uploader can never have two parts
/// in flight; the pipeline only pulls the next chunk after the previous
/// upload has settled.
pub struct PartUploader {
    retry: RetryPolicy,
    part_timeout: Option<Duration>,
    progress: ProgressReporter,
}

impl PartUploader {
    pub fn new(retry: RetryPolicy, part_timeout: Option<Duration>, progress: ProgressReporter) -> Self {
        Self {
            retry,
            part_timeout,
            progress,
        }
    }

    pub fn from_config(config: &UploadConfig, progress: ProgressReporter) -> Self {
        let retry = RetryPolicy {
            max_retries: config.retry.max_retries,
            initial_interval: Duration::from_millis(config.retry.initial_interval_ms),
            max_interval: Duration::from_millis(config.retry.max_interval_ms),
        };
        Self::new(retry, config.part_timeout(), progress)
    }

    /// Upload one chunk and return its acknowledgment
    #[instrument(skip(self, session, chunk), fields(session_id = %session.session_id(), part_number = chunk.sequence, size_bytes = chunk.len()))]
    pub async fn upload(
        &mut self,
        session: &UploadSession,
        chunk: Chunk,
    ) -> Result<PartAck, UploadError> {
        let mut backoff = self.retry.backoff();
        let mut attempt = 0u32;

        loop {
            let started = Instant::now();

            match self.attempt(session, &chunk).await {
                Ok(integrity_tag) => {
                    metrics::histogram!("uploader.part.duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    metrics::counter!("uploader.parts.uploaded").increment(1);
                    self.progress.record_uploaded(chunk.len() as u64);

                    debug!(attempt = attempt, "Part uploaded");
                    return Ok(PartAck {
                        part_number: chunk.sequence,
                        integrity_tag,
                    });
                }
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.retry.max_interval);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Part upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::counter!("uploader.parts.failed").increment(1);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, session: &UploadSession, chunk: &Chunk) -> Result<String, UploadError> {
        let call = session.backend().upload_part(
            session.object_key(),
            session.session_id(),
            chunk.sequence,
            chunk.data.clone(),
        );

        let result: Result<String, BackendError> = match self.part_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(UploadError::PartTimeout {
                        part_number: chunk.sequence,
                        timeout,
                    })
                }
            },
            None => call.await,
        };

        result.map_err(|cause| UploadError::PartUploadFailed {
            part_number: chunk.sequence,
            cause,
        })
    }
}
