//! One continuous capture attempt, from session creation to its outcome.
//!
//! ```text
//! MediaRecorder -> ChunkSource -> (queue) -> PartUploader -> CompletionAssembler
//!                      |                          |
//!                      +---- ProgressReporter ----+
//! ```
//!
//! The upload worker is a single task draining the chunk queue one item at a
//! time, so part N+1 is never uploaded while part N is pending.

use crate::assembler::CompletionAssembler;
use crate::backend::MultipartBackend;
use crate::chunk_source::{CaptureBackend, CaptureError, ChunkSource, SourceEvent};
use crate::config::{RecorderConfig, UploadConfig};
use crate::object_key::{content_type_for, object_key_for};
use crate::part_uploader::PartUploader;
use crate::progress::ProgressReporter;
use crate::upload_session::{UploadError, UploadSession};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Errors raised while starting or driving a recording
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,
}

/// Terminal result of a recording
#[derive(Debug)]
pub enum UploadOutcome {
    Completed {
        object_key: String,
        location: String,
        parts: usize,
    },
    Failed {
        object_key: String,
        /// Session that was aborted, if one had been created
        session_id: Option<String>,
        error: UploadError,
    },
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed { .. })
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            UploadOutcome::Completed { location, .. } => Some(location),
            UploadOutcome::Failed { .. } => None,
        }
    }

    pub fn object_key(&self) -> &str {
        match self {
            UploadOutcome::Completed { object_key, .. } => object_key,
            UploadOutcome::Failed { object_key, .. } => object_key,
        }
    }
}

/// Everything a recording needs from its environment
#[derive(Clone)]
pub struct RecorderContext {
    pub backend: Arc<dyn MultipartBackend>,
    pub capture: Arc<dyn CaptureBackend>,
    pub recorder: RecorderConfig,
    pub upload: UploadConfig,
    pub progress: ProgressReporter,
}

/// Public view of a running recording
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub id: Uuid,
    pub object_key: String,
    pub session_id: String,
    pub mime_type: String,
    pub started_at: DateTime<Utc>,
}

/// A live recording streaming to one multipart upload session
pub struct RecordingSession {
    info: RecordingInfo,
    source: Arc<Mutex<ChunkSource>>,
    worker: JoinHandle<UploadOutcome>,
}

impl RecordingSession {
    /// Open the recorder, create the upload session and start capturing.
    ///
    /// The recorder is opened before any upload is attempted, and capture
    /// only starts once the backend has assigned a session id.
    #[instrument(skip(ctx))]
    pub async fn start(
        ctx: &RecorderContext,
        started_at: DateTime<Utc>,
    ) -> Result<Self, RecordingError> {
        let mut source = ChunkSource::open(
            ctx.capture.as_ref(),
            &ctx.recorder.mime_candidates,
            ctx.recorder.min_part_size_bytes,
            ctx.progress.clone(),
        )?;

        let object_key = object_key_for(&ctx.recorder.key_prefix, started_at, &ctx.recorder.extension);
        let content_type = content_type_for(source.mime_type(), &ctx.recorder.extension);

        let mut session = UploadSession::begin(ctx.backend.clone(), &object_key, &content_type).await?;

        let events = match source.begin(ctx.recorder.chunk_interval()) {
            Ok(events) => events,
            Err(e) => {
                session.abort().await;
                return Err(e.into());
            }
        };

        let info = RecordingInfo {
            id: Uuid::new_v4(),
            object_key,
            session_id: session.session_id().to_string(),
            mime_type: source.mime_type().to_string(),
            started_at,
        };

        info!(
            recording_id = %info.id,
            object_key = %info.object_key,
            session_id = %info.session_id,
            "Recording started"
        );

        let source = Arc::new(Mutex::new(source));
        let uploader = PartUploader::from_config(&ctx.upload, ctx.progress.clone());
        let worker = tokio::spawn(drive_upload(session, events, uploader, source.clone()));

        Ok(Self {
            info,
            source,
            worker,
        })
    }

    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    /// Ask the chunk source to finalize. Already produced chunks are still uploaded.
    pub fn stop(&self) {
        self.source.lock().stop();
    }

    /// Whether the upload worker has already reached its outcome
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the recording's terminal outcome
    pub async fn finish(self) -> UploadOutcome {
        match self.worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    recording_id = %self.info.id,
                    session_id = %self.info.session_id,
                    error = %e,
                    "Upload worker terminated abnormally"
                );
                UploadOutcome::Failed {
                    object_key: self.info.object_key,
                    session_id: Some(self.info.session_id),
                    error: UploadError::Interrupted(e.to_string()),
                }
            }
        }
    }
}

/// Drain the chunk queue one part at a time, then finalize
async fn drive_upload(
    mut session: UploadSession,
    mut events: mpsc::UnboundedReceiver<SourceEvent>,
    mut uploader: PartUploader,
    source: Arc<Mutex<ChunkSource>>,
) -> UploadOutcome {
    let mut assembler = CompletionAssembler::new();

    let result = loop {
        match events.recv().await {
            Some(SourceEvent::Chunk(chunk)) => {
                assembler.chunk_submitted();
                match uploader.upload(&session, chunk).await {
                    Ok(ack) => assembler.record(ack),
                    Err(e) => {
                        // Chunks still queued are discarded with the receiver
                        source.lock().stop();
                        break Err(assembler.fail(&mut session, e).await);
                    }
                }
            }
            Some(SourceEvent::Ended) => {
                assembler.observe_end();
                break assembler.finalize(&mut session).await;
            }
            None => {
                // Forwarder gone without an end marker, the object may be truncated
                source.lock().stop();
                let error = UploadError::Interrupted(
                    "chunk stream closed before the end of the recording".to_string(),
                );
                break Err(assembler.fail(&mut session, error).await);
            }
        }
    };

    match result {
        Ok(location) => UploadOutcome::Completed {
            object_key: session.object_key().to_string(),
            location,
            parts: assembler.acks().len(),
        },
        Err(error) => UploadOutcome::Failed {
            object_key: session.object_key().to_string(),
            session_id: Some(session.session_id().to_string()),
            error,
        },
    }
}
