use crate::backend::{BackendError, MultipartBackend, PartAck};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors raised by the upload pipeline
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    #[error("Upload of part {part_number} failed: {cause}")]
    PartUploadFailed {
        part_number: u32,
        #[source]
        cause: BackendError,
    },

    #[error("Upload of part {part_number} timed out after {timeout:?}")]
    PartTimeout { part_number: u32, timeout: Duration },

    #[error("Incomplete upload: expected part {expected}, found {found:?}")]
    IncompleteUpload { expected: u32, found: Option<u32> },

    #[error("Upload session already finalized")]
    AlreadyFinalized,

    #[error("Failed to finalize upload: {0}")]
    Finalize(#[source] BackendError),

    #[error("Recording produced no data")]
    NothingRecorded,

    #[error("Upload pipeline interrupted: {0}")]
    Interrupted(String),
}

/// Lifecycle of a multipart upload identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Completed,
    Aborted,
}

/// One multipart upload identity, owned by a single recording
pub struct UploadSession {
    backend: Arc<dyn MultipartBackend>,
    object_key: String,
    session_id: String,
    state: SessionState,
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("object_key", &self.object_key)
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .finish()
    }
}

impl UploadSession {
    /// Create a new multipart upload for `object_key`.
    ///
    /// Every call creates an independent session on the backend.
    #[instrument(skip(backend))]
    pub async fn begin(
        backend: Arc<dyn MultipartBackend>,
        object_key: &str,
        content_type: &str,
    ) -> Result<Self, UploadError> {
        let session_id = backend
            .create_multipart_upload(object_key, content_type)
            .await
            .map_err(UploadError::BackendUnavailable)?;

        info!(
            object_key = %object_key,
            session_id = %session_id,
            "Upload session created"
        );

        Ok(Self {
            backend,
            object_key: object_key.to_string(),
            session_id,
            state: SessionState::Open,
        })
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn backend(&self) -> &dyn MultipartBackend {
        self.backend.as_ref()
    }

    /// Finalize the upload with parts ordered by part number
    #[instrument(skip(self, parts), fields(object_key = %self.object_key, session_id = %self.session_id, parts = parts.len()))]
    pub async fn complete(&mut self, parts: &[PartAck]) -> Result<String, UploadError> {
        if self.state != SessionState::Open {
            return Err(UploadError::AlreadyFinalized);
        }

        validate_part_sequence(parts)?;

        let location = self
            .backend
            .complete_multipart_upload(&self.object_key, &self.session_id, parts)
            .await
            .map_err(UploadError::Finalize)?;

        self.state = SessionState::Completed;
        metrics::counter!("uploader.sessions.completed").increment(1);

        info!(location = %location, "Upload session completed");
        Ok(location)
    }

    /// Best-effort discard of the pending upload; failures are only logged
    #[instrument(skip(self), fields(object_key = %self.object_key, session_id = %self.session_id))]
    pub async fn abort(&mut self) {
        if self.state != SessionState::Open {
            debug!(state = ?self.state, "Session not open, skipping abort");
            return;
        }

        self.state = SessionState::Aborted;
        metrics::counter!("uploader.sessions.aborted").increment(1);

        match self
            .backend
            .abort_multipart_upload(&self.object_key, &self.session_id)
            .await
        {
            Ok(()) => info!("Multipart upload aborted"),
            Err(e) => warn!(error = %e, "Failed to abort multipart upload"),
        }
    }
}

/// Parts must be numbered exactly 1..=N in ascending order
fn validate_part_sequence(parts: &[PartAck]) -> Result<(), UploadError> {
    if parts.is_empty() {
        return Err(UploadError::IncompleteUpload {
            expected: 1,
            found: None,
        });
    }

    for (index, ack) in parts.iter().enumerate() {
        let expected = index as u32 + 1;
        if ack.part_number != expected {
            return Err(UploadError::IncompleteUpload {
                expected,
                found: Some(ack.part_number),
            });
        }
    }

    Ok(())
}
