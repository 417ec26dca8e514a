use crate::backend::PartAck;
use crate::upload_session::{UploadError, UploadSession};
use tracing::{debug, error};

/// Assembler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Collecting,
    Finalizing,
    TerminatedOk,
    TerminatedError,
}

/// Collects part acknowledgments and finalizes the session once the chunk
/// stream has ended and every submitted part has been acknowledged.
#[derive(Debug)]
pub struct CompletionAssembler {
    state: AssemblerState,
    acks: Vec<PartAck>,
    submitted: usize,
    ended: bool,
}

impl Default for CompletionAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Collecting,
            acks: Vec::new(),
            submitted: 0,
            ended: false,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn acks(&self) -> &[PartAck] {
        &self.acks
    }

    /// A chunk was handed to the part uploader
    pub fn chunk_submitted(&mut self) {
        self.submitted += 1;
    }

    /// A submitted chunk was acknowledged
    pub fn record(&mut self, ack: PartAck) {
        debug!(part_number = ack.part_number, "Part acknowledged");
        self.acks.push(ack);
    }

    /// The chunk source emitted its terminal signal
    pub fn observe_end(&mut self) {
        self.ended = true;
    }

    /// Terminal signal seen and no upload outstanding
    pub fn is_ready(&self) -> bool {
        self.state == AssemblerState::Collecting && self.ended && self.acks.len() == self.submitted
    }

    /// Complete the session with acknowledgments sorted by part number.
    ///
    /// Any failure aborts the session before it is returned.
    pub async fn finalize(&mut self, session: &mut UploadSession) -> Result<String, UploadError> {
        match self.state {
            AssemblerState::Collecting => {}
            _ => return Err(UploadError::AlreadyFinalized),
        }

        if !self.is_ready() {
            // Completing now would race in-flight uploads
            let expected = self.acks.len() as u32 + 1;
            return Err(self
                .fail(
                    session,
                    UploadError::IncompleteUpload {
                        expected,
                        found: None,
                    },
                )
                .await);
        }

        if self.acks.is_empty() {
            return Err(self.fail(session, UploadError::NothingRecorded).await);
        }

        self.state = AssemblerState::Finalizing;
        self.acks.sort_by_key(|ack| ack.part_number);

        match session.complete(&self.acks).await {
            Ok(location) => {
                self.state = AssemblerState::TerminatedOk;
                Ok(location)
            }
            Err(e) => Err(self.fail(session, e).await),
        }
    }

    /// Terminate with `error`, aborting the session
    pub async fn fail(&mut self, session: &mut UploadSession, error: UploadError) -> UploadError {
        error!(
            session_id = %session.session_id(),
            object_key = %session.object_key(),
            error = %error,
            "Upload failed"
        );
        self.state = AssemblerState::TerminatedError;
        session.abort().await;
        error
    }
}
