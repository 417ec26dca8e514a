//! Turns a live recorder into an ordered stream of numbered chunks.
//!
//! A [`MediaRecorder`] reports raw data events and a terminal stop event on
//! an unbounded channel. [`ChunkSource`] numbers the data, optionally
//! coalesces it up to a minimum part size, and forwards [`SourceEvent`]s to
//! the upload pipeline. [`SourceEvent::Ended`] is always the last event and
//! only follows the final flush.

use crate::progress::ProgressReporter;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors raised by the capture side of the pipeline
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No supported capture encoding (tried {tried:?})")]
    NoSupportedEncoding { tried: Vec<String> },

    #[error("Failed to start capture command {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recorder already started")]
    AlreadyStarted,
}

/// Raw event emitted by a recorder
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// Encoded media captured since the previous event
    DataAvailable(Bytes),
    /// Capture finished and every buffered byte has been delivered
    Stopped,
}

/// Capture device able to record in a given encoding
pub trait CaptureBackend: Send + Sync {
    /// Whether `mime_type` can be recorded; the empty string is the backend default
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Create a recorder producing `mime_type`
    fn create_recorder(&self, mime_type: &str) -> Result<Box<dyn MediaRecorder>, CaptureError>;
}

/// A recorder attached to a capture device
pub trait MediaRecorder: Send {
    /// Start capturing, delivering data roughly every `timeslice`
    fn start(
        &mut self,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError>;

    /// Ask the recorder to finalize. Remaining data is still delivered before
    /// [`RecorderEvent::Stopped`].
    fn stop(&mut self);
}

/// A numbered slice of the recording
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 1-based sequence index, used as the part number
    pub sequence: u32,
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Event consumed by the upload pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Chunk(Chunk),
    Ended,
}

/// Cuts recorder data into numbered chunks
#[derive(Debug)]
struct ChunkCutter {
    min_part_size: usize,
    pending: BytesMut,
    next_sequence: u32,
}

impl ChunkCutter {
    fn new(min_part_size: usize) -> Self {
        Self {
            min_part_size,
            pending: BytesMut::new(),
            next_sequence: 1,
        }
    }

    fn push(&mut self, data: Bytes) -> Option<Chunk> {
        if data.is_empty() {
            return None;
        }

        if self.pending.is_empty() && data.len() >= self.min_part_size {
            return Some(self.cut(data));
        }

        self.pending.extend_from_slice(&data);
        if self.pending.len() >= self.min_part_size {
            let data = self.pending.split().freeze();
            return Some(self.cut(data));
        }

        None
    }

    fn flush(&mut self) -> Option<Chunk> {
        if self.pending.is_empty() {
            return None;
        }
        let data = self.pending.split().freeze();
        Some(self.cut(data))
    }

    fn cut(&mut self, data: Bytes) -> Chunk {
        let chunk = Chunk {
            sequence: self.next_sequence,
            data,
        };
        self.next_sequence += 1;
        chunk
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Idle,
    Running,
    Stopping,
}

/// Live, ordered chunk producer for one recording
pub struct ChunkSource {
    recorder: Box<dyn MediaRecorder>,
    mime_type: String,
    min_part_size: usize,
    progress: ProgressReporter,
    state: SourceState,
}

impl ChunkSource {
    /// Open a recorder, degrading through `candidates` in order
    pub fn open(
        backend: &dyn CaptureBackend,
        candidates: &[String],
        min_part_size: usize,
        progress: ProgressReporter,
    ) -> Result<Self, CaptureError> {
        let mut tried = Vec::new();

        for candidate in candidates {
            tried.push(candidate.clone());

            if !backend.is_type_supported(candidate) {
                debug!(mime_type = %candidate, "Capture encoding not supported");
                continue;
            }

            match backend.create_recorder(candidate) {
                Ok(recorder) => {
                    info!(mime_type = %candidate, "Capture recorder created");
                    return Ok(Self {
                        recorder,
                        mime_type: candidate.clone(),
                        min_part_size,
                        progress,
                        state: SourceState::Idle,
                    });
                }
                Err(e) => {
                    warn!(mime_type = %candidate, error = %e, "Failed to create recorder");
                }
            }
        }

        Err(CaptureError::NoSupportedEncoding { tried })
    }

    /// Encoding the recorder was created with
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Start periodic emission and return the ordered event stream
    pub fn begin(
        &mut self,
        interval: Duration,
    ) -> Result<mpsc::UnboundedReceiver<SourceEvent>, CaptureError> {
        if self.state != SourceState::Idle {
            return Err(CaptureError::AlreadyStarted);
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();

        self.recorder.start(interval, raw_tx)?;
        self.state = SourceState::Running;

        tokio::spawn(forward_events(
            raw_rx,
            tx,
            ChunkCutter::new(self.min_part_size),
            self.progress.clone(),
        ));

        Ok(rx)
    }

    /// Request the recorder to finalize; buffered data is still emitted
    pub fn stop(&mut self) {
        if self.state == SourceState::Running {
            debug!("Stopping chunk source");
            self.state = SourceState::Stopping;
            self.recorder.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SourceState::Running
    }
}

async fn forward_events(
    mut raw: mpsc::UnboundedReceiver<RecorderEvent>,
    events: mpsc::UnboundedSender<SourceEvent>,
    mut cutter: ChunkCutter,
    progress: ProgressReporter,
) {
    // A recorder dropping its sender counts as stopped
    while let Some(event) = raw.recv().await {
        match event {
            RecorderEvent::DataAvailable(data) => {
                progress.record_produced(data.len() as u64);
                if let Some(chunk) = cutter.push(data) {
                    if events.send(SourceEvent::Chunk(chunk)).is_err() {
                        debug!("Chunk consumer gone, discarding remaining capture data");
                        return;
                    }
                }
            }
            RecorderEvent::Stopped => break,
        }
    }

    if let Some(chunk) = cutter.flush() {
        if events.send(SourceEvent::Chunk(chunk)).is_err() {
            return;
        }
    }
    let _ = events.send(SourceEvent::Ended);
}
