//! Livecast Uploader
//!
//! Streams a recording to S3 while it is still being captured. A capture
//! backend emits encoded media on a fixed interval; every chunk becomes one
//! part of a multipart upload, uploaded strictly in order with at most one
//! part in flight. Once capture stops and the queue has drained, the parts
//! are stitched into the final object, which in turn triggers the
//! transcoder service.
//!
//! ## Architecture
//!
//! ```text
//! Capture command          Upload worker                S3 Bucket
//! ┌──────────────┐        ┌──────────────┐            ┌──────────────┐
//! │ Media        │ chunks │ Part         │ UploadPart │ multipart    │
//! │ Recorder     │───────▶│ Uploader     │───────────▶│ session      │
//! └──────────────┘        └──────────────┘            └──────────────┘
//!        │                       │                           ▲
//!        ▼                       ▼                           │
//! ┌──────────────┐        ┌──────────────┐       Complete    │
//! │ Chunk        │        │ Completion   │───────────────────┘
//! │ Source       │        │ Assembler    │
//! └──────────────┘        └──────────────┘
//!        │                       │
//!        └──────▶ Progress ◀─────┘
//! ```

pub mod api;
pub mod assembler;
pub mod backend;
pub mod capture;
pub mod chunk_source;
pub mod config;
pub mod controller;
pub mod object_key;
pub mod part_uploader;
pub mod progress;
pub mod recording;
pub mod s3_backend;
pub mod upload_session;

pub use assembler::{AssemblerState, CompletionAssembler};
pub use backend::{BackendError, MultipartBackend, PartAck};
pub use capture::{CommandCapture, StreamRecorder};
pub use chunk_source::{
    CaptureBackend, CaptureError, Chunk, ChunkSource, MediaRecorder, RecorderEvent, SourceEvent,
};
pub use config::Config;
pub use controller::RecordingController;
pub use part_uploader::{PartUploader, RetryPolicy};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use recording::{RecorderContext, RecordingError, RecordingInfo, RecordingSession, UploadOutcome};
pub use s3_backend::S3Backend;
pub use upload_session::{SessionState, UploadError, UploadSession};
