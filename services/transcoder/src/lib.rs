//! Livecast transcoder
//!
//! Listens for object-created notifications on finalized recordings and
//! submits one Elastic Transcoder job per recording. Submission is detached
//! from the notification: the HTTP response does not wait for the job.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod jobs;
pub mod output_key;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use events::{decode_object_key, EventError, S3Notification};
pub use jobs::{ElasticTranscoderJobs, JobError, TranscodeJobs, TranscodeRequest};
pub use output_key::derive_output_key;
