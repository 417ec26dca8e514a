#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use livecast_uploader::config::{RecorderConfig, UploadConfig};
use livecast_uploader::{
    BackendError, CaptureBackend, CaptureError, MediaRecorder, MultipartBackend, PartAck,
    ProgressReporter, RecorderContext, RecorderEvent,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Call observed by the fake backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { key: String },
    UploadStart { session_id: String, part_number: u32, size: usize, at: Instant },
    UploadEnd { session_id: String, part_number: u32, at: Instant },
    Complete { session_id: String, parts: Vec<PartAck> },
    Abort { session_id: String },
    Put { key: String, size: usize },
}

/// Scripted in-memory multipart backend
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    pub fail_create: bool,
    /// Part numbers whose uploads fail, with a count of failing attempts
    pub failing_parts: Mutex<Vec<(u32, usize)>>,
    pub part_delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub sessions: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    pub fn failing_part(self, part_number: u32, attempts: usize) -> Self {
        self.failing_parts.lock().push((part_number, attempts));
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn uploaded_parts(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::UploadEnd { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn started_parts(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::UploadStart { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(String, Vec<PartAck>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Complete { session_id, parts } => Some((session_id, parts)),
                _ => None,
            })
            .collect()
    }

    pub fn aborts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Abort { session_id } => Some(session_id),
                _ => None,
            })
            .collect()
    }

    /// Objects stored through `put_object`, as (key, size)
    pub fn puts(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Put { key, size } => Some((key, size)),
                _ => None,
            })
            .collect()
    }

    fn should_fail(&self, part_number: u32) -> bool {
        let mut failing = self.failing_parts.lock();
        match failing.iter_mut().find(|(n, _)| *n == part_number) {
            Some((_, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

pub fn etag(part_number: u32) -> String {
    format!("\"etag-{part_number}\"")
}

#[async_trait]
impl MultipartBackend for FakeBackend {
    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        self.calls.lock().push(BackendCall::Create {
            key: key.to_string(),
        });
        if self.fail_create {
            return Err(BackendError::new("CreateMultipartUpload", "service unavailable"));
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("upload-{n}"))
    }

    async fn upload_part(
        &self,
        _key: &str,
        session_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(BackendCall::UploadStart {
            session_id: session_id.to_string(),
            part_number,
            size: body.len(),
            at: Instant::now(),
        });

        if !self.part_delay.is_zero() {
            tokio::time::sleep(self.part_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(part_number) {
            return Err(BackendError::new("UploadPart", "connection reset"));
        }

        self.calls.lock().push(BackendCall::UploadEnd {
            session_id: session_id.to_string(),
            part_number,
            at: Instant::now(),
        });
        Ok(etag(part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        session_id: &str,
        parts: &[PartAck],
    ) -> Result<String, BackendError> {
        self.calls.lock().push(BackendCall::Complete {
            session_id: session_id.to_string(),
            parts: parts.to_vec(),
        });
        Ok(format!("https://livecast-videos.s3.amazonaws.com/{key}"))
    }

    async fn abort_multipart_upload(
        &self,
        _key: &str,
        session_id: &str,
    ) -> Result<(), BackendError> {
        self.calls.lock().push(BackendCall::Abort {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        self.calls.lock().push(BackendCall::Put {
            key: key.to_string(),
            size: body.len(),
        });
        Ok(format!("s3://livecast-videos/{key}"))
    }
}

/// Capture backend whose recorder replays scripted data events
pub struct ScriptedCapture {
    supported: HashSet<String>,
    /// Data emitted right after start
    pub on_start: Vec<usize>,
    /// Data emitted when stop is requested, before the stop event
    pub on_stop: Vec<usize>,
    pub recorders_created: AtomicUsize,
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<RecorderEvent>>>>,
}

impl ScriptedCapture {
    pub fn new(supported: &[&str]) -> Self {
        Self {
            supported: supported.iter().map(|s| s.to_string()).collect(),
            on_start: Vec::new(),
            on_stop: Vec::new(),
            recorders_created: AtomicUsize::new(0),
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn emitting(mut self, sizes: &[usize]) -> Self {
        self.on_start = sizes.to_vec();
        self
    }

    pub fn flushing_on_stop(mut self, sizes: &[usize]) -> Self {
        self.on_stop = sizes.to_vec();
        self
    }

    /// Number of recorders that were started
    pub fn started(&self) -> usize {
        self.senders.lock().len()
    }

    /// Emit extra data on the most recently started recorder
    pub fn emit(&self, size: usize) {
        if let Some(sender) = self.senders.lock().last() {
            let _ = sender.send(RecorderEvent::DataAvailable(payload(size)));
        }
    }
}

pub fn payload(size: usize) -> Bytes {
    Bytes::from(vec![0x1a; size])
}

struct ScriptedRecorder {
    on_start: Vec<usize>,
    on_stop: Vec<usize>,
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<RecorderEvent>>>>,
    sender: Option<mpsc::UnboundedSender<RecorderEvent>>,
}

impl CaptureBackend for ScriptedCapture {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.contains(mime_type)
    }

    fn create_recorder(&self, _mime_type: &str) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        self.recorders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRecorder {
            on_start: self.on_start.clone(),
            on_stop: self.on_stop.clone(),
            senders: self.senders.clone(),
            sender: None,
        }))
    }
}

impl MediaRecorder for ScriptedRecorder {
    fn start(
        &mut self,
        _timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        for size in &self.on_start {
            let _ = events.send(RecorderEvent::DataAvailable(payload(*size)));
        }
        self.senders.lock().push(events.clone());
        self.sender = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            for size in &self.on_stop {
                let _ = sender.send(RecorderEvent::DataAvailable(payload(*size)));
            }
            let _ = sender.send(RecorderEvent::Stopped);
        }
    }
}

pub fn recorder_config() -> RecorderConfig {
    RecorderConfig {
        chunk_interval_ms: 10,
        min_part_size_bytes: 0,
        ..RecorderConfig::default()
    }
}

pub fn upload_config() -> UploadConfig {
    UploadConfig {
        part_timeout_secs: 5,
        ..UploadConfig::default()
    }
}

pub fn context(backend: Arc<FakeBackend>, capture: Arc<ScriptedCapture>) -> RecorderContext {
    RecorderContext {
        backend,
        capture,
        recorder: recorder_config(),
        upload: upload_config(),
        progress: ProgressReporter::new(),
    }
}
