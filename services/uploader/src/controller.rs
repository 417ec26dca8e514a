use crate::progress::ProgressSnapshot;
use crate::recording::{RecorderContext, RecordingError, RecordingInfo, RecordingSession, UploadOutcome};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the current recording and drives its lifecycle.
///
/// State only changes through `start`, `stop` and `restart`; the lock is held
/// for the whole transition so two callers can never complete or abort the
/// same session concurrently. Readers go through `active`, which never waits
/// on a transition.
pub struct RecordingController {
    ctx: RecorderContext,
    current: Mutex<Option<RecordingSession>>,
    active: RwLock<Option<RecordingInfo>>,
    locations: RwLock<Vec<String>>,
    last_started: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl RecordingController {
    pub fn new(ctx: RecorderContext) -> Self {
        Self {
            ctx,
            current: Mutex::new(None),
            active: RwLock::new(None),
            locations: RwLock::new(Vec::new()),
            last_started: parking_lot::Mutex::new(None),
        }
    }

    /// Start a new recording
    pub async fn start(&self) -> Result<RecordingInfo, RecordingError> {
        let mut current = self.current.lock().await;
        self.reap(&mut current).await;

        if current.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let recording = RecordingSession::start(&self.ctx, self.next_start_time()).await?;
        let info = recording.info().clone();
        *self.active.write() = Some(info.clone());
        *current = Some(recording);
        Ok(info)
    }

    /// Stop the current recording and wait until its upload has finished
    pub async fn stop(&self) -> Result<UploadOutcome, RecordingError> {
        let mut current = self.current.lock().await;
        let recording = current.take().ok_or(RecordingError::NotRecording)?;
        self.active.write().take();
        recording.stop();
        Ok(self.settle(recording).await)
    }

    /// Stop the current recording and immediately start a new one
    pub async fn restart(&self) -> Result<(UploadOutcome, RecordingInfo), RecordingError> {
        let mut current = self.current.lock().await;
        let recording = current.take().ok_or(RecordingError::NotRecording)?;
        self.active.write().take();
        recording.stop();
        let outcome = self.settle(recording).await;

        let next = RecordingSession::start(&self.ctx, self.next_start_time()).await?;
        let info = next.info().clone();
        *self.active.write() = Some(info.clone());
        *current = Some(next);
        Ok((outcome, info))
    }

    /// Current recording, if one is running.
    ///
    /// A recording being stopped is no longer current, and this never waits
    /// for its drain.
    pub async fn current(&self) -> Option<RecordingInfo> {
        if let Ok(mut current) = self.current.try_lock() {
            self.reap(&mut current).await;
        }
        self.active.read().clone()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.ctx.progress.snapshot()
    }

    /// Locations of every recording completed so far
    pub fn locations(&self) -> Vec<String> {
        self.locations.read().clone()
    }

    /// Restart the recording on a fixed period until cancelled.
    ///
    /// Every cycle produces a separate object.
    pub async fn run_rotation(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "Recording rotation enabled");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.restart().await {
                        Ok((_, info)) => info!(object_key = %info.object_key, "Recording rotated"),
                        Err(RecordingError::NotRecording) => {}
                        Err(e) => error!(error = %e, "Failed to rotate recording"),
                    }
                }
            }
        }
    }

    // Object keys carry millisecond precision, so two recordings started
    // within the same millisecond are pushed apart
    fn next_start_time(&self) -> DateTime<Utc> {
        let mut last = self.last_started.lock();
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now.timestamp_millis() <= previous.timestamp_millis() {
                now = previous + chrono::Duration::milliseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    // A recording whose upload failed on its own is settled on next access
    async fn reap(&self, current: &mut Option<RecordingSession>) {
        if current.as_ref().is_some_and(|r| r.is_finished()) {
            if let Some(recording) = current.take() {
                self.active.write().take();
                self.settle(recording).await;
            }
        }
    }

    async fn settle(&self, recording: RecordingSession) -> UploadOutcome {
        let outcome = recording.finish().await;
        match &outcome {
            UploadOutcome::Completed {
                object_key,
                location,
                parts,
            } => {
                info!(
                    object_key = %object_key,
                    location = %location,
                    parts = parts,
                    "Uploaded successfully"
                );
                self.locations.write().push(location.clone());
            }
            UploadOutcome::Failed {
                object_key,
                session_id,
                error,
            } => {
                warn!(
                    object_key = %object_key,
                    session_id = ?session_id,
                    error = %error,
                    "Recording upload failed"
                );
            }
        }
        outcome
    }
}
