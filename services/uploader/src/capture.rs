//! Capture backends built on byte streams.
//!
//! [`StreamRecorder`] turns any `AsyncRead` into timed recorder events.
//! [`CommandCapture`] runs an external capture program (for example ffmpeg
//! reading a camera) per encoding and records its stdout.

use crate::chunk_source::{CaptureBackend, CaptureError, MediaRecorder, RecorderEvent};
use crate::config::{CaptureCommand, CaptureConfig};
use bytes::BytesMut;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Recorder reading encoded media from an async byte stream
pub struct StreamRecorder<R> {
    reader: Option<R>,
    stop: CancellationToken,
    drain_to_eof: bool,
}

impl<R> StreamRecorder<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    /// Recorder that stops reading as soon as stop is requested
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            stop: CancellationToken::new(),
            drain_to_eof: false,
        }
    }

    /// Recorder that keeps reading after stop until the writer closes the stream
    pub fn draining(reader: R) -> Self {
        Self {
            drain_to_eof: true,
            ..Self::new(reader)
        }
    }
}

impl<R> MediaRecorder for StreamRecorder<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    fn start(
        &mut self,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        let reader = self.reader.take().ok_or(CaptureError::AlreadyStarted)?;
        tokio::spawn(read_stream(
            reader,
            timeslice,
            events,
            self.stop.clone(),
            self.drain_to_eof,
        ));
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.cancel();
    }
}

async fn read_stream<R>(
    mut reader: R,
    timeslice: Duration,
    events: mpsc::UnboundedSender<RecorderEvent>,
    stop: CancellationToken,
    drain_to_eof: bool,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_BYTES);
    let mut ticker = interval_at(Instant::now() + timeslice, timeslice);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => break,
                Ok(_) => {
                    if buffer.capacity() == buffer.len() {
                        buffer.reserve(READ_BUFFER_BYTES);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Capture stream read failed");
                    break;
                }
            },
            _ = ticker.tick() => {
                if !buffer.is_empty()
                    && events
                        .send(RecorderEvent::DataAvailable(buffer.split().freeze()))
                        .is_err()
                {
                    return;
                }
            }
            _ = stop.cancelled(), if !drain_to_eof => break,
        }
    }

    if !buffer.is_empty() {
        let _ = events.send(RecorderEvent::DataAvailable(buffer.split().freeze()));
    }
    let _ = events.send(RecorderEvent::Stopped);
}

/// Capture backend running one external command per encoding
pub struct CommandCapture {
    commands: Vec<CaptureCommand>,
    stop_grace: Duration,
}

impl CommandCapture {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            stop_grace: config.stop_grace(),
        }
    }

    fn command_for(&self, mime_type: &str) -> Option<&CaptureCommand> {
        self.commands.iter().find(|c| c.mime_type == mime_type)
    }
}

impl CaptureBackend for CommandCapture {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.command_for(mime_type)
            .map(|c| !c.program.is_empty())
            .unwrap_or(false)
    }

    fn create_recorder(&self, mime_type: &str) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        let command = self
            .command_for(mime_type)
            .ok_or_else(|| CaptureError::NoSupportedEncoding {
                tried: vec![mime_type.to_string()],
            })?;

        Ok(Box::new(CommandRecorder {
            command: command.clone(),
            stop_grace: self.stop_grace,
            stop: CancellationToken::new(),
            started: false,
        }))
    }
}

/// Recorder backed by a capture process writing media to stdout
struct CommandRecorder {
    command: CaptureCommand,
    stop_grace: Duration,
    stop: CancellationToken,
    started: bool,
}

impl MediaRecorder for CommandRecorder {
    fn start(
        &mut self,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        if self.started {
            return Err(CaptureError::AlreadyStarted);
        }

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Spawn {
                program: self.command.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| CaptureError::Spawn {
            program: self.command.program.clone(),
            message: "stdout not captured".to_string(),
        })?;

        info!(
            program = %self.command.program,
            mime_type = %self.command.mime_type,
            pid = child.id(),
            "Capture command started"
        );

        // Child::wait closes a stdin still held by the child
        let stdin = child.stdin.take();

        // The process ends the stream itself once told to stop
        let mut stream = StreamRecorder::draining(stdout);
        stream.start(timeslice, events)?;

        tokio::spawn(supervise(child, stdin, self.stop.clone(), self.stop_grace));
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.cancel();
    }
}

async fn supervise(
    mut child: Child,
    stdin: Option<ChildStdin>,
    stop: CancellationToken,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => info!(%status, "Capture command exited"),
                Err(e) => warn!(error = %e, "Failed to wait for capture command"),
            }
            return;
        }
        _ = stop.cancelled() => {}
    }

    // ffmpeg style graceful quit, then closing stdin
    if let Some(mut stdin) = stdin {
        let sent = match stdin.write_all(b"q").await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            debug!(error = %e, "Capture command stdin closed");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => info!(%status, "Capture command finalized"),
        Ok(Err(e)) => warn!(error = %e, "Failed to wait for capture command"),
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "Capture command did not exit, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill capture command");
            }
        }
    }
}
