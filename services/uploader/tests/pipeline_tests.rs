//! Recording pipeline tests against a scripted backend and recorder.

mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::{context, etag, BackendCall, FakeBackend, ScriptedCapture};
use livecast_uploader::config::{RetryConfig, UploadConfig};
use livecast_uploader::{
    CaptureError, PartAck, ProgressSnapshot, RecordingError, RecordingSession, UploadError,
    UploadOutcome,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

fn acks(count: u32) -> Vec<PartAck> {
    (1..=count)
        .map(|n| PartAck {
            part_number: n,
            integrity_tag: etag(n),
        })
        .collect()
}

#[tokio::test]
async fn test_three_chunks_are_finalized_in_order() {
    let backend = Arc::new(FakeBackend::new());
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[1000, 1000, 500]));
    let ctx = context(backend.clone(), capture);

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    assert_eq!(
        recording.info().object_key,
        "videofile20230101T000000000Z.webm"
    );
    assert_eq!(recording.info().mime_type, "video/webm");

    recording.stop();
    let outcome = recording.finish().await;

    match outcome {
        UploadOutcome::Completed {
            object_key,
            location,
            parts,
        } => {
            assert_eq!(object_key, "videofile20230101T000000000Z.webm");
            assert_eq!(
                location,
                "https://livecast-videos.s3.amazonaws.com/videofile20230101T000000000Z.webm"
            );
            assert_eq!(parts, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        backend.completions(),
        vec![("upload-1".to_string(), acks(3))]
    );
    assert!(backend.aborts().is_empty());
    assert_eq!(
        ctx.progress.snapshot(),
        ProgressSnapshot {
            bytes_produced: 2500,
            bytes_uploaded: 2500,
        }
    );
}

#[tokio::test]
async fn test_failed_part_aborts_and_skips_later_parts() {
    let backend = Arc::new(FakeBackend::new().failing_part(2, 1));
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[1000, 1000, 500]));
    let ctx = context(backend.clone(), capture);

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    let outcome = recording.finish().await;

    match outcome {
        UploadOutcome::Failed {
            session_id, error, ..
        } => {
            assert_eq!(session_id.as_deref(), Some("upload-1"));
            assert!(matches!(
                error,
                UploadError::PartUploadFailed { part_number: 2, .. }
            ));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(backend.started_parts(), vec![1, 2]);
    assert_eq!(backend.aborts(), vec!["upload-1".to_string()]);
    assert!(backend.completions().is_empty());
    assert_eq!(ctx.progress.bytes_uploaded(), 1000);

    // Abort is the final backend call
    assert!(matches!(
        backend.calls().last(),
        Some(BackendCall::Abort { .. })
    ));
}

#[tokio::test]
async fn test_stop_before_upload_drains_every_chunk() {
    let backend = Arc::new(FakeBackend::new().with_part_delay(Duration::from_millis(20)));
    let capture = Arc::new(
        ScriptedCapture::new(&["video/webm"])
            .emitting(&[300, 300, 300, 300])
            .flushing_on_stop(&[120]),
    );
    let ctx = context(backend.clone(), capture);

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    recording.stop();
    let outcome = recording.finish().await;

    assert!(outcome.is_completed());
    assert_eq!(backend.uploaded_parts(), vec![1, 2, 3, 4, 5]);
    assert_eq!(
        backend.completions(),
        vec![("upload-1".to_string(), acks(5))]
    );

    // Finalize only after the last acknowledgment
    let calls = backend.calls();
    let complete_at = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Complete { .. }))
        .unwrap();
    let last_end = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::UploadEnd { .. }))
        .unwrap();
    assert!(last_end < complete_at);
    assert_eq!(ctx.progress.bytes_uploaded(), 1320);
}

#[tokio::test]
async fn test_at_most_one_part_in_flight() {
    let backend = Arc::new(FakeBackend::new().with_part_delay(Duration::from_millis(5)));
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[64, 64, 64]));
    let ctx = context(backend.clone(), capture.clone());

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();

    // Keep producing while uploads are pending
    for _ in 0..3 {
        capture.emit(64);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    recording.stop();
    assert!(recording.finish().await.is_completed());

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);

    let calls = backend.calls();
    let mut last_end = None;
    let mut expected_part = 1;
    for call in &calls {
        match call {
            BackendCall::UploadStart { part_number, at, .. } => {
                assert_eq!(*part_number, expected_part);
                if let Some(end) = last_end {
                    assert!(*at >= end);
                }
            }
            BackendCall::UploadEnd { at, .. } => {
                last_end = Some(*at);
                expected_part += 1;
            }
            _ => {}
        }
    }
    assert_eq!(expected_part, 7);
}

#[tokio::test]
async fn test_progress_counters_are_monotonic() {
    let backend = Arc::new(FakeBackend::new().with_part_delay(Duration::from_millis(3)));
    let capture = Arc::new(
        ScriptedCapture::new(&["video/webm"]).emitting(&[100, 200, 300, 400, 500, 600]),
    );
    let ctx = context(backend.clone(), capture);
    let progress = ctx.progress.clone();

    let sampler = tokio::spawn(async move {
        let mut samples = Vec::new();
        for _ in 0..100 {
            samples.push(progress.snapshot());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        samples
    });

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    recording.stop();
    assert!(recording.finish().await.is_completed());

    let samples = sampler.await.unwrap();
    for pair in samples.windows(2) {
        assert!(pair[1].bytes_produced >= pair[0].bytes_produced);
        assert!(pair[1].bytes_uploaded >= pair[0].bytes_uploaded);
    }
    for sample in &samples {
        assert!(sample.bytes_uploaded <= sample.bytes_produced);
    }
    assert_eq!(ctx.progress.bytes_uploaded(), 2100);
}

#[tokio::test]
async fn test_backend_unavailable_starts_no_capture() {
    let backend = Arc::new(FakeBackend {
        fail_create: true,
        ..FakeBackend::default()
    });
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[1000]));
    let ctx = context(backend.clone(), capture.clone());

    let err = RecordingSession::start(&ctx, started_at()).await.err().unwrap();
    assert!(matches!(
        err,
        RecordingError::Upload(UploadError::BackendUnavailable(_))
    ));
    assert_eq!(capture.started(), 0);
    assert!(backend.started_parts().is_empty());
    assert!(backend.aborts().is_empty());
}

#[tokio::test]
async fn test_no_supported_encoding_never_touches_backend() {
    let backend = Arc::new(FakeBackend::new());
    let capture = Arc::new(ScriptedCapture::new(&["video/mp4"]));
    let ctx = context(backend.clone(), capture.clone());

    let err = RecordingSession::start(&ctx, started_at()).await.err().unwrap();
    match err {
        RecordingError::Capture(CaptureError::NoSupportedEncoding { tried }) => {
            assert_eq!(
                tried,
                vec![
                    "video/webm;codecs=vp9".to_string(),
                    "video/webm;codecs=vp8".to_string(),
                    "video/webm".to_string(),
                    String::new(),
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(backend.calls().is_empty());
    assert_eq!(capture.recorders_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_default_encoding_is_last_resort() {
    let backend = Arc::new(FakeBackend::new());
    let capture = Arc::new(ScriptedCapture::new(&[""]).emitting(&[10]));
    let ctx = context(backend.clone(), capture);

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    assert_eq!(recording.info().mime_type, "");
    recording.stop();
    assert!(recording.finish().await.is_completed());
}

#[tokio::test]
async fn test_retry_policy_recovers_transient_failures() {
    let backend = Arc::new(FakeBackend::new().failing_part(1, 2));
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[10, 20]));
    let mut ctx = context(backend.clone(), capture);
    ctx.upload = UploadConfig {
        part_timeout_secs: 5,
        retry: RetryConfig {
            max_retries: 2,
            initial_interval_ms: 1,
            max_interval_ms: 5,
        },
    };

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    recording.stop();
    assert!(recording.finish().await.is_completed());

    assert_eq!(backend.started_parts(), vec![1, 1, 1, 2]);
    assert_eq!(
        backend.completions(),
        vec![("upload-1".to_string(), acks(2))]
    );
    assert_eq!(ctx.progress.bytes_uploaded(), 30);
}

#[tokio::test]
async fn test_retries_exhausted_is_fatal() {
    let backend = Arc::new(FakeBackend::new().failing_part(1, 5));
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[10]));
    let mut ctx = context(backend.clone(), capture);
    ctx.upload.retry = RetryConfig {
        max_retries: 1,
        initial_interval_ms: 1,
        max_interval_ms: 5,
    };

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    let outcome = recording.finish().await;

    assert!(!outcome.is_completed());
    assert_eq!(backend.started_parts(), vec![1, 1]);
    assert_eq!(backend.aborts(), vec!["upload-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_part_timeout_aborts_session() {
    let backend = Arc::new(FakeBackend::new().with_part_delay(Duration::from_secs(30)));
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).emitting(&[10]));
    let mut ctx = context(backend.clone(), capture);
    ctx.upload.part_timeout_secs = 1;

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    let outcome = recording.finish().await;

    match outcome {
        UploadOutcome::Failed { error, .. } => assert!(matches!(
            error,
            UploadError::PartTimeout {
                part_number: 1,
                ..
            }
        )),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(backend.aborts(), vec!["upload-1".to_string()]);
}

#[tokio::test]
async fn test_empty_recording_is_aborted() {
    let backend = Arc::new(FakeBackend::new());
    let capture = Arc::new(ScriptedCapture::new(&["video/webm"]).flushing_on_stop(&[0]));
    let ctx = context(backend.clone(), capture);

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    recording.stop();
    let outcome = recording.finish().await;

    match outcome {
        UploadOutcome::Failed {
            session_id, error, ..
        } => {
            assert_eq!(session_id.as_deref(), Some("upload-1"));
            assert!(matches!(error, UploadError::NothingRecorded));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(backend.completions().is_empty());
    assert_eq!(backend.aborts(), vec!["upload-1".to_string()]);
}

#[tokio::test]
async fn test_coalesced_parts_respect_minimum_size() {
    let backend = Arc::new(FakeBackend::new());
    let capture = Arc::new(
        ScriptedCapture::new(&["video/webm"])
            .emitting(&[400, 400, 400, 400, 400])
            .flushing_on_stop(&[100]),
    );
    let mut ctx = context(backend.clone(), capture);
    ctx.recorder.min_part_size_bytes = 1000;

    let recording = RecordingSession::start(&ctx, started_at()).await.unwrap();
    recording.stop();
    assert!(recording.finish().await.is_completed());

    let sizes: Vec<usize> = backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::UploadStart { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![1200, 900]);
    assert_eq!(
        backend.completions(),
        vec![("upload-1".to_string(), acks(2))]
    );
}
