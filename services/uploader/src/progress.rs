use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of the progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub bytes_produced: u64,
    pub bytes_uploaded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    uploaded: AtomicU64,
}

/// Observer of recorded and acknowledged bytes.
///
/// Cloning shares the same counters. Both counters only grow, and a byte
/// is always counted as produced before it can be counted as uploaded.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    counters: Arc<Counters>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes handed over by the capture backend
    pub fn record_produced(&self, bytes: u64) {
        self.counters.produced.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Record bytes acknowledged by the storage backend
    pub fn record_uploaded(&self, bytes: u64) {
        self.counters.uploaded.fetch_add(bytes, Ordering::SeqCst);
        metrics::counter!("uploader.bytes.uploaded").increment(bytes);
    }

    pub fn bytes_produced(&self) -> u64 {
        self.counters.produced.load(Ordering::SeqCst)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.counters.uploaded.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        // Uploaded is read first so the pair never shows uploaded > produced
        let bytes_uploaded = self.bytes_uploaded();
        let bytes_produced = self.bytes_produced();
        ProgressSnapshot {
            bytes_produced,
            bytes_uploaded,
        }
    }
}
