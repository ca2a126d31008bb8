//! ProgressAggregator: aggregate byte counter and derived rates.

use std::time::Instant;

use crate::events::{DownloadEvent, DownloadId};

/// Aggregate bytes written for the whole session.
#[derive(Debug)]
pub(crate) struct ProgressAggregator {
    downloaded: u64,
    total: u64,
}

impl ProgressAggregator {
    pub(crate) fn new(total: u64) -> Self {
        Self { downloaded: 0, total }
    }

    pub(crate) fn record(&mut self, bytes: u64) {
        self.downloaded = (self.downloaded + bytes).min(self.total);
    }

    pub(crate) fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn event(&self, id: DownloadId) -> DownloadEvent {
        DownloadEvent::Progress {
            bytes: self.downloaded,
            total: self.total,
            id,
        }
    }
}

/// Snapshot of progress with rate and ETA, for front ends rendering `Progress` events.
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Seconds since the session started.
    pub elapsed_secs: f64,
}

impl ProgressStats {
    pub fn since(started: Instant, bytes_done: u64, total_bytes: u64) -> Self {
        Self {
            bytes_done,
            total_bytes,
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Average download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
