//! Health monitoring and metrics for a stream

use std::sync::atomic::{AtomicU64, Ordering};

/// Health metrics for a stream
///
/// Written by the executor thread, readable from anywhere.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Number of ticks executed
    pub ticks: AtomicU64,

    /// Number of ticks that ended on a retry signal
    pub retries: AtomicU64,

    /// Number of non-retry stage errors
    pub stage_failures: AtomicU64,

    /// Number of packets handed to the consumer
    pub frames_processed: AtomicU64,

    /// Total payload bytes handed to the consumer
    pub bytes_processed: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            stage_failures: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_failure(&self) {
        self.stage_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet delivered by the consumer stage
    pub fn record_frame(&self, size: usize) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn stage_failures(&self) -> u64 {
        self.stage_failures.load(Ordering::Relaxed)
    }

    /// Get the number of frames processed
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Get the total bytes processed
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Share of ticks that produced nothing, as a percentage
    pub fn retry_rate(&self) -> f64 {
        let ticks = self.ticks();
        if ticks == 0 {
            return 0.0;
        }
        (self.retries() as f64 / ticks as f64) * 100.0
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            ticks: self.ticks(),
            retries: self.retries(),
            stage_failures: self.stage_failures(),
            frames_processed: self.frames_processed(),
            bytes_processed: self.bytes_processed(),
            retry_rate: self.retry_rate(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub ticks: u64,
    pub retries: u64,
    pub stage_failures: u64,
    pub frames_processed: u64,
    pub bytes_processed: u64,
    pub retry_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} frames, {} bytes, {} ticks ({} retries, {:.2}%), {} stage failures",
            self.frames_processed,
            self.bytes_processed,
            self.ticks,
            self.retries,
            self.retry_rate,
            self.stage_failures
        )
    }
}
