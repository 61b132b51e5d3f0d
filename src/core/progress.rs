//! Progress counters and verbose reporting for sequential scans

use serde::{Deserialize, Serialize};

/// Running totals for one scan range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    /// Free blocks visited so far
    pub free_blocks_seen: u64,
    /// Free blocks classified as needing a write (or discard)
    pub blocks_modified: u64,
}

impl ProgressCounters {
    pub fn merge(&mut self, other: ProgressCounters) {
        self.free_blocks_seen += other.free_blocks_seen;
        self.blocks_modified += other.blocks_modified;
    }
}

/// Receiver for verbose progress updates
pub trait ProgressSink {
    /// Percentage of declared free blocks visited, throttled to changes in
    /// the first decimal place
    fn percent(&mut self, percent: f64);

    /// Called after every block classified as needing modification
    fn block_modified(&mut self, counters: &ProgressCounters, blocks_count: u64);
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn percent(&mut self, _percent: f64) {}

    fn block_modified(&mut self, _counters: &ProgressCounters, _blocks_count: u64) {}
}

/// Reports progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn percent(&mut self, percent: f64) {
        tracing::info!(target: "zerofree::progress", "{:4.1}%", percent);
    }

    fn block_modified(&mut self, counters: &ProgressCounters, blocks_count: u64) {
        tracing::debug!(
            target: "zerofree::progress",
            "{}/{}/{}",
            counters.blocks_modified,
            counters.free_blocks_seen,
            blocks_count
        );
    }
}

/// Throttles percentage updates to one per 0.1% step
#[derive(Debug, Clone)]
pub struct PercentThrottle {
    declared_free: u64,
    last_tenths: Option<u64>,
}

impl PercentThrottle {
    pub fn new(declared_free: u64) -> Self {
        PercentThrottle {
            declared_free,
            last_tenths: None,
        }
    }

    /// Percentage for `free_seen` blocks; a volume declaring no free
    /// blocks counts as complete
    pub fn percent(&self, free_seen: u64) -> f64 {
        if self.declared_free == 0 {
            return 100.0;
        }
        100.0 * free_seen as f64 / self.declared_free as f64
    }

    /// Return the percentage if it differs from the last one reported at
    /// one decimal place, so the starting 0.0% is not repeated for the
    /// first free block
    pub fn update(&mut self, free_seen: u64) -> Option<f64> {
        let percent = self.percent(free_seen);
        let tenths = (percent * 10.0) as u64;
        if self.last_tenths == Some(tenths) {
            return None;
        }
        self.last_tenths = Some(tenths);
        Some(percent)
    }
}
