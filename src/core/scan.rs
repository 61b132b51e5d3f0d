//! Sequential scanner
//!
//! Walks a block range in ascending order. Allocated blocks are skipped
//! without any I/O; free blocks are read (except in discard mode),
//! classified and then written, discarded or left alone.

use crate::classify::{apply, classify, BlockClass};
use crate::config::ScanConfig;
use crate::error::{BlockOp, Result, ZerofreeError};
use crate::progress::{PercentThrottle, ProgressCounters, ProgressSink};
use crate::volume::Volume;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

/// Which scanner produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    Sequential,
    Partitioned,
}

/// Result of a successful scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub mode: ScanMode,
    /// Number of ranges scanned (1 for sequential, partitions + residual
    /// otherwise)
    pub ranges: usize,
    /// Free blocks visited
    pub free_blocks_seen: u64,
    /// Free blocks that needed a write or discard (performed unless dry run)
    pub blocks_modified: u64,
    pub dry_run: bool,
    pub discard: bool,
}

impl ScanSummary {
    pub(crate) fn new(mode: ScanMode, ranges: usize, counters: ProgressCounters, config: &ScanConfig) -> Self {
        ScanSummary {
            mode,
            ranges,
            free_blocks_seen: counters.free_blocks_seen,
            blocks_modified: counters.blocks_modified,
            dry_run: config.dry_run,
            discard: config.discard,
        }
    }
}

/// Percentage reporting state, present only for verbose scans
pub(crate) struct Reporter<'a> {
    sink: &'a mut dyn ProgressSink,
    throttle: PercentThrottle,
    blocks_count: u64,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, declared_free: u64, blocks_count: u64) -> Self {
        let mut reporter = Reporter {
            sink,
            throttle: PercentThrottle::new(declared_free),
            blocks_count,
        };
        reporter.free_block_seen(0);
        reporter
    }

    fn free_block_seen(&mut self, free_seen: u64) {
        if let Some(percent) = self.throttle.update(free_seen) {
            self.sink.percent(percent);
        }
    }

    fn block_modified(&mut self, counters: &ProgressCounters) {
        self.sink.block_modified(counters, self.blocks_count);
    }
}

/// Scan one range with a caller-owned scratch buffer
///
/// Stops at the first I/O error; the counters returned alongside the
/// result cover the blocks processed before it.
pub fn scan_range<V: Volume + ?Sized>(
    volume: &V,
    range: Range<u64>,
    config: &ScanConfig,
    fill_buf: &[u8],
    scratch: &mut [u8],
) -> (Result<()>, ProgressCounters) {
    scan_range_reporting(volume, range, config, fill_buf, scratch, None)
}

pub(crate) fn scan_range_reporting<V: Volume + ?Sized>(
    volume: &V,
    range: Range<u64>,
    config: &ScanConfig,
    fill_buf: &[u8],
    scratch: &mut [u8],
    mut reporter: Option<&mut Reporter<'_>>,
) -> (Result<()>, ProgressCounters) {
    let mut counters = ProgressCounters::default();

    for block in range {
        if volume.is_allocated(block) {
            continue;
        }

        counters.free_blocks_seen += 1;
        if let Some(r) = reporter.as_deref_mut() {
            r.free_block_seen(counters.free_blocks_seen);
        }

        let contents = if config.discard {
            None
        } else if let Err(e) = volume.read_block(block, scratch) {
            return (Err(ZerofreeError::block_io(BlockOp::Read, block, e)), counters);
        } else {
            Some(&*scratch)
        };

        let class = classify(contents, config);
        if class == BlockClass::Unchanged {
            continue;
        }

        counters.blocks_modified += 1;
        if let Err(e) = apply(volume, block, class, config, fill_buf) {
            return (Err(e), counters);
        }

        if let Some(r) = reporter.as_deref_mut() {
            r.block_modified(&counters);
        }
    }

    (Ok(()), counters)
}

/// Scan the whole data range on the calling thread
///
/// Any I/O error ends the run and is returned to the caller.
pub fn scan_sequential<V: Volume + ?Sized>(
    volume: &V,
    config: &ScanConfig,
    progress: &mut dyn ProgressSink,
) -> Result<ScanSummary> {
    let range = volume.data_range();
    info!(
        "Sequential scan of blocks {}..{} (block size {})",
        range.start,
        range.end,
        volume.block_size()
    );

    let fill_buf = config.fill_buffer(volume.block_size());
    let mut scratch = vec![0u8; volume.block_size()];

    let mut reporter = config
        .verbose
        .then(|| Reporter::new(progress, volume.free_blocks_count(), volume.blocks_count()));

    let (result, counters) =
        scan_range_reporting(volume, range, config, &fill_buf, &mut scratch, reporter.as_mut());
    result?;

    debug!(
        "Sequential scan finished: {} free, {} modified",
        counters.free_blocks_seen, counters.blocks_modified
    );
    Ok(ScanSummary::new(ScanMode::Sequential, 1, counters, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ChannelCall, MemoryVolume};
    use crate::progress::NoProgress;

    #[derive(Default)]
    struct Recorder {
        percents: Vec<f64>,
        modified: Vec<(u64, u64, u64)>,
    }

    impl ProgressSink for Recorder {
        fn percent(&mut self, percent: f64) {
            self.percents.push(percent);
        }

        fn block_modified(&mut self, counters: &ProgressCounters, blocks_count: u64) {
            self.modified
                .push((counters.blocks_modified, counters.free_blocks_seen, blocks_count));
        }
    }

    fn dirty_volume() -> MemoryVolume {
        let volume = MemoryVolume::new(64, 1, 10).with_free_blocks(&[2, 4, 6, 8]);
        volume.fill_all(0xee);
        volume
    }

    #[test]
    fn test_visits_only_free_blocks_in_order() {
        let volume = dirty_volume();
        let config = ScanConfig::default();

        let summary = scan_sequential(&volume, &config, &mut NoProgress).unwrap();

        assert_eq!(summary.free_blocks_seen, 4);
        assert_eq!(summary.blocks_modified, 4);
        assert_eq!(
            volume.calls(),
            vec![
                ChannelCall::Read(2),
                ChannelCall::Write(2),
                ChannelCall::Read(4),
                ChannelCall::Write(4),
                ChannelCall::Read(6),
                ChannelCall::Write(6),
                ChannelCall::Read(8),
                ChannelCall::Write(8),
            ]
        );
        for block in [2, 4, 6, 8] {
            assert!(volume.block_data(block).iter().all(|&b| b == 0));
        }
        // Allocated blocks keep their contents
        assert!(volume.block_data(3).iter().all(|&b| b == 0xee));
    }

    #[test]
    fn test_already_filled_block_not_written() {
        let volume = MemoryVolume::new(64, 0, 4).with_free_blocks(&[1]);
        volume.fill_block(1, 0x41);
        let config = ScanConfig::builder().fill(0x41).build().unwrap();

        let summary = scan_sequential(&volume, &config, &mut NoProgress).unwrap();

        assert_eq!(summary.blocks_modified, 0);
        assert_eq!(volume.calls(), vec![ChannelCall::Read(1)]);
    }

    #[test]
    fn test_second_pass_is_clean() {
        let volume = dirty_volume();
        let config = ScanConfig::builder().fill(0x33).build().unwrap();

        scan_sequential(&volume, &config, &mut NoProgress).unwrap();
        volume.reset_calls();
        let second = scan_sequential(&volume, &config, &mut NoProgress).unwrap();

        assert_eq!(second.blocks_modified, 0);
        assert!(volume.blocks_where(|c| matches!(c, ChannelCall::Write(_))).is_empty());
    }

    #[test]
    fn test_dry_run_counts_but_never_writes() {
        let volume = dirty_volume();
        let config = ScanConfig::builder().dry_run(true).build().unwrap();

        let summary = scan_sequential(&volume, &config, &mut NoProgress).unwrap();

        assert_eq!(summary.blocks_modified, 4);
        assert!(volume
            .calls()
            .iter()
            .all(|c| matches!(c, ChannelCall::Read(_))));
    }

    #[test]
    fn test_discard_mode_never_reads() {
        let volume = dirty_volume();
        let config = ScanConfig::builder().discard(true).build().unwrap();

        scan_sequential(&volume, &config, &mut NoProgress).unwrap();

        assert_eq!(
            volume.calls(),
            vec![
                ChannelCall::Discard(2),
                ChannelCall::Discard(4),
                ChannelCall::Discard(6),
                ChannelCall::Discard(8),
            ]
        );
    }

    #[test]
    fn test_read_error_is_fatal() {
        let volume = dirty_volume();
        volume.fail_at(4);
        let config = ScanConfig::default();

        let err = scan_sequential(&volume, &config, &mut NoProgress).unwrap_err();

        assert!(matches!(err, ZerofreeError::BlockIo { op: BlockOp::Read, block: 4, .. }));
        // Nothing after the failing block was touched
        assert!(volume.calls().iter().all(|c| c.block() <= 4));
    }

    #[test]
    fn test_scan_range_reports_partial_counters() {
        let volume = dirty_volume();
        volume.fail_at(6);
        let config = ScanConfig::default();
        let fill = config.fill_buffer(64);
        let mut scratch = vec![0u8; 64];

        let (result, counters) = scan_range(&volume, 1..10, &config, &fill, &mut scratch);

        assert!(result.is_err());
        assert_eq!(counters.free_blocks_seen, 3);
        assert_eq!(counters.blocks_modified, 2);
    }

    #[test]
    fn test_verbose_progress() {
        let volume = dirty_volume();
        let config = ScanConfig::builder().verbose(true).build().unwrap();
        let mut recorder = Recorder::default();

        scan_sequential(&volume, &config, &mut recorder).unwrap();

        assert_eq!(recorder.percents, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(
            recorder.modified,
            vec![(1, 1, 10), (2, 2, 10), (3, 3, 10), (4, 4, 10)]
        );
    }

    #[test]
    fn test_progress_against_declared_free_count() {
        // Superblock claims more free blocks than the bitmap has
        let volume = dirty_volume().with_declared_free(8);
        let config = ScanConfig::builder().verbose(true).build().unwrap();
        let mut recorder = Recorder::default();

        scan_sequential(&volume, &config, &mut recorder).unwrap();

        assert_eq!(recorder.percents, vec![0.0, 12.5, 25.0, 37.5, 50.0]);
    }

    #[test]
    fn test_quiet_scan_reports_nothing() {
        let volume = dirty_volume();
        let mut recorder = Recorder::default();

        scan_sequential(&volume, &ScanConfig::default(), &mut recorder).unwrap();

        assert!(recorder.percents.is_empty());
        assert!(recorder.modified.is_empty());
    }
}
