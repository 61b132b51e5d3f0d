//! # zerofree - Zero Free Blocks of ext Filesystems
//!
//! `zerofree` walks every block of an ext2/ext3/ext4 volume and overwrites
//! the blocks the allocation bitmap marks as free with a fill byte, or
//! discards them. Deleted data stops lingering on the medium and sparse
//! disk images can be compacted afterwards.
//!
//! - **Skip-unchanged**: blocks already holding the fill byte are not rewritten
//! - **Dry run**: classify every free block without modifying anything
//! - **Discard**: hint the storage layer instead of writing data
//! - **Partitioned scans**: static per-thread partitions joined at one barrier
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zerofree::{run_scan, ExtVolume, OpenMode, Result, ScanConfig};
//!
//! # fn main() -> Result<()> {
//! let volume = ExtVolume::open("disk.img", OpenMode::ReadWrite)?;
//! let config = ScanConfig::builder().threads(4).build()?;
//!
//! let summary = run_scan(&volume, &config)?;
//! println!("{} of {} free blocks zeroed", summary.blocks_modified, summary.free_blocks_seen);
//!
//! volume.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Volumes
//!
//! The scanner only needs the [`Volume`] trait. [`MemoryVolume`] is a ready
//! made in-memory implementation:
//!
//! ```rust
//! use zerofree::{run_scan, MemoryVolume, ScanConfig};
//!
//! let volume = MemoryVolume::new(1024, 1, 10).with_free_blocks(&[2, 4, 6, 8]);
//! volume.fill_all(0xaa);
//!
//! let summary = run_scan(&volume, &ScanConfig::default()).unwrap();
//! assert_eq!(summary.blocks_modified, 4);
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    bitmap, classify, config, error, memory, mount, parallel, partition, progress, scan,
    superblock, volume,
};

#[cfg(unix)]
pub use crate::core::io::{ExtVolume, OpenMode};
pub use crate::core::{
    bitmap::BlockBitmap,
    classify::{apply, classify, BlockClass},
    config::{parse_fill_value, ScanConfig, ScanConfigBuilder},
    error::{BlockOp, Result, ZerofreeError},
    memory::{ChannelCall, MemoryVolume},
    mount::{mount_state, MountState},
    parallel::scan_parallel,
    partition::{partition_range, PartitionPlan},
    progress::{LogProgress, NoProgress, ProgressCounters, ProgressSink},
    scan::{scan_range, scan_sequential, ScanMode, ScanSummary},
    superblock::{GroupDescriptor, Superblock},
    volume::{AllocationMap, BlockChannel, Volume},
};

use tracing::info;

/// Scan a volume, reporting verbose progress through `tracing`
///
/// See [`run_scan_with_progress`].
pub fn run_scan<V: Volume + ?Sized>(volume: &V, config: &ScanConfig) -> Result<ScanSummary> {
    run_scan_with_progress(volume, config, &mut LogProgress)
}

/// Validate `config` and run the matching scanner
///
/// A thread count of 1 runs the sequential scanner, which reports
/// progress to `progress` when `config.verbose` is set. Larger counts run
/// the partitioned scanner. An invalid configuration is rejected before
/// any block is touched.
pub fn run_scan_with_progress<V: Volume + ?Sized>(
    volume: &V,
    config: &ScanConfig,
    progress: &mut dyn ProgressSink,
) -> Result<ScanSummary> {
    config.validate()?;

    info!(
        "Scanning {} blocks (fill {:#04x}, dry_run={}, discard={}, threads={})",
        volume.blocks_count(),
        config.fill,
        config.dry_run,
        config.discard,
        config.thread_count
    );

    if config.is_parallel() {
        scan_parallel(volume, config)
    } else {
        scan_sequential(volume, config, progress)
    }
}
