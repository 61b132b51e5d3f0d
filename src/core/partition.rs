//! Static range partitioning
//!
//! A range of `total` blocks is cut into `n` equal partitions of
//! `total / n` blocks. The blocks lost to integer division form the
//! residual range, which the coordinating thread scans itself.

use std::ops::Range;

/// Partitions and residual for one partitioned scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partitions: Vec<Range<u64>>,
    pub residual: Range<u64>,
}

impl PartitionPlan {
    /// Every range the plan covers, partitions first then the residual
    pub fn ranges(&self) -> impl Iterator<Item = &Range<u64>> {
        self.partitions.iter().chain(std::iter::once(&self.residual))
    }
}

/// Split `range` into `n` contiguous partitions plus a residual tail
///
/// Partition `i` is `[start + i*part, start + (i+1)*part)` with
/// `part = total / n`; the residual is `[start + n*part, end)`. When
/// `n > total` every partition is empty and the residual holds the whole
/// range. An inverted range is treated as empty.
///
/// # Panics
///
/// Panics if `n` is zero. Callers validate the thread count first.
pub fn partition_range(range: Range<u64>, n: usize) -> PartitionPlan {
    assert!(n > 0, "partition count must be at least 1");

    let start = range.start;
    let end = range.end.max(start);
    let total = end - start;
    let part_size = total / n as u64;

    let partitions = (0..n as u64)
        .map(|i| start + i * part_size..start + (i + 1) * part_size)
        .collect();
    let residual = start + n as u64 * part_size..end;

    PartitionPlan {
        partitions,
        residual,
    }
}
