//! Volume access traits
//!
//! The scanner only ever talks to a volume through these traits:
//! - [`AllocationMap`] answers whether a block is in use
//! - [`BlockChannel`] reads, writes and discards single blocks
//! - [`Volume`] ties both to the volume geometry

use std::io;
use std::ops::Range;

/// Block allocation oracle
pub trait AllocationMap {
    /// Check if a block is referenced by a file or metadata structure
    fn is_allocated(&self, block: u64) -> bool;
}

/// Single-block I/O
///
/// Implementations must tolerate concurrent calls from several threads as
/// long as the calls target different block indices.
pub trait BlockChannel {
    /// Read one block into `buf` (exactly `block_size` bytes)
    fn read_block(&self, block: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write one block from `buf` (exactly `block_size` bytes)
    fn write_block(&self, block: u64, buf: &[u8]) -> io::Result<()>;

    /// Tell the storage layer the block's contents are no longer needed
    fn discard_block(&self, block: u64) -> io::Result<()>;
}

/// A volume the scanner can walk
pub trait Volume: AllocationMap + BlockChannel + Sync {
    /// Block size in bytes
    fn block_size(&self) -> usize;

    /// First block index covered by the allocation bitmap
    fn first_data_block(&self) -> u64;

    /// Total number of blocks
    fn blocks_count(&self) -> u64;

    /// Free blocks declared by the volume metadata
    fn free_blocks_count(&self) -> u64;

    /// The range every scan covers
    fn data_range(&self) -> Range<u64> {
        self.first_data_block()..self.blocks_count()
    }
}
