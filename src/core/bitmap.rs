//! In-memory block allocation bitmap
//!
//! One bit per block over `[0, total_blocks)`:
//! - 0 = free block
//! - 1 = allocated block
//!
//! Indices at or beyond `total_blocks` always read as allocated so that a
//! scan can never touch blocks the volume does not have.

use crate::volume::AllocationMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitmap {
    /// Bitmap words (each word = 64 bits = 64 blocks)
    words: Vec<u64>,

    /// Total number of blocks tracked
    total_blocks: u64,
}

impl BlockBitmap {
    /// Create a bitmap with every block free
    pub fn new(total_blocks: u64) -> Self {
        let num_words = total_blocks.div_ceil(64) as usize;
        BlockBitmap {
            words: vec![0u64; num_words],
            total_blocks,
        }
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Mark one block allocated
    pub fn set(&mut self, block: u64) {
        if block >= self.total_blocks {
            return;
        }
        let word_idx = (block / 64) as usize;
        let bit_idx = block % 64;
        self.words[word_idx] |= 1u64 << bit_idx;
    }

    /// Mark one block free
    pub fn clear(&mut self, block: u64) {
        if block >= self.total_blocks {
            return;
        }
        let word_idx = (block / 64) as usize;
        let bit_idx = block % 64;
        self.words[word_idx] &= !(1u64 << bit_idx);
    }

    /// Mark `[start, end)` allocated, clamped to the tracked range
    pub fn set_range(&mut self, start: u64, end: u64) {
        for block in start..end.min(self.total_blocks) {
            self.set(block);
        }
    }

    /// Load an on-disk group bitmap covering blocks starting at `base`
    ///
    /// On-disk bitmaps are little-endian within each byte: bit `i` of the
    /// group lives in byte `i / 8`, bit `i % 8`. Only the first `count`
    /// bits are consulted.
    pub fn load_group(&mut self, base: u64, count: u64, bytes: &[u8]) {
        let count = count.min(bytes.len() as u64 * 8);
        for i in 0..count {
            let byte = bytes[(i / 8) as usize];
            if byte & (1u8 << (i % 8)) != 0 {
                self.set(base + i);
            } else {
                self.clear(base + i);
            }
        }
    }

    /// Count free blocks in `[start, end)`
    pub fn count_free(&self, start: u64, end: u64) -> u64 {
        (start..end.min(self.total_blocks))
            .filter(|&block| !self.is_allocated(block))
            .count() as u64
    }
}

impl AllocationMap for BlockBitmap {
    fn is_allocated(&self, block: u64) -> bool {
        if block >= self.total_blocks {
            return true;
        }

        let word_idx = (block / 64) as usize;
        let bit_idx = block % 64;

        (self.words[word_idx] & (1u64 << bit_idx)) != 0
    }
}
