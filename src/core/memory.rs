//! In-memory volume
//!
//! Keeps block contents and an allocation bitmap in RAM, records every
//! block channel call, and can be told to fail at chosen blocks. Used by
//! the test suites and benchmarks, and handy for dry-running scan logic
//! without a real device.

use crate::bitmap::BlockBitmap;
use crate::volume::{AllocationMap, BlockChannel, Volume};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;

/// A recorded block channel call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelCall {
    Read(u64),
    Write(u64),
    Discard(u64),
}

impl ChannelCall {
    pub fn block(&self) -> u64 {
        match *self {
            ChannelCall::Read(b) | ChannelCall::Write(b) | ChannelCall::Discard(b) => b,
        }
    }
}

pub struct MemoryVolume {
    block_size: usize,
    first_data_block: u64,
    blocks_count: u64,
    declared_free: Option<u64>,
    bitmap: BlockBitmap,
    data: Mutex<Vec<u8>>,
    calls: Mutex<Vec<ChannelCall>>,
    failures: Mutex<HashSet<u64>>,
}

impl MemoryVolume {
    /// Create a zero-filled volume with every block free
    pub fn new(block_size: usize, first_data_block: u64, blocks_count: u64) -> Self {
        let mut bitmap = BlockBitmap::new(blocks_count);
        bitmap.set_range(0, first_data_block);

        MemoryVolume {
            block_size,
            first_data_block,
            blocks_count,
            declared_free: None,
            bitmap,
            data: Mutex::new(vec![0u8; block_size * blocks_count as usize]),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Mark a block as in use
    pub fn allocate(&mut self, block: u64) {
        self.bitmap.set(block);
    }

    /// Mark every block in the data range allocated except `free`
    pub fn with_free_blocks(mut self, free: &[u64]) -> Self {
        self.bitmap.set_range(0, self.blocks_count);
        for &block in free {
            if block >= self.first_data_block {
                self.bitmap.clear(block);
            }
        }
        self
    }

    /// Override the free block count the volume declares
    pub fn with_declared_free(mut self, count: u64) -> Self {
        self.declared_free = Some(count);
        self
    }

    /// Fill one block's contents with `byte`
    pub fn fill_block(&self, block: u64, byte: u8) {
        let range = self.byte_range(block);
        self.data.lock()[range].fill(byte);
    }

    /// Fill every block's contents with `byte`
    pub fn fill_all(&self, byte: u8) {
        self.data.lock().fill(byte);
    }

    /// Copy of one block's contents
    pub fn block_data(&self, block: u64) -> Vec<u8> {
        let range = self.byte_range(block);
        self.data.lock()[range].to_vec()
    }

    /// Make every channel call at `block` fail
    pub fn fail_at(&self, block: u64) {
        self.failures.lock().insert(block);
    }

    /// Every channel call so far, in the order they happened
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Sorted block indices of calls matching `pred`
    pub fn blocks_where(&self, pred: impl Fn(&ChannelCall) -> bool) -> Vec<u64> {
        let mut blocks: Vec<u64> = self
            .calls
            .lock()
            .iter()
            .filter(|c| pred(*c))
            .map(ChannelCall::block)
            .collect();
        blocks.sort_unstable();
        blocks
    }

    fn byte_range(&self, block: u64) -> std::ops::Range<usize> {
        let start = block as usize * self.block_size;
        start..start + self.block_size
    }

    fn check(&self, call: ChannelCall, len: Option<usize>) -> io::Result<()> {
        self.calls.lock().push(call);

        let block = call.block();
        if block >= self.blocks_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {} beyond end of volume", block),
            ));
        }
        if let Some(len) = len {
            if len != self.block_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("buffer is {} bytes, block size is {}", len, self.block_size),
                ));
            }
        }
        if self.failures.lock().contains(&block) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected failure"));
        }
        Ok(())
    }
}

impl AllocationMap for MemoryVolume {
    fn is_allocated(&self, block: u64) -> bool {
        self.bitmap.is_allocated(block)
    }
}

impl BlockChannel for MemoryVolume {
    fn read_block(&self, block: u64, buf: &mut [u8]) -> io::Result<()> {
        self.check(ChannelCall::Read(block), Some(buf.len()))?;
        let range = self.byte_range(block);
        buf.copy_from_slice(&self.data.lock()[range]);
        Ok(())
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> io::Result<()> {
        self.check(ChannelCall::Write(block), Some(buf.len()))?;
        let range = self.byte_range(block);
        self.data.lock()[range].copy_from_slice(buf);
        Ok(())
    }

    fn discard_block(&self, block: u64) -> io::Result<()> {
        self.check(ChannelCall::Discard(block), None)?;
        // Discarded blocks read back as zeroes, like a punched hole
        let range = self.byte_range(block);
        self.data.lock()[range].fill(0);
        Ok(())
    }
}

impl Volume for MemoryVolume {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn first_data_block(&self) -> u64 {
        self.first_data_block
    }

    fn blocks_count(&self) -> u64 {
        self.blocks_count
    }

    fn free_blocks_count(&self) -> u64 {
        self.declared_free
            .unwrap_or_else(|| self.bitmap.count_free(self.first_data_block, self.blocks_count))
    }
}
