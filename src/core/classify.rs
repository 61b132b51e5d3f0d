//! Block classification and the per-block apply step

use crate::config::ScanConfig;
use crate::error::{BlockOp, Result, ZerofreeError};
use crate::volume::BlockChannel;

/// What a free block needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    /// Already holds the fill pattern
    Unchanged,
    /// Must be written (or discarded)
    NeedsWrite,
}

/// Decide whether a free block needs modification
///
/// In discard mode the contents are never inspected and may be `None`.
/// Otherwise the block is `Unchanged` iff every byte equals the fill value.
pub fn classify(contents: Option<&[u8]>, config: &ScanConfig) -> BlockClass {
    if config.discard {
        return BlockClass::NeedsWrite;
    }

    match contents {
        Some(bytes) if bytes.iter().all(|&b| b == config.fill) => BlockClass::Unchanged,
        _ => BlockClass::NeedsWrite,
    }
}

/// Carry out a classification against the block channel
///
/// Dry runs and unchanged blocks never touch the channel. `fill_buf` must be
/// a block-sized buffer of the fill pattern.
pub fn apply<C: BlockChannel + ?Sized>(
    channel: &C,
    block: u64,
    class: BlockClass,
    config: &ScanConfig,
    fill_buf: &[u8],
) -> Result<()> {
    if class == BlockClass::Unchanged || config.dry_run {
        return Ok(());
    }

    if config.discard {
        channel
            .discard_block(block)
            .map_err(|e| ZerofreeError::block_io(BlockOp::Discard, block, e))
    } else {
        channel
            .write_block(block, fill_buf)
            .map_err(|e| ZerofreeError::block_io(BlockOp::Write, block, e))
    }
}
