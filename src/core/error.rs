use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The block channel operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Read,
    Write,
    Discard,
}

impl fmt::Display for BlockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            BlockOp::Read => "reading",
            BlockOp::Write => "writing",
            BlockOp::Discard => "discarding",
        };
        f.write_str(verb)
    }
}

#[derive(Error, Debug)]
pub enum ZerofreeError {
    #[error("Invalid thread count: {0} (must be at least 1)")]
    InvalidThreadCount(usize),

    #[error("Invalid fill value: {0} (must be 0-255)")]
    InvalidFillValue(String),

    #[error("Error while {op} block {block}: {source}")]
    BlockIo {
        op: BlockOp,
        block: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {ranges} scan ranges failed, first failure: {first}")]
    PartitionsFailed {
        failed: usize,
        ranges: usize,
        first: Box<ZerofreeError>,
    },

    #[error("Scan worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("Invalid superblock magic: {0:#06x}")]
    InvalidMagic(u16),

    #[error("Unsupported filesystem feature: {0}")]
    UnsupportedFeature(String),

    #[error("Corrupt volume metadata: {0}")]
    CorruptVolume(String),

    #[error("Filesystem {} is mounted read-write", .0.display())]
    MountedReadWrite(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZerofreeError {
    /// Wrap a block channel failure with the operation and block index
    pub fn block_io(op: BlockOp, block: u64, source: std::io::Error) -> Self {
        ZerofreeError::BlockIo { op, block, source }
    }

    /// True for errors detected before any scan work begins
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ZerofreeError::InvalidThreadCount(_) | ZerofreeError::InvalidFillValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ZerofreeError>;
