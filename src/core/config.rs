//! Scan configuration
//!
//! A `ScanConfig` is built once before a scan starts and is shared
//! read-only by every worker afterwards.

use crate::error::{Result, ZerofreeError};
use serde::{Deserialize, Serialize};

/// Immutable settings for one scan
///
/// With `discard` set, free blocks are discarded without being read, so the
/// fill comparison never runs and `fill` only matters for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Byte written to every free block, and compared against before writing
    pub fill: u8,

    /// Classify blocks but never write or discard
    pub dry_run: bool,

    /// Discard free blocks instead of writing the fill pattern
    pub discard: bool,

    /// Report progress while scanning (sequential mode only)
    pub verbose: bool,

    /// Number of worker threads; 1 selects the sequential scanner
    pub thread_count: usize,
}

impl ScanConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Reject configurations that must never reach the scanner
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(ZerofreeError::InvalidThreadCount(self.thread_count));
        }
        Ok(())
    }

    /// True when the partitioned scanner should run
    pub fn is_parallel(&self) -> bool {
        self.thread_count > 1
    }

    /// A block-sized buffer filled with the fill pattern
    pub fn fill_buffer(&self, block_size: usize) -> Vec<u8> {
        vec![self.fill; block_size]
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            fill: 0,
            dry_run: false,
            discard: false,
            verbose: false,
            thread_count: 1,
        }
    }
}

/// Builder for [`ScanConfig`]
///
/// # Examples
///
/// ```
/// use zerofree::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .fill(0xff)
///     .threads(4)
///     .dry_run(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.fill, 0xff);
/// assert!(config.is_parallel());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        ScanConfigBuilder {
            config: ScanConfig::default(),
        }
    }

    pub fn fill(mut self, fill: u8) -> Self {
        self.config.fill = fill;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn discard(mut self, discard: bool) -> Self {
        self.config.discard = discard;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn threads(mut self, thread_count: usize) -> Self {
        self.config.thread_count = thread_count;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<ScanConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse a fill value the way C's `strtol(s, _, 0)` reads integers
///
/// Accepts decimal (`65`), hexadecimal (`0x41`) and octal (`0101`).
/// The value must lie in 0-255.
pub fn parse_fill_value(input: &str) -> Result<u8> {
    let invalid = || ZerofreeError::InvalidFillValue(input.to_string());

    let s = input.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    let value = u64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    u8::try_from(value).map_err(|_| invalid())
}
