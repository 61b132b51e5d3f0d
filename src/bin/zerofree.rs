//! zerofree
//!
//! Zero (or discard) the free blocks of an unmounted or read-only mounted
//! ext2/ext3/ext4 filesystem.

use anyhow::{bail, Context};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zerofree::{
    mount_state, parse_fill_value, run_scan_with_progress, ExtVolume, MountState, OpenMode,
    ProgressCounters, ProgressSink, ScanConfig, ZerofreeError,
};

#[derive(Parser, Debug)]
#[command(name = "zerofree", version)]
#[command(about = "Zero free blocks of an ext2/ext3/ext4 filesystem")]
struct Args {
    /// Number of scan threads (more than 1 enables the partitioned scan)
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,

    /// Dry run: report what would change without writing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show progress (single-threaded scans only)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Discard free blocks instead of writing the fill value
    #[arg(short = 'd', long)]
    discard: bool,

    /// Fill value, 0-255 (decimal, 0x hex or 0-prefixed octal)
    #[arg(short = 'f', long = "fill", default_value = "0", value_parser = parse_fill)]
    fill: u8,

    /// Print the scan summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Block device or image file holding the filesystem
    filesystem: PathBuf,
}

fn parse_fill(s: &str) -> Result<u8, String> {
    parse_fill_value(s).map_err(|e| e.to_string())
}

/// Progress in the classic zerofree format
///
/// Percentages overwrite each other on stderr; every modified block prints
/// `modified/free/total` on stdout.
struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn percent(&mut self, percent: f64) {
        eprint!("\r{:4.1}%", percent);
        std::io::stderr().flush().ok();
    }

    fn block_modified(&mut self, counters: &ProgressCounters, blocks_count: u64) {
        println!(
            "\r{}/{}/{}",
            counters.blocks_modified, counters.free_blocks_seen, blocks_count
        );
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = ScanConfig::builder()
        .fill(args.fill)
        .dry_run(args.dry_run)
        .discard(args.discard)
        .verbose(args.verbose)
        .threads(args.threads)
        .build()?;

    if config.is_parallel() {
        info!("Using {} threads", config.thread_count);
        warn!("Running multiple threads might damage your spinning device!");
    }

    let state = mount_state(&args.filesystem).with_context(|| {
        format!(
            "failed to determine filesystem mount state of {}",
            args.filesystem.display()
        )
    })?;
    match state {
        MountState::ReadWrite => bail!(ZerofreeError::MountedReadWrite(args.filesystem.clone())),
        MountState::ReadOnly => info!("{} is mounted read-only", args.filesystem.display()),
        MountState::NotMounted => {}
    }

    let mode = if config.dry_run {
        OpenMode::ReadOnly
    } else {
        OpenMode::ReadWrite
    };
    let volume = ExtVolume::open(&args.filesystem, mode)
        .with_context(|| format!("failed to open filesystem {}", args.filesystem.display()))?;

    let sb = volume.superblock();
    info!(
        "{}: {} blocks of {} bytes in {} groups, {} free",
        volume.path().display(),
        sb.blocks_count,
        sb.block_size(),
        sb.group_count(),
        sb.free_blocks_count
    );

    let result = run_scan_with_progress(&volume, &config, &mut TerminalProgress);
    if config.verbose && !config.is_parallel() {
        eprintln!();
    }

    // Close even after a failed scan so completed writes reach the disk
    let closed = volume.close().context("error while closing filesystem");
    let summary = result?;
    closed?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            "{} of {} free blocks {}",
            summary.blocks_modified,
            summary.free_blocks_seen,
            match (summary.dry_run, summary.discard) {
                (true, _) => "would be modified",
                (false, true) => "discarded",
                (false, false) => "zeroed",
            }
        );
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
