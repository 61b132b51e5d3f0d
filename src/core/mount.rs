//! Mount state detection
//!
//! Reads `/proc/mounts` to find whether a device or image is mounted, and
//! how. Loop devices are matched through their backing file so that a
//! mounted image is recognized too.

use crate::error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PROC_MOUNTS: &str = "/proc/mounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    NotMounted,
    ReadOnly,
    ReadWrite,
}

/// One line of `/proc/mounts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub read_only: bool,
}

/// Decode the `\ooo` octal escapes the kernel uses for spaces and friends
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Parse the contents of a mounts table, skipping malformed lines
pub fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            let options = fields.next()?;

            Some(MountEntry {
                device: unescape(device),
                mount_point: unescape(mount_point),
                fs_type: fs_type.to_string(),
                read_only: options.split(',').any(|opt| opt == "ro"),
            })
        })
        .collect()
}

/// Mount state of `target` given a mounts table
///
/// `resolve` maps a device field to every path it stands for. A target
/// mounted in several places is read-write if any mount is.
pub fn state_from_entries<F>(target: &Path, entries: &[MountEntry], resolve: F) -> MountState
where
    F: Fn(&str) -> Vec<PathBuf>,
{
    let mut state = MountState::NotMounted;

    for entry in entries {
        if !resolve(&entry.device).iter().any(|p| p == target) {
            continue;
        }

        debug!(
            "{} mounted on {} ({}, {})",
            entry.device,
            entry.mount_point,
            entry.fs_type,
            if entry.read_only { "ro" } else { "rw" }
        );

        if !entry.read_only {
            return MountState::ReadWrite;
        }
        state = MountState::ReadOnly;
    }

    state
}

/// Canonical device path plus, for loop devices, the backing file
fn resolve_device(device: &str) -> Vec<PathBuf> {
    if !device.starts_with('/') {
        return Vec::new();
    }

    let mut paths = Vec::new();
    let canonical = fs::canonicalize(device).unwrap_or_else(|_| PathBuf::from(device));

    if let Some(name) = canonical.file_name().and_then(|n| n.to_str()) {
        if name.starts_with("loop") {
            let backing = Path::new("/sys/block").join(name).join("loop/backing_file");
            if let Ok(file) = fs::read_to_string(backing) {
                let file = file.trim_end();
                paths.push(fs::canonicalize(file).unwrap_or_else(|_| PathBuf::from(file)));
            }
        }
    }

    paths.push(canonical);
    paths
}

/// Find out whether `path` is currently mounted
///
/// Systems without `/proc/mounts` report `NotMounted`.
pub fn mount_state<P: AsRef<Path>>(path: P) -> Result<MountState> {
    let target = fs::canonicalize(path.as_ref())?;

    let contents = match fs::read_to_string(PROC_MOUNTS) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} not available, assuming {} is not mounted", PROC_MOUNTS, target.display());
            return Ok(MountState::NotMounted);
        }
        Err(e) => return Err(e.into()),
    };

    let entries = parse_mounts(&contents);
    Ok(state_from_entries(&target, &entries, resolve_device))
}
