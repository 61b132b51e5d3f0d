//! Scan engine and volume access

pub mod bitmap;
pub mod classify;
pub mod config;
pub mod error;
#[cfg(unix)]
pub mod io;
pub mod memory;
pub mod mount;
pub mod parallel;
pub mod partition;
pub mod progress;
pub mod scan;
pub mod superblock;
pub mod volume;
