//! File- and device-backed ext volumes
//!
//! `ExtVolume` loads the superblock, group descriptors and block bitmaps
//! once at open time, then serves single-block I/O with positional reads
//! and writes so several scan threads can share one handle.

use crate::bitmap::BlockBitmap;
use crate::error::{Result, ZerofreeError};
use crate::superblock::{parse_group_descriptors, GroupDescriptor, Superblock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use crate::volume::{AllocationMap, BlockChannel, Volume};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How to open a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// An ext2/ext3/ext4 filesystem on a block device or image file
pub struct ExtVolume {
    file: File,
    path: PathBuf,
    superblock: Superblock,
    bitmap: BlockBitmap,
    block_device: bool,
    writable: bool,
}

impl ExtVolume {
    /// Open a volume and load its block allocation bitmap
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let writable = mode == OpenMode::ReadWrite;
        let file = OpenOptions::new().read(true).write(writable).open(&path)?;
        let block_device = file.metadata()?.file_type().is_block_device();

        let mut sb_bytes = vec![0u8; SUPERBLOCK_SIZE];
        file.read_exact_at(&mut sb_bytes, SUPERBLOCK_OFFSET)?;
        let superblock = Superblock::from_bytes(&sb_bytes)?;

        debug!(
            "Superblock: {} blocks of {} bytes, {} free, {} groups",
            superblock.blocks_count,
            superblock.block_size(),
            superblock.free_blocks_count,
            superblock.group_count()
        );

        let descriptors = read_group_descriptors(&file, &superblock, block_device)?;
        let bitmap = load_block_bitmap(&file, &superblock, &descriptors)?;

        Ok(ExtVolume {
            file,
            path: path.as_ref().to_path_buf(),
            superblock,
            bitmap,
            block_device,
            writable,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_block_device(&self) -> bool {
        self.block_device
    }

    /// Flush writes and release the handle
    pub fn close(self) -> Result<()> {
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn offset(&self, block: u64, len: usize) -> io::Result<u64> {
        if block >= self.superblock.blocks_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block {} beyond end of volume", block),
            ));
        }
        if len != self.superblock.block_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "buffer is {} bytes, block size is {}",
                    len,
                    self.superblock.block_size()
                ),
            ));
        }
        Ok(block * self.superblock.block_size() as u64)
    }

    fn ensure_writable(&self) -> io::Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "volume opened read-only",
            ))
        }
    }
}

fn read_group_descriptors(
    file: &File,
    superblock: &Superblock,
    block_device: bool,
) -> Result<Vec<GroupDescriptor>> {
    let table_len = superblock.group_desc_table_len()?;
    let offset = superblock.group_desc_block() * superblock.block_size() as u64;

    // A corrupt block count must not turn into a huge allocation
    if !block_device {
        let file_len = file.metadata()?.len();
        if offset.saturating_add(table_len) > file_len {
            return Err(ZerofreeError::CorruptVolume(format!(
                "group descriptor table ({} bytes at {}) extends past end of image ({} bytes)",
                table_len, offset, file_len
            )));
        }
    }

    let mut table = vec![0u8; table_len as usize];
    file.read_exact_at(&mut table, offset)?;
    parse_group_descriptors(superblock, &table)
}

/// Build the in-memory bitmap from every group's on-disk bitmap
///
/// Blocks before the first data block are reserved. A group flagged
/// `BLOCK_UNINIT` on a filesystem with descriptor checksums has no bitmap
/// on disk: everything in it is free except its own metadata. Without
/// checksums the flag is not trusted and the bitmap is read as usual.
fn load_block_bitmap(
    file: &File,
    superblock: &Superblock,
    descriptors: &[GroupDescriptor],
) -> Result<BlockBitmap> {
    let mut bitmap = BlockBitmap::new(superblock.blocks_count);
    bitmap.set_range(0, superblock.first_data_block as u64);

    let block_size = superblock.block_size();
    let mut buf = vec![0u8; block_size];

    for (group, desc) in descriptors.iter().enumerate() {
        let range = superblock.group_range(group as u64);

        if desc.block_uninit() {
            if superblock.has_group_checksums() {
                debug!(
                    "Group {} has an uninitialized block bitmap, only metadata is allocated",
                    group
                );
                for used in superblock.group_metadata(group as u64, desc) {
                    bitmap.set_range(used.start, used.end);
                }
                continue;
            }
            warn!(
                "Group {} flagged BLOCK_UNINIT without group checksums, reading its bitmap",
                group
            );
        }

        if desc.block_bitmap == 0 || desc.block_bitmap >= superblock.blocks_count {
            return Err(ZerofreeError::CorruptVolume(format!(
                "group {} block bitmap at invalid block {}",
                group, desc.block_bitmap
            )));
        }

        file.read_exact_at(&mut buf, desc.block_bitmap * block_size as u64)?;
        bitmap.load_group(range.start, range.end - range.start, &buf);
    }

    Ok(bitmap)
}

impl AllocationMap for ExtVolume {
    fn is_allocated(&self, block: u64) -> bool {
        self.bitmap.is_allocated(block)
    }
}

impl BlockChannel for ExtVolume {
    fn read_block(&self, block: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = self.offset(block, buf.len())?;
        self.file.read_exact_at(buf, offset)
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> io::Result<()> {
        self.ensure_writable()?;
        let offset = self.offset(block, buf.len())?;
        self.file.write_all_at(buf, offset)
    }

    fn discard_block(&self, block: u64) -> io::Result<()> {
        self.ensure_writable()?;
        let len = self.superblock.block_size();
        let offset = self.offset(block, len)?;
        discard_range(&self.file, self.block_device, offset, len as u64)
    }
}

impl Volume for ExtVolume {
    fn block_size(&self) -> usize {
        self.superblock.block_size()
    }

    fn first_data_block(&self) -> u64 {
        self.superblock.first_data_block as u64
    }

    fn blocks_count(&self) -> u64 {
        self.superblock.blocks_count
    }

    fn free_blocks_count(&self) -> u64 {
        self.superblock.free_blocks_count
    }
}

/// `_IO(0x12, 119)`
#[cfg(target_os = "linux")]
const BLKDISCARD: u32 = 0x1277;

/// Discard a byte range: `BLKDISCARD` on block devices, a punched hole in
/// regular files
#[cfg(target_os = "linux")]
fn discard_range(file: &File, block_device: bool, offset: u64, len: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let ret = if block_device {
        let range: [u64; 2] = [offset, len];
        // SAFETY: BLKDISCARD reads two u64 values from a pointer that
        // stays valid for the duration of the call.
        unsafe { libc::ioctl(fd, BLKDISCARD as _, range.as_ptr()) }
    } else {
        // SAFETY: plain syscall on an owned, open descriptor.
        unsafe {
            libc::fallocate(
                fd,
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                offset as libc::off_t,
                len as libc::off_t,
            )
        }
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn discard_range(_file: &File, _block_device: bool, _offset: u64, _len: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "discard is only supported on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superblock::{BG_BLOCK_UNINIT, EXT_MAGIC, RO_COMPAT_GDT_CSUM};
    use tempfile::NamedTempFile;

    const BLOCK: usize = 1024;

    /// 64-block image with 1 KiB blocks: superblock in block 1, descriptors
    /// in block 2, block bitmap in 3, inode bitmap in 4 and a two block
    /// inode table at 5. The on-disk bitmap marks blocks 1..=10 allocated.
    fn write_image(flags: u16, feature_ro_compat: u32) -> NamedTempFile {
        let temp = NamedTempFile::new().unwrap();
        let mut image = vec![0u8; 64 * BLOCK];

        let sb = Superblock {
            magic: EXT_MAGIC,
            blocks_count: 64,
            free_blocks_count: 53,
            first_data_block: 1,
            log_block_size: 0,
            blocks_per_group: 8192,
            inodes_per_group: 16,
            rev_level: 1,
            inode_size: 128,
            feature_compat: 0,
            feature_incompat: 0,
            feature_ro_compat,
            reserved_gdt_blocks: 0,
            desc_size: 0,
            backup_bgs: [0, 0],
        };
        image[1024..2048].copy_from_slice(&sb.to_bytes());

        let desc = GroupDescriptor {
            block_bitmap: 3,
            inode_bitmap: 4,
            inode_table: 5,
            flags,
        };
        image[2 * BLOCK..2 * BLOCK + 32].copy_from_slice(&desc.to_bytes(32));

        // Bit i covers block 1 + i; blocks 1..=10 in use
        image[3 * BLOCK] = 0xff;
        image[3 * BLOCK + 1] = 0b0000_0011;

        for block in 11..64 {
            image[block * BLOCK..(block + 1) * BLOCK].fill(0xab);
        }

        std::fs::write(temp.path(), &image).unwrap();
        temp
    }

    #[test]
    fn test_open_loads_bitmap() {
        let temp = write_image(0, 0);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadOnly).unwrap();

        assert_eq!(volume.block_size(), 1024);
        assert_eq!(volume.data_range(), 1..64);
        assert_eq!(volume.free_blocks_count(), 53);
        assert!(volume.is_allocated(0));
        assert!(volume.is_allocated(10));
        assert!(!volume.is_allocated(11));
        assert!(!volume.is_allocated(63));
        assert!(!volume.is_block_device());
        assert_eq!(volume.path(), temp.path());
        assert_eq!(volume.superblock().inode_table_blocks(), 2);
    }

    #[test]
    fn test_uninit_group_frees_all_but_metadata() {
        let temp = write_image(BG_BLOCK_UNINIT, RO_COMPAT_GDT_CSUM);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadOnly).unwrap();

        // Block 0, superblock, descriptors, both bitmaps and the inode table
        assert!((0..7).all(|b| volume.is_allocated(b)));
        // The stale on-disk bitmap is ignored
        assert!((7..64).all(|b| !volume.is_allocated(b)));
    }

    #[test]
    fn test_uninit_flag_ignored_without_checksums() {
        let temp = write_image(BG_BLOCK_UNINIT, 0);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadOnly).unwrap();

        assert!(volume.is_allocated(10));
        assert!(!volume.is_allocated(11));
    }

    #[test]
    fn test_read_write_block() {
        let temp = write_image(0, 0);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadWrite).unwrap();

        let mut buf = vec![0u8; BLOCK];
        volume.read_block(20, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xab));

        volume.write_block(20, &vec![0u8; BLOCK]).unwrap();
        volume.read_block(20, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        volume.close().unwrap();
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let temp = write_image(0, 0);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadOnly).unwrap();

        let err = volume.write_block(20, &vec![0u8; BLOCK]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(volume.discard_block(20).is_err());
    }

    #[test]
    fn test_out_of_range_block() {
        let temp = write_image(0, 0);
        let volume = ExtVolume::open(temp.path(), OpenMode::ReadOnly).unwrap();
        let mut buf = vec![0u8; BLOCK];
        let err = volume.read_block(64, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_not_an_ext_filesystem() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![0u8; 4 * BLOCK]).unwrap();
        assert!(matches!(
            ExtVolume::open(temp.path(), OpenMode::ReadOnly),
            Err(ZerofreeError::InvalidMagic(0))
        ));
    }
}
