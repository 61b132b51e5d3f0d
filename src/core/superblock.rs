//! ext2/ext3/ext4 superblock and group descriptors
//!
//! Only the fields needed to locate the block allocation bitmaps, and the
//! metadata of groups whose bitmap was never written, are decoded. All
//! values are little-endian on disk.

use crate::error::{Result, ZerofreeError};

/// Byte offset of the primary superblock
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// Size of the on-disk superblock
pub const SUPERBLOCK_SIZE: usize = 1024;

pub const EXT_MAGIC: u16 = 0xEF53;

pub const COMPAT_SPARSE_SUPER2: u32 = 0x0200;
pub const INCOMPAT_META_BG: u32 = 0x0010;
pub const INCOMPAT_64BIT: u32 = 0x0080;
pub const RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
pub const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
pub const RO_COMPAT_BIGALLOC: u32 = 0x0200;
pub const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

/// Group descriptor flag: block bitmap not initialized
pub const BG_BLOCK_UNINIT: u16 = 0x0002;

/// Largest supported block size shift (1024 << 6 = 64 KiB)
const MAX_LOG_BLOCK_SIZE: u32 = 6;

const GROUP_DESC_SIZE: usize = 32;
const GROUP_DESC_SIZE_64BIT: usize = 64;

/// Inode size of revision 0 filesystems
const GOOD_OLD_INODE_SIZE: u16 = 128;

// Superblock field offsets
const S_BLOCKS_COUNT_LO: usize = 0x04;
const S_FREE_BLOCKS_COUNT_LO: usize = 0x0C;
const S_FIRST_DATA_BLOCK: usize = 0x14;
const S_LOG_BLOCK_SIZE: usize = 0x18;
const S_BLOCKS_PER_GROUP: usize = 0x20;
const S_INODES_PER_GROUP: usize = 0x28;
const S_MAGIC: usize = 0x38;
const S_REV_LEVEL: usize = 0x4C;
const S_INODE_SIZE: usize = 0x58;
const S_FEATURE_COMPAT: usize = 0x5C;
const S_FEATURE_INCOMPAT: usize = 0x60;
const S_FEATURE_RO_COMPAT: usize = 0x64;
const S_RESERVED_GDT_BLOCKS: usize = 0xCE;
const S_DESC_SIZE: usize = 0xFE;
const S_BLOCKS_COUNT_HI: usize = 0x150;
const S_FREE_BLOCKS_COUNT_HI: usize = 0x158;
const S_BACKUP_BGS: usize = 0x24C;

// Group descriptor field offsets
const BG_BLOCK_BITMAP_LO: usize = 0x00;
const BG_INODE_BITMAP_LO: usize = 0x04;
const BG_INODE_TABLE_LO: usize = 0x08;
const BG_FLAGS: usize = 0x12;
const BG_BLOCK_BITMAP_HI: usize = 0x20;
const BG_INODE_BITMAP_HI: usize = 0x24;
const BG_INODE_TABLE_HI: usize = 0x28;

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Decoded superblock fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u16,

    /// Total blocks (combined lo/hi halves on 64-bit filesystems)
    pub blocks_count: u64,

    /// Free blocks (combined lo/hi halves on 64-bit filesystems)
    pub free_blocks_count: u64,

    /// First block covered by group 0's bitmap (1 for 1 KiB blocks, else 0)
    pub first_data_block: u32,

    /// Block size is `1024 << log_block_size`
    pub log_block_size: u32,

    pub blocks_per_group: u32,
    pub inodes_per_group: u32,

    /// 0 for the original fixed-size inode layout
    pub rev_level: u32,

    /// On-disk inode size, meaningful only when `rev_level` > 0
    pub inode_size: u16,

    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,

    /// Descriptor table blocks set aside for online resize
    pub reserved_gdt_blocks: u16,

    /// Group descriptor size, meaningful only with `INCOMPAT_64BIT`
    pub desc_size: u16,

    /// The two backup groups used with `COMPAT_SPARSE_SUPER2`
    pub backup_bgs: [u32; 2],
}

impl Superblock {
    pub fn block_size(&self) -> usize {
        1024usize << self.log_block_size
    }

    pub fn is_64bit(&self) -> bool {
        self.feature_incompat & INCOMPAT_64BIT != 0
    }

    /// Bytes per group descriptor
    pub fn group_desc_size(&self) -> usize {
        if self.is_64bit() && self.desc_size as usize >= GROUP_DESC_SIZE_64BIT {
            self.desc_size as usize
        } else {
            GROUP_DESC_SIZE
        }
    }

    /// Number of block groups
    pub fn group_count(&self) -> u64 {
        let data_blocks = self.blocks_count.saturating_sub(self.first_data_block as u64);
        data_blocks.div_ceil(self.blocks_per_group as u64)
    }

    /// Size in bytes of the whole group descriptor table
    pub fn group_desc_table_len(&self) -> Result<u64> {
        self.group_count()
            .checked_mul(self.group_desc_size() as u64)
            .ok_or_else(|| {
                ZerofreeError::CorruptVolume(format!(
                    "{} groups overflow the descriptor table",
                    self.group_count()
                ))
            })
    }

    /// Blocks taken by the group descriptor table
    pub fn desc_blocks(&self) -> u64 {
        self.group_count()
            .saturating_mul(self.group_desc_size() as u64)
            .div_ceil(self.block_size() as u64)
    }

    /// Bytes per inode
    pub fn inode_size(&self) -> u64 {
        if self.rev_level == 0 || self.inode_size == 0 {
            GOOD_OLD_INODE_SIZE as u64
        } else {
            self.inode_size as u64
        }
    }

    /// Blocks taken by one group's inode table
    pub fn inode_table_blocks(&self) -> u64 {
        (self.inodes_per_group as u64 * self.inode_size()).div_ceil(self.block_size() as u64)
    }

    /// Whether group descriptors carry checksums, which is what makes the
    /// `BLOCK_UNINIT` flag trustworthy
    pub fn has_group_checksums(&self) -> bool {
        self.feature_ro_compat & (RO_COMPAT_GDT_CSUM | RO_COMPAT_METADATA_CSUM) != 0
    }

    /// Whether `group` holds the primary superblock or a backup copy
    pub fn group_has_superblock(&self, group: u64) -> bool {
        if group == 0 {
            return true;
        }
        if self.feature_compat & COMPAT_SPARSE_SUPER2 != 0 {
            return self.backup_bgs.iter().any(|&bg| bg as u64 == group);
        }
        if group == 1 || self.feature_ro_compat & RO_COMPAT_SPARSE_SUPER == 0 {
            return true;
        }
        group % 2 == 1 && [3, 5, 7].iter().any(|&base| is_power_of(group, base))
    }

    /// Blocks a group's own metadata occupies
    ///
    /// That is the superblock copy, the descriptor table and its reserved
    /// growth area (when the group carries a backup), the block and inode
    /// bitmaps, and the inode table. Ranges are clipped to the volume.
    pub fn group_metadata(&self, group: u64, desc: &GroupDescriptor) -> Vec<std::ops::Range<u64>> {
        let mut ranges = Vec::with_capacity(4);

        if self.group_has_superblock(group) {
            let start = self.group_range(group).start;
            let len = self
                .desc_blocks()
                .saturating_add(1 + self.reserved_gdt_blocks as u64);
            ranges.push(start..start.saturating_add(len));
        }
        ranges.push(desc.block_bitmap..desc.block_bitmap.saturating_add(1));
        ranges.push(desc.inode_bitmap..desc.inode_bitmap.saturating_add(1));
        ranges.push(desc.inode_table..desc.inode_table.saturating_add(self.inode_table_blocks()));

        ranges
            .into_iter()
            .map(|r| r.start.min(self.blocks_count)..r.end.min(self.blocks_count))
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Block holding the first group descriptor
    pub fn group_desc_block(&self) -> u64 {
        self.first_data_block as u64 + 1
    }

    /// Block range covered by group `group`'s bitmap
    pub fn group_range(&self, group: u64) -> std::ops::Range<u64> {
        let start = self.first_data_block as u64 + group * self.blocks_per_group as u64;
        let end = (start + self.blocks_per_group as u64).min(self.blocks_count);
        start..end
    }

    /// Check the fields this tool depends on
    pub fn validate(&self) -> Result<()> {
        if self.magic != EXT_MAGIC {
            return Err(ZerofreeError::InvalidMagic(self.magic));
        }

        if self.log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(ZerofreeError::CorruptVolume(format!(
                "block size shift {} out of range",
                self.log_block_size
            )));
        }

        if self.feature_incompat & INCOMPAT_META_BG != 0 {
            return Err(ZerofreeError::UnsupportedFeature("meta_bg".into()));
        }

        if self.feature_ro_compat & RO_COMPAT_BIGALLOC != 0 {
            return Err(ZerofreeError::UnsupportedFeature("bigalloc".into()));
        }

        let bits_per_block = self.block_size() as u64 * 8;
        if self.blocks_per_group == 0
            || self.blocks_per_group % 8 != 0
            || self.blocks_per_group as u64 > bits_per_block
        {
            return Err(ZerofreeError::CorruptVolume(format!(
                "blocks per group {} does not fit a {} byte bitmap",
                self.blocks_per_group,
                self.block_size()
            )));
        }

        if self.first_data_block as u64 >= self.blocks_count {
            return Err(ZerofreeError::CorruptVolume(format!(
                "first data block {} beyond block count {}",
                self.first_data_block, self.blocks_count
            )));
        }

        if self.free_blocks_count > self.blocks_count {
            return Err(ZerofreeError::CorruptVolume(format!(
                "free blocks ({}) exceeds total blocks ({})",
                self.free_blocks_count, self.blocks_count
            )));
        }

        Ok(())
    }

    /// Decode and validate a superblock from its 1024 on-disk bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(ZerofreeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for superblock",
            )));
        }

        let feature_incompat = le_u32(bytes, S_FEATURE_INCOMPAT);
        let wide = feature_incompat & INCOMPAT_64BIT != 0;

        let mut blocks_count = le_u32(bytes, S_BLOCKS_COUNT_LO) as u64;
        let mut free_blocks_count = le_u32(bytes, S_FREE_BLOCKS_COUNT_LO) as u64;
        if wide {
            blocks_count |= (le_u32(bytes, S_BLOCKS_COUNT_HI) as u64) << 32;
            free_blocks_count |= (le_u32(bytes, S_FREE_BLOCKS_COUNT_HI) as u64) << 32;
        }

        let superblock = Superblock {
            magic: le_u16(bytes, S_MAGIC),
            blocks_count,
            free_blocks_count,
            first_data_block: le_u32(bytes, S_FIRST_DATA_BLOCK),
            log_block_size: le_u32(bytes, S_LOG_BLOCK_SIZE),
            blocks_per_group: le_u32(bytes, S_BLOCKS_PER_GROUP),
            inodes_per_group: le_u32(bytes, S_INODES_PER_GROUP),
            rev_level: le_u32(bytes, S_REV_LEVEL),
            inode_size: le_u16(bytes, S_INODE_SIZE),
            feature_compat: le_u32(bytes, S_FEATURE_COMPAT),
            feature_incompat,
            feature_ro_compat: le_u32(bytes, S_FEATURE_RO_COMPAT),
            reserved_gdt_blocks: le_u16(bytes, S_RESERVED_GDT_BLOCKS),
            desc_size: le_u16(bytes, S_DESC_SIZE),
            backup_bgs: [le_u32(bytes, S_BACKUP_BGS), le_u32(bytes, S_BACKUP_BGS + 4)],
        };

        superblock.validate()?;
        Ok(superblock)
    }

    /// Encode the decoded fields into a zeroed 1024-byte superblock
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; SUPERBLOCK_SIZE];

        put_u32(&mut bytes, S_BLOCKS_COUNT_LO, self.blocks_count as u32);
        put_u32(&mut bytes, S_FREE_BLOCKS_COUNT_LO, self.free_blocks_count as u32);
        put_u32(&mut bytes, S_FIRST_DATA_BLOCK, self.first_data_block);
        put_u32(&mut bytes, S_LOG_BLOCK_SIZE, self.log_block_size);
        put_u32(&mut bytes, S_BLOCKS_PER_GROUP, self.blocks_per_group);
        put_u32(&mut bytes, S_INODES_PER_GROUP, self.inodes_per_group);
        put_u16(&mut bytes, S_MAGIC, self.magic);
        put_u32(&mut bytes, S_REV_LEVEL, self.rev_level);
        put_u16(&mut bytes, S_INODE_SIZE, self.inode_size);
        put_u32(&mut bytes, S_FEATURE_COMPAT, self.feature_compat);
        put_u32(&mut bytes, S_FEATURE_INCOMPAT, self.feature_incompat);
        put_u32(&mut bytes, S_FEATURE_RO_COMPAT, self.feature_ro_compat);
        put_u16(&mut bytes, S_RESERVED_GDT_BLOCKS, self.reserved_gdt_blocks);
        put_u16(&mut bytes, S_DESC_SIZE, self.desc_size);
        put_u32(&mut bytes, S_BACKUP_BGS, self.backup_bgs[0]);
        put_u32(&mut bytes, S_BACKUP_BGS + 4, self.backup_bgs[1]);
        if self.is_64bit() {
            put_u32(&mut bytes, S_BLOCKS_COUNT_HI, (self.blocks_count >> 32) as u32);
            put_u32(&mut bytes, S_FREE_BLOCKS_COUNT_HI, (self.free_blocks_count >> 32) as u32);
        }

        bytes
    }
}

/// `value` is `base` raised to some power >= 1
fn is_power_of(mut value: u64, base: u64) -> bool {
    while value >= base && value % base == 0 {
        value /= base;
    }
    value == 1
}

/// The parts of a block group descriptor needed to find its bitmap and
/// metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupDescriptor {
    /// Block holding this group's block bitmap
    pub block_bitmap: u64,
    pub inode_bitmap: u64,

    /// First block of this group's inode table
    pub inode_table: u64,
    pub flags: u16,
}

impl GroupDescriptor {
    /// Decode one descriptor; `wide` selects the 64-bit layout
    pub fn from_bytes(bytes: &[u8], wide: bool) -> Self {
        let wide = wide && bytes.len() >= GROUP_DESC_SIZE_64BIT;
        let field = |lo: usize, hi: usize| {
            let value = le_u32(bytes, lo) as u64;
            if wide {
                value | (le_u32(bytes, hi) as u64) << 32
            } else {
                value
            }
        };

        GroupDescriptor {
            block_bitmap: field(BG_BLOCK_BITMAP_LO, BG_BLOCK_BITMAP_HI),
            inode_bitmap: field(BG_INODE_BITMAP_LO, BG_INODE_BITMAP_HI),
            inode_table: field(BG_INODE_TABLE_LO, BG_INODE_TABLE_HI),
            flags: le_u16(bytes, BG_FLAGS),
        }
    }

    /// Encode into a zeroed descriptor of `desc_size` bytes
    pub fn to_bytes(&self, desc_size: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; desc_size];
        put_u32(&mut bytes, BG_BLOCK_BITMAP_LO, self.block_bitmap as u32);
        put_u32(&mut bytes, BG_INODE_BITMAP_LO, self.inode_bitmap as u32);
        put_u32(&mut bytes, BG_INODE_TABLE_LO, self.inode_table as u32);
        put_u16(&mut bytes, BG_FLAGS, self.flags);
        if desc_size >= GROUP_DESC_SIZE_64BIT {
            put_u32(&mut bytes, BG_BLOCK_BITMAP_HI, (self.block_bitmap >> 32) as u32);
            put_u32(&mut bytes, BG_INODE_BITMAP_HI, (self.inode_bitmap >> 32) as u32);
            put_u32(&mut bytes, BG_INODE_TABLE_HI, (self.inode_table >> 32) as u32);
        }
        bytes
    }

    /// True when the on-disk bitmap was never initialized
    pub fn block_uninit(&self) -> bool {
        self.flags & BG_BLOCK_UNINIT != 0
    }
}

/// Decode the group descriptor table
pub fn parse_group_descriptors(superblock: &Superblock, table: &[u8]) -> Result<Vec<GroupDescriptor>> {
    let groups = superblock.group_count();
    let needed = superblock.group_desc_table_len()?;

    if (table.len() as u64) < needed {
        return Err(ZerofreeError::CorruptVolume(format!(
            "group descriptor table holds {} bytes, {} groups need {}",
            table.len(),
            groups,
            needed
        )));
    }

    let desc_size = superblock.group_desc_size();
    let groups = groups as usize;

    Ok(table
        .chunks_exact(desc_size)
        .take(groups)
        .map(|chunk| GroupDescriptor::from_bytes(chunk, superblock.is_64bit()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Superblock {
        Superblock {
            magic: EXT_MAGIC,
            blocks_count: 8192,
            free_blocks_count: 7000,
            first_data_block: 1,
            log_block_size: 0,
            blocks_per_group: 8192,
            inodes_per_group: 2048,
            rev_level: 1,
            inode_size: 256,
            feature_compat: 0,
            feature_incompat: 0,
            feature_ro_compat: 0,
            reserved_gdt_blocks: 0,
            desc_size: 0,
            backup_bgs: [0, 0],
        }
    }

    #[test]
    fn test_roundtrip_small_filesystem() {
        let sb = sample();
        let parsed = Superblock::from_bytes(&sb.to_bytes()).unwrap();
        assert_eq!(parsed, sb);
        assert_eq!(parsed.block_size(), 1024);
        assert_eq!(parsed.group_count(), 1);
        assert_eq!(parsed.group_desc_block(), 2);
        assert_eq!(parsed.group_range(0), 1..8192);
    }

    #[test]
    fn test_64bit_counts_combine_halves() {
        let mut sb = sample();
        sb.first_data_block = 0;
        sb.log_block_size = 2;
        sb.blocks_per_group = 32768;
        sb.feature_incompat = INCOMPAT_64BIT;
        sb.desc_size = 64;
        sb.blocks_count = (1u64 << 32) + 10;
        sb.free_blocks_count = 1u64 << 32;

        let parsed = Superblock::from_bytes(&sb.to_bytes()).unwrap();
        assert_eq!(parsed.blocks_count, (1u64 << 32) + 10);
        assert_eq!(parsed.free_blocks_count, 1u64 << 32);
        assert_eq!(parsed.group_desc_size(), 64);
        assert_eq!(parsed.block_size(), 4096);
    }

    #[test]
    fn test_invalid_magic() {
        let mut sb = sample();
        sb.magic = 0x1234;
        assert!(matches!(
            Superblock::from_bytes(&sb.to_bytes()),
            Err(ZerofreeError::InvalidMagic(0x1234))
        ));
    }

    #[test]
    fn test_unsupported_features() {
        let mut sb = sample();
        sb.feature_incompat = INCOMPAT_META_BG;
        assert!(matches!(sb.validate(), Err(ZerofreeError::UnsupportedFeature(_))));

        let mut sb = sample();
        sb.feature_ro_compat = RO_COMPAT_BIGALLOC;
        assert!(matches!(sb.validate(), Err(ZerofreeError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_corrupt_geometry() {
        let mut sb = sample();
        sb.blocks_per_group = 0;
        assert!(matches!(sb.validate(), Err(ZerofreeError::CorruptVolume(_))));

        let mut sb = sample();
        sb.blocks_per_group = 8193;
        assert!(matches!(sb.validate(), Err(ZerofreeError::CorruptVolume(_))));

        let mut sb = sample();
        sb.blocks_per_group = 1001;
        assert!(matches!(sb.validate(), Err(ZerofreeError::CorruptVolume(_))));

        let mut sb = sample();
        sb.free_blocks_count = 9000;
        assert!(matches!(sb.validate(), Err(ZerofreeError::CorruptVolume(_))));

        let mut sb = sample();
        sb.log_block_size = 40;
        assert!(matches!(sb.validate(), Err(ZerofreeError::CorruptVolume(_))));
    }

    #[test]
    fn test_short_buffer() {
        assert!(matches!(
            Superblock::from_bytes(&[0u8; 100]),
            Err(ZerofreeError::Io(_))
        ));
    }

    #[test]
    fn test_group_descriptors() {
        let mut sb = sample();
        sb.blocks_count = 20000;
        sb.free_blocks_count = 0;
        assert_eq!(sb.group_count(), 3);
        assert_eq!(sb.group_range(2), 16385..20000);

        let mut table = Vec::new();
        table.extend(GroupDescriptor { block_bitmap: 3, ..Default::default() }.to_bytes(32));
        table.extend(GroupDescriptor { block_bitmap: 8195, ..Default::default() }.to_bytes(32));
        table.extend(GroupDescriptor { block_bitmap: 16387, flags: BG_BLOCK_UNINIT, ..Default::default() }.to_bytes(32));

        let descs = parse_group_descriptors(&sb, &table).unwrap();
        assert_eq!(descs.len(), 3);
        assert_eq!(descs[1].block_bitmap, 8195);
        assert!(!descs[0].block_uninit());
        assert!(descs[2].block_uninit());

        assert!(matches!(
            parse_group_descriptors(&sb, &table[..64]),
            Err(ZerofreeError::CorruptVolume(_))
        ));
    }

    #[test]
    fn test_wide_descriptor_high_bits() {
        let desc = GroupDescriptor {
            block_bitmap: (7u64 << 32) | 9,
            inode_bitmap: (7u64 << 32) | 10,
            inode_table: (7u64 << 32) | 11,
            flags: 0,
        };
        let bytes = desc.to_bytes(64);
        assert_eq!(GroupDescriptor::from_bytes(&bytes, true), desc);
        // Narrow decoding ignores the high half
        let narrow = GroupDescriptor::from_bytes(&bytes, false);
        assert_eq!(narrow.block_bitmap, 9);
        assert_eq!(narrow.inode_table, 11);
    }

    #[test]
    fn test_sparse_superblock_groups() {
        let mut sb = sample();
        sb.feature_ro_compat = RO_COMPAT_SPARSE_SUPER;
        let with_super: Vec<u64> = (0..50).filter(|&g| sb.group_has_superblock(g)).collect();
        assert_eq!(with_super, vec![0, 1, 3, 5, 7, 9, 25, 27, 49]);

        sb.feature_ro_compat = 0;
        assert!((0..50).all(|g| sb.group_has_superblock(g)));

        sb.feature_compat = COMPAT_SPARSE_SUPER2;
        sb.backup_bgs = [1, 40];
        let with_super: Vec<u64> = (0..50).filter(|&g| sb.group_has_superblock(g)).collect();
        assert_eq!(with_super, vec![0, 1, 40]);
    }

    #[test]
    fn test_inode_geometry() {
        let mut sb = sample();
        // 2048 inodes of 256 bytes in 1 KiB blocks
        assert_eq!(sb.inode_table_blocks(), 512);

        sb.rev_level = 0;
        assert_eq!(sb.inode_size(), 128);
        assert_eq!(sb.inode_table_blocks(), 256);
    }

    #[test]
    fn test_group_metadata_with_backup() {
        let mut sb = sample();
        sb.blocks_count = 20000;
        sb.free_blocks_count = 0;
        sb.inodes_per_group = 16;
        sb.reserved_gdt_blocks = 3;
        sb.feature_ro_compat = RO_COMPAT_SPARSE_SUPER;
        let desc = GroupDescriptor {
            block_bitmap: 8197,
            inode_bitmap: 8198,
            inode_table: 8199,
            flags: BG_BLOCK_UNINIT,
        };

        // Superblock, 1 descriptor block, 3 reserved, bitmaps, 4-block inode table
        assert_eq!(
            sb.group_metadata(1, &desc),
            vec![8193..8198, 8197..8198, 8198..8199, 8199..8203]
        );

        // Group 2 has no backup under sparse_super
        let desc = GroupDescriptor {
            block_bitmap: 16385,
            inode_bitmap: 16386,
            inode_table: 16387,
            flags: BG_BLOCK_UNINIT,
        };
        assert_eq!(
            sb.group_metadata(2, &desc),
            vec![16385..16386, 16386..16387, 16387..16391]
        );
    }

    #[test]
    fn test_group_checksum_features() {
        let mut sb = sample();
        assert!(!sb.has_group_checksums());
        sb.feature_ro_compat = RO_COMPAT_GDT_CSUM;
        assert!(sb.has_group_checksums());
        sb.feature_ro_compat = RO_COMPAT_METADATA_CSUM | RO_COMPAT_SPARSE_SUPER;
        assert!(sb.has_group_checksums());
    }
}
