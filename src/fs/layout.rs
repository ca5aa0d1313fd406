//! On-disk structures and geometry of a LUXFS volume.
//!
//! ```text
//! sector 0                superblock
//! sector 1                inode bitmap
//! sector 2                block bitmap
//! sectors 3..3+T          inode table (8 inodes per sector)
//! sectors 3+T..total      data blocks
//! ```
//!
//! Sector numbers are relative to `start_lba`. Block pointers stored in
//! inodes are indices into the data region.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::block::SECTOR_SIZE;
use crate::constants::luxfs::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub start_lba: u32,
    pub total_sectors: u32,
    pub inode_table_start: u32,
    pub inode_count: u32,
    pub data_start: u32,
    pub data_blocks: u32,
    pub root_inode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Free,
    Dir,
    File,
}

impl InodeKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(InodeKind::Free),
            1 => Some(InodeKind::Dir),
            2 => Some(InodeKind::File),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            InodeKind::Free => 0,
            InodeKind::Dir => 1,
            InodeKind::File => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Inode {
    kind: u8,
    flags: u8,
    reserved0: u16,
    pub size: u32,
    pub parent: u32,
    pub direct: [u32; DIRECT_BLOCKS],
    reserved: [u32; 4],
}

pub const INODE_SIZE: usize = core::mem::size_of::<Inode>();
pub const INODES_PER_SECTOR: usize = SECTOR_SIZE / INODE_SIZE;

impl Inode {
    pub const FREE: Inode = Inode {
        kind: 0,
        flags: 0,
        reserved0: 0,
        size: 0,
        parent: 0,
        direct: [INVALID_BLOCK; DIRECT_BLOCKS],
        reserved: [0; 4],
    };

    pub fn new(kind: InodeKind, parent: u32) -> Self {
        Inode {
            kind: kind.raw(),
            parent,
            ..Inode::FREE
        }
    }

    /// Unknown type bytes read as `Free` so stale garbage is never followed.
    pub fn kind(&self) -> InodeKind {
        InodeKind::from_raw(self.kind).unwrap_or(InodeKind::Free)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Dir
    }

    pub fn is_live(&self) -> bool {
        self.kind() != InodeKind::Free
    }
}

/// One directory entry. Directories are flat arrays of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DirRecord {
    pub inode: u32,
    name: [u8; NAME_MAX],
}

pub const DIR_RECORD_SIZE: usize = core::mem::size_of::<DirRecord>();

impl DirRecord {
    /// `name` must already be validated to fit with a trailing NUL.
    pub fn new(inode: u32, name: &str) -> Self {
        let mut buf = [0u8; NAME_MAX];
        let len = name.len().min(NAME_MAX - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        DirRecord { inode, name: buf }
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        &self.name[..len]
    }

    pub fn name_matches(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }
}

/// Size and placement of a volume on its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    start_lba: u32,
    total_sectors: u32,
    inode_count: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            start_lba: START_LBA,
            total_sectors: TOTAL_SECTORS,
            inode_count: MAX_INODES,
        }
    }
}

impl Geometry {
    /// Returns `None` if the bitmaps cannot describe the volume or no data
    /// region is left after the metadata.
    pub fn new(start_lba: u32, total_sectors: u32, inode_count: u32) -> Option<Self> {
        let bits = (SECTOR_SIZE * 8) as u32;
        let geometry = Geometry {
            start_lba,
            total_sectors,
            inode_count,
        };

        if inode_count == 0 || inode_count > bits {
            return None;
        }
        if total_sectors <= geometry.data_start() {
            return None;
        }
        if geometry.data_blocks() > bits {
            return None;
        }
        start_lba.checked_add(total_sectors)?;
        Some(geometry)
    }

    pub fn start_lba(&self) -> u32 {
        self.start_lba
    }

    pub fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    pub fn inode_count(&self) -> u32 {
        self.inode_count
    }

    pub fn inode_table_sectors(&self) -> u32 {
        self.inode_count.div_ceil(INODES_PER_SECTOR as u32)
    }

    pub fn data_start(&self) -> u32 {
        INODE_TABLE_START + self.inode_table_sectors()
    }

    pub fn data_blocks(&self) -> u32 {
        self.total_sectors.saturating_sub(self.data_start())
    }

    /// Absolute LBA of a sector relative to the volume start.
    pub fn lba(&self, sector: u32) -> u32 {
        self.start_lba + sector
    }

    /// Absolute LBA of a data block.
    pub fn block_lba(&self, block: u32) -> u32 {
        self.start_lba + self.data_start() + block
    }

    pub fn superblock(&self) -> Superblock {
        Superblock {
            magic: MAGIC,
            version: VERSION,
            block_size: SECTOR_SIZE as u32,
            start_lba: self.start_lba,
            total_sectors: self.total_sectors,
            inode_table_start: INODE_TABLE_START,
            inode_count: self.inode_count,
            data_start: self.data_start(),
            data_blocks: self.data_blocks(),
            root_inode: 0,
        }
    }

    pub fn matches(&self, sb: &Superblock) -> bool {
        *sb == self.superblock()
    }
}
