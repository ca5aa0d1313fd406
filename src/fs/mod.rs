//! LUXFS: inode table, two bitmaps and flat directories on raw sectors.
//!
//! Every metadata change is written through before the call returns: an
//! allocation or free flushes its bitmap sector, an inode change flushes the
//! one inode-table sector holding it. A crash may leak a block but never
//! hands one out twice.

mod bitmap;
mod dir;
mod error;
mod layout;
pub mod path;

use alloc::vec::Vec;

use zerocopy::{FromBytes, IntoBytes};

use crate::block::{BlockDevice, Sector, SECTOR_SIZE};
use crate::constants::luxfs::*;

pub use bitmap::Bitmap;
pub use dir::DirEntry;
pub use error::FsError;
pub use layout::{Geometry, Inode, InodeKind, Superblock};

use layout::{DirRecord, INODES_PER_SECTOR, INODE_SIZE};

const ROOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub inode: u32,
    pub is_dir: bool,
    pub size: u32,
}

/// Allocation counters for `meminfo`-style reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub inodes_used: u32,
    pub inodes_total: u32,
    pub blocks_used: u32,
    pub blocks_total: u32,
}

pub struct LuxFs<D: BlockDevice> {
    device: D,
    geometry: Geometry,
    mounted: bool,
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
    inodes: Vec<Inode>,
}

impl<D: BlockDevice> LuxFs<D> {
    pub fn new(device: D) -> Self {
        Self::with_geometry(device, Geometry::default())
    }

    pub fn with_geometry(device: D, geometry: Geometry) -> Self {
        LuxFs {
            device,
            geometry,
            mounted: false,
            inode_bitmap: Bitmap::new(geometry.inode_count()),
            block_bitmap: Bitmap::new(geometry.data_blocks()),
            inodes: Vec::new(),
        }
    }

    pub fn ready(&self) -> bool {
        self.mounted
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Load the volume, formatting it if the superblock does not match.
    ///
    /// Calling this on a mounted filesystem does nothing.
    pub fn mount(&mut self) -> Result<(), FsError> {
        if self.mounted {
            return Ok(());
        }

        let g = self.geometry;
        let end = g.start_lba() as u64 + g.total_sectors() as u64;
        if (self.device.total_sectors() as u64) < end {
            log::warn!(
                "luxfs: device has {} sectors, volume needs {}",
                self.device.total_sectors(),
                end
            );
            return Err(FsError::NoSpace);
        }

        match self.load() {
            Ok(()) => log::info!("luxfs: mounted volume at lba {}", g.start_lba()),
            Err(err) => {
                log::info!("luxfs: no valid volume ({}), formatting", err);
                self.format()?;
            }
        }
        self.mounted = true;
        Ok(())
    }

    fn load(&mut self) -> Result<(), FsError> {
        let g = self.geometry;
        let mut sector = [0u8; SECTOR_SIZE];

        self.device.read(g.lba(SUPER_BLOCK), &mut sector)?;
        let (sb, _) = Superblock::read_from_prefix(&sector).map_err(|_| FsError::Corrupt)?;
        if !g.matches(&sb) {
            return Err(FsError::Corrupt);
        }

        self.device.read(g.lba(INODE_BITMAP_BLOCK), &mut sector)?;
        let inode_bitmap = Bitmap::from_sector(&sector, g.inode_count());
        self.device.read(g.lba(BLOCK_BITMAP_BLOCK), &mut sector)?;
        let block_bitmap = Bitmap::from_sector(&sector, g.data_blocks());

        let mut inodes = Vec::with_capacity(g.inode_count() as usize);
        for table_sector in 0..g.inode_table_sectors() {
            self.device
                .read(g.lba(INODE_TABLE_START + table_sector), &mut sector)?;
            for chunk in sector.chunks_exact(INODE_SIZE).take(INODES_PER_SECTOR) {
                if inodes.len() == g.inode_count() as usize {
                    break;
                }
                inodes.push(Inode::read_from_bytes(chunk).map_err(|_| FsError::Corrupt)?);
            }
        }

        if !inodes[ROOT as usize].is_dir() || !inode_bitmap.is_set(ROOT) {
            return Err(FsError::Corrupt);
        }

        self.inode_bitmap = inode_bitmap;
        self.block_bitmap = block_bitmap;
        self.inodes = inodes;
        Ok(())
    }

    /// Write a fresh, empty volume containing only the root directory.
    fn format(&mut self) -> Result<(), FsError> {
        let g = self.geometry;

        self.inode_bitmap = Bitmap::new(g.inode_count());
        self.block_bitmap = Bitmap::new(g.data_blocks());
        self.inodes = alloc::vec![Inode::FREE; g.inode_count() as usize];
        self.inode_bitmap.set(ROOT);
        self.inodes[ROOT as usize] = Inode::new(InodeKind::Dir, ROOT);

        let mut sector = [0u8; SECTOR_SIZE];
        let sb = g.superblock();
        sector[..sb.as_bytes().len()].copy_from_slice(sb.as_bytes());
        self.device.write(g.lba(SUPER_BLOCK), &sector)?;
        self.flush_inode_bitmap()?;
        self.flush_block_bitmap()?;
        for table_sector in 0..g.inode_table_sectors() {
            self.flush_inode_sector(table_sector)?;
        }

        log::info!(
            "luxfs: formatted {} inodes, {} data blocks",
            g.inode_count(),
            g.data_blocks()
        );
        Ok(())
    }

    pub fn usage(&self) -> FsUsage {
        FsUsage {
            inodes_used: self.inode_bitmap.count_set(),
            inodes_total: self.inode_bitmap.len(),
            blocks_used: self.block_bitmap.count_set(),
            blocks_total: self.block_bitmap.len(),
        }
    }

    // ---------------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------------

    /// Create an empty file, or succeed if a file already exists there.
    pub fn touch(&mut self, path: &str) -> Result<(), FsError> {
        self.check_ready()?;
        match self.resolve(path) {
            Ok(index) if self.inode(index)?.is_dir() => Err(FsError::IsADirectory),
            Ok(_) => Ok(()),
            Err(FsError::NotFound) => self.create(path, InodeKind::File),
            Err(err) => Err(err),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        self.check_ready()?;
        match self.resolve(path) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => self.create(path, InodeKind::Dir),
            Err(err) => Err(err),
        }
    }

    /// Call `f` for a file itself, or once per live entry of a directory.
    pub fn list<F: FnMut(&DirEntry)>(&mut self, path: &str, mut f: F) -> Result<(), FsError> {
        self.check_ready()?;
        let index = self.resolve(path)?;
        let inode = self.inode(index)?;
        if !inode.is_dir() {
            f(&self.entry_for(path::basename(path).as_bytes(), index)?);
            return Ok(());
        }

        for record in self.live_records(index)? {
            f(&self.entry_for(record.name_bytes(), record.inode)?);
        }
        Ok(())
    }

    pub fn stat(&mut self, path: &str) -> Result<FileStat, FsError> {
        self.check_ready()?;
        let index = self.resolve(path)?;
        let inode = self.inode(index)?;
        Ok(FileStat {
            inode: index,
            is_dir: inode.is_dir(),
            size: inode.size,
        })
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Reading at or past the end of file returns `Ok(0)`.
    pub fn read(&mut self, path: &str, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        self.check_ready()?;
        let index = self.resolve(path)?;
        if self.inode(index)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.read_inode(index, offset, buf)
    }

    /// Write `data` at `offset`, optionally truncating the file first.
    ///
    /// Files are capped at `MAX_FILE_SIZE`; a write crossing that limit is
    /// rejected before anything changes on disk.
    pub fn write(
        &mut self,
        path: &str,
        offset: usize,
        data: &[u8],
        truncate: bool,
    ) -> Result<usize, FsError> {
        self.check_ready()?;
        let index = self.resolve(path)?;
        if self.inode(index)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.write_inode(index, offset, data, truncate)
    }

    // ---------------------------------------------------------------------
    // Path resolution
    // ---------------------------------------------------------------------

    fn check_ready(&self) -> Result<(), FsError> {
        if self.mounted {
            Ok(())
        } else {
            Err(FsError::NotReady)
        }
    }

    fn resolve(&mut self, path: &str) -> Result<u32, FsError> {
        let parts = path::components(path)?;
        self.walk(&parts)
    }

    fn walk(&mut self, parts: &[&str]) -> Result<u32, FsError> {
        let mut current = ROOT;
        for &part in parts {
            let inode = self.inode(current)?;
            if !inode.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = if part == ".." {
                inode.parent
            } else {
                self.lookup(current, part)?.ok_or(FsError::NotFound)?
            };
        }
        Ok(current)
    }

    fn create(&mut self, path: &str, kind: InodeKind) -> Result<(), FsError> {
        let leaf = path::leaf_name(path)?;
        let parts = path::components(path)?;
        let parent = self.walk(&parts[..parts.len().saturating_sub(1)])?;
        if !self.inode(parent)?.is_dir() {
            return Err(FsError::NotADirectory);
        }

        let index = self.alloc_inode(kind, parent)?;
        if let Err(err) = self.append_record(parent, &DirRecord::new(index, leaf)) {
            log::warn!("luxfs: could not link {}: {}", path, err);
            // Best effort; the caller sees the link error.
            let _ = self.release_inode(index);
            return Err(err);
        }
        log::debug!("luxfs: created {} as inode {}", path, index);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inode data
    // ---------------------------------------------------------------------

    fn inode(&self, index: u32) -> Result<Inode, FsError> {
        self.inodes
            .get(index as usize)
            .copied()
            .ok_or(FsError::Corrupt)
    }

    fn is_live(&self, index: u32) -> bool {
        self.inodes
            .get(index as usize)
            .is_some_and(|inode| inode.is_live())
    }

    fn block_of(&self, inode: &Inode, block_index: usize) -> Result<u32, FsError> {
        let block = *inode.direct.get(block_index).ok_or(FsError::Corrupt)?;
        if block == INVALID_BLOCK || block >= self.geometry.data_blocks() {
            log::warn!("luxfs: bad block pointer {:#x}", block);
            return Err(FsError::Corrupt);
        }
        Ok(block)
    }

    fn read_inode(&mut self, index: u32, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let inode = self.inode(index)?;
        let size = inode.size as usize;
        if offset >= size {
            return Ok(0);
        }
        let len = buf.len().min(size - offset);

        let mut sector = [0u8; SECTOR_SIZE];
        let mut done = 0;
        while done < len {
            let pos = offset + done;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(len - done);
            let block = self.block_of(&inode, pos / SECTOR_SIZE)?;

            self.device.read(self.geometry.block_lba(block), &mut sector)?;
            buf[done..done + chunk].copy_from_slice(&sector[within..within + chunk]);
            done += chunk;
        }
        Ok(len)
    }

    fn write_inode(
        &mut self,
        index: u32,
        offset: usize,
        data: &[u8],
        truncate: bool,
    ) -> Result<usize, FsError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge)?;
        let size = self.inode(index)?.size as usize;
        if (truncate && offset != 0) || (!truncate && offset > size) {
            return Err(FsError::InvalidOffset);
        }

        if truncate {
            // The inode must stop pointing at its blocks on disk before the
            // bitmap hands them out again.
            let saved = self.inodes[index as usize];
            let blocks = self.detach_blocks(index);
            if let Err(err) = self.flush_inode(index) {
                self.inodes[index as usize] = saved;
                return Err(err);
            }
            self.free_blocks(&blocks)?;
        }

        let result = self.write_blocks(index, offset, data);
        if result.is_ok() {
            let inode = &mut self.inodes[index as usize];
            inode.size = inode.size.max(end as u32);
        }
        // Block pointers may have changed even if the data write failed.
        let flushed = self.flush_inode(index);
        result?;
        flushed?;
        Ok(data.len())
    }

    fn write_blocks(&mut self, index: u32, offset: usize, data: &[u8]) -> Result<(), FsError> {
        let mut sector: Sector = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < data.len() {
            let pos = offset + done;
            let slot = pos / SECTOR_SIZE;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(data.len() - done);

            let mut block = self.inodes[index as usize].direct[slot];
            let fresh = block == INVALID_BLOCK;
            if fresh {
                block = self.alloc_block()?;
                self.inodes[index as usize].direct[slot] = block;
            } else if block >= self.geometry.data_blocks() {
                return Err(FsError::Corrupt);
            }

            let lba = self.geometry.block_lba(block);
            if fresh {
                sector.fill(0);
            } else if chunk < SECTOR_SIZE {
                self.device.read(lba, &mut sector)?;
            }
            sector[within..within + chunk].copy_from_slice(&data[done..done + chunk]);
            self.device.write(lba, &sector)?;
            done += chunk;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    fn alloc_inode(&mut self, kind: InodeKind, parent: u32) -> Result<u32, FsError> {
        let Some(index) = self.inode_bitmap.alloc() else {
            log::warn!("luxfs: inode table exhausted");
            return Err(FsError::NoInodes);
        };
        if let Err(err) = self.flush_inode_bitmap() {
            self.inode_bitmap.clear(index);
            return Err(err);
        }
        self.inodes[index as usize] = Inode::new(kind, parent);
        self.flush_inode(index)?;
        Ok(index)
    }

    /// Drop an inode and its blocks. In-memory state is always updated;
    /// the first flush error is reported.
    fn release_inode(&mut self, index: u32) -> Result<(), FsError> {
        if index == ROOT {
            return Err(FsError::InvalidPath);
        }
        let blocks = self.detach_blocks(index);
        self.inodes[index as usize] = Inode::FREE;
        let inode = self.flush_inode(index);
        let freed = self.free_blocks(&blocks);
        self.inode_bitmap.free(index);
        let bitmap = self.flush_inode_bitmap();
        inode.and(freed).and(bitmap)
    }

    fn alloc_block(&mut self) -> Result<u32, FsError> {
        let Some(block) = self.block_bitmap.alloc() else {
            log::warn!("luxfs: data region exhausted");
            return Err(FsError::NoSpace);
        };
        if let Err(err) = self.flush_block_bitmap() {
            self.block_bitmap.clear(block);
            return Err(err);
        }
        Ok(block)
    }

    /// Clear an inode's block pointers and size in memory, returning the blocks.
    fn detach_blocks(&mut self, index: u32) -> [u32; DIRECT_BLOCKS] {
        let inode = &mut self.inodes[index as usize];
        let blocks = inode.direct;
        inode.direct = [INVALID_BLOCK; DIRECT_BLOCKS];
        inode.size = 0;
        blocks
    }

    /// Return detached blocks to the bitmap. A failed flush leaks them on
    /// disk; they are never left both free and referenced.
    fn free_blocks(&mut self, blocks: &[u32]) -> Result<(), FsError> {
        let mut freed = false;
        for &block in blocks.iter().filter(|&&b| b != INVALID_BLOCK) {
            freed |= self.block_bitmap.free(block);
        }
        if freed {
            self.flush_block_bitmap()
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------------
    // Metadata flushing
    // ---------------------------------------------------------------------

    fn flush_inode_bitmap(&mut self) -> Result<(), FsError> {
        let lba = self.geometry.lba(INODE_BITMAP_BLOCK);
        self.device.write(lba, self.inode_bitmap.as_sector())?;
        Ok(())
    }

    fn flush_block_bitmap(&mut self) -> Result<(), FsError> {
        let lba = self.geometry.lba(BLOCK_BITMAP_BLOCK);
        self.device.write(lba, self.block_bitmap.as_sector())?;
        Ok(())
    }

    fn flush_inode(&mut self, index: u32) -> Result<(), FsError> {
        self.flush_inode_sector(index / INODES_PER_SECTOR as u32)
    }

    fn flush_inode_sector(&mut self, table_sector: u32) -> Result<(), FsError> {
        let mut sector = [0u8; SECTOR_SIZE];
        let first = table_sector as usize * INODES_PER_SECTOR;
        let last = (first + INODES_PER_SECTOR).min(self.inodes.len());
        for (slot, inode) in self.inodes[first..last].iter().enumerate() {
            let at = slot * INODE_SIZE;
            sector[at..at + INODE_SIZE].copy_from_slice(inode.as_bytes());
        }
        let lba = self.geometry.lba(INODE_TABLE_START + table_sector);
        self.device.write(lba, &sector)?;
        Ok(())
    }
}
