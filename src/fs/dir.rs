//! Directory records: scanning, lookup and append.
//!
//! A directory's payload is a flat array of `DirRecord`s. A size that is not
//! a whole number of records is structural corruption and fails the scan.
//! Records pointing at free or out-of-range inodes are stale and skipped.

use alloc::vec;
use alloc::vec::Vec;

use zerocopy::{FromBytes, IntoBytes};

use super::layout::{DirRecord, DIR_RECORD_SIZE};
use super::{FsError, LuxFs};
use crate::block::BlockDevice;
use crate::constants::luxfs::NAME_MAX;

/// What `list` reports for each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; NAME_MAX],
    name_len: u8,
    pub inode: u32,
    pub is_dir: bool,
    pub size: u32,
}

impl DirEntry {
    pub(super) fn new(name: &[u8], inode: u32, is_dir: bool, size: u32) -> Self {
        let mut buf = [0u8; NAME_MAX];
        let len = name.len().min(NAME_MAX);
        buf[..len].copy_from_slice(&name[..len]);
        DirEntry {
            name: buf,
            name_len: len as u8,
            inode,
            is_dir,
            size,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }
}

impl<D: BlockDevice> LuxFs<D> {
    /// Every record of a directory, stale ones included.
    pub(super) fn records(&mut self, dir: u32) -> Result<Vec<DirRecord>, FsError> {
        let inode = self.inode(dir)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let size = inode.size as usize;
        if size % DIR_RECORD_SIZE != 0 {
            log::warn!("luxfs: directory {} has partial trailing record", dir);
            return Err(FsError::Corrupt);
        }

        let mut raw = vec![0u8; size];
        let read = self.read_inode(dir, 0, &mut raw)?;
        if read != size {
            return Err(FsError::Corrupt);
        }

        raw.chunks_exact(DIR_RECORD_SIZE)
            .map(|chunk| DirRecord::read_from_bytes(chunk).map_err(|_| FsError::Corrupt))
            .collect()
    }

    /// Records whose target inode is live.
    pub(super) fn live_records(&mut self, dir: u32) -> Result<Vec<DirRecord>, FsError> {
        let mut records = self.records(dir)?;
        records.retain(|rec| self.is_live(rec.inode));
        Ok(records)
    }

    pub(super) fn lookup(&mut self, dir: u32, name: &str) -> Result<Option<u32>, FsError> {
        Ok(self
            .live_records(dir)?
            .iter()
            .find(|rec| rec.name_matches(name))
            .map(|rec| rec.inode))
    }

    /// Append one record at the directory's current end.
    pub(super) fn append_record(&mut self, dir: u32, record: &DirRecord) -> Result<(), FsError> {
        let end = self.inode(dir)?.size as usize;
        if end % DIR_RECORD_SIZE != 0 {
            return Err(FsError::Corrupt);
        }
        match self.write_inode(dir, end, record.as_bytes(), false) {
            Err(FsError::FileTooLarge) => Err(FsError::NoSpace),
            other => other.map(|_| ()),
        }
    }

    pub(super) fn entry_for(&self, name: &[u8], index: u32) -> Result<DirEntry, FsError> {
        let inode = self.inode(index)?;
        Ok(DirEntry::new(name, index, inode.is_dir(), inode.size))
    }
}
