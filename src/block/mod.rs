//! Sector-addressed block devices.
//!
//! Every transfer is exactly one 512-byte sector, synchronous and unqueued.

#[cfg(target_os = "none")]
pub mod ata;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

pub use crate::constants::ata::SECTOR_SIZE;

/// One sector worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Device was never identified or is absent
    NotReady,
    /// LBA lies past the end of the device
    OutOfRange,
    /// Device stayed busy for too long
    Timeout,
    /// Device reported ERR or DF
    DeviceFault,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BlockError::NotReady => "device not ready",
            BlockError::OutOfRange => "sector out of range",
            BlockError::Timeout => "device timeout",
            BlockError::DeviceFault => "device fault",
        };
        f.write_str(msg)
    }
}

pub trait BlockDevice {
    fn read(&mut self, lba: u32, buf: &mut Sector) -> Result<(), BlockError>;
    fn write(&mut self, lba: u32, buf: &Sector) -> Result<(), BlockError>;
    fn total_sectors(&self) -> u32;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read(&mut self, lba: u32, buf: &mut Sector) -> Result<(), BlockError> {
        (**self).read(lba, buf)
    }

    fn write(&mut self, lba: u32, buf: &Sector) -> Result<(), BlockError> {
        (**self).write(lba, buf)
    }

    fn total_sectors(&self) -> u32 {
        (**self).total_sectors()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read(&mut self, lba: u32, buf: &mut Sector) -> Result<(), BlockError> {
        (**self).read(lba, buf)
    }

    fn write(&mut self, lba: u32, buf: &Sector) -> Result<(), BlockError> {
        (**self).write(lba, buf)
    }

    fn total_sectors(&self) -> u32 {
        (**self).total_sectors()
    }
}

/// In-memory disk used by the hosted build and by tests.
///
/// `fail_after` arms a fault: once that many further transfers have
/// succeeded, every read and write fails with `DeviceFault`.
pub struct RamDisk {
    data: Vec<u8>,
    sectors: u32,
    fail_after: Option<usize>,
    reads: usize,
    writes: usize,
}

impl RamDisk {
    pub fn new(sectors: u32) -> Self {
        RamDisk {
            data: vec![0; sectors as usize * SECTOR_SIZE],
            sectors,
            fail_after: None,
            reads: 0,
            writes: 0,
        }
    }

    pub fn fail_after(&mut self, transfers: usize) {
        self.fail_after = Some(transfers);
    }

    pub fn heal(&mut self) {
        self.fail_after = None;
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Raw view of a sector, bypassing fault injection.
    pub fn sector(&self, lba: u32) -> &[u8] {
        let start = lba as usize * SECTOR_SIZE;
        &self.data[start..start + SECTOR_SIZE]
    }

    pub fn sector_mut(&mut self, lba: u32) -> &mut [u8] {
        let start = lba as usize * SECTOR_SIZE;
        &mut self.data[start..start + SECTOR_SIZE]
    }

    fn check(&mut self, lba: u32) -> Result<usize, BlockError> {
        if lba >= self.sectors {
            return Err(BlockError::OutOfRange);
        }
        if let Some(left) = self.fail_after.as_mut() {
            if *left == 0 {
                return Err(BlockError::DeviceFault);
            }
            *left -= 1;
        }
        Ok(lba as usize * SECTOR_SIZE)
    }
}

impl BlockDevice for RamDisk {
    fn read(&mut self, lba: u32, buf: &mut Sector) -> Result<(), BlockError> {
        let start = self.check(lba)?;
        buf.copy_from_slice(&self.data[start..start + SECTOR_SIZE]);
        self.reads += 1;
        Ok(())
    }

    fn write(&mut self, lba: u32, buf: &Sector) -> Result<(), BlockError> {
        let start = self.check(lba)?;
        self.data[start..start + SECTOR_SIZE].copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }

    fn total_sectors(&self) -> u32 {
        self.sectors
    }
}
