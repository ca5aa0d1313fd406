//! ATA PIO driver for the primary bus master drive.
//!
//! Polling only: no DMA, no IRQs (nIEN is set at init).

use x86_64::instructions::port::Port;

use super::{BlockDevice, BlockError, Sector};
use crate::constants::ata::*;

pub struct AtaPio {
    ready: bool,
    total_sectors: u32,
}

impl AtaPio {
    pub const fn new() -> Self {
        AtaPio {
            ready: false,
            total_sectors: 0,
        }
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Issue IDENTIFY and record the LBA28 capacity.
    pub fn init(&mut self) -> Result<(), BlockError> {
        self.ready = false;
        self.total_sectors = 0;

        unsafe {
            Port::<u8>::new(REG_CONTROL).write(CONTROL_NIEN);
        }
        delay_400ns();

        select_drive(0);
        unsafe {
            Port::<u8>::new(REG_SECCOUNT).write(0);
            Port::<u8>::new(REG_LBA0).write(0);
            Port::<u8>::new(REG_LBA1).write(0);
            Port::<u8>::new(REG_LBA2).write(0);
            Port::<u8>::new(REG_COMMAND).write(CMD_IDENTIFY);
        }

        if read_status() == 0 {
            log::warn!("ata: no drive on primary bus");
            return Err(BlockError::NotReady);
        }
        wait_not_busy()?;
        if read_status() & STATUS_ERR != 0 {
            return Err(BlockError::DeviceFault);
        }
        wait_drq()?;

        let mut data = Port::<u16>::new(REG_DATA);
        let mut identify = [0u16; 256];
        for word in identify.iter_mut() {
            *word = unsafe { data.read() };
        }

        self.total_sectors = ((identify[61] as u32) << 16) | identify[60] as u32;
        self.ready = self.total_sectors != 0;
        log::info!("ata: primary master, {} sectors", self.total_sectors);

        if self.ready {
            Ok(())
        } else {
            Err(BlockError::NotReady)
        }
    }

    fn begin(&mut self, lba: u32, command: u8) -> Result<(), BlockError> {
        if !self.ready {
            return Err(BlockError::NotReady);
        }
        if lba >= self.total_sectors {
            return Err(BlockError::OutOfRange);
        }

        select_drive(lba);
        unsafe {
            Port::<u8>::new(REG_FEATURES).write(0);
            Port::<u8>::new(REG_SECCOUNT).write(1);
            Port::<u8>::new(REG_LBA0).write(lba as u8);
            Port::<u8>::new(REG_LBA1).write((lba >> 8) as u8);
            Port::<u8>::new(REG_LBA2).write((lba >> 16) as u8);
            Port::<u8>::new(REG_COMMAND).write(command);
        }
        wait_drq()
    }
}

impl BlockDevice for AtaPio {
    fn read(&mut self, lba: u32, buf: &mut Sector) -> Result<(), BlockError> {
        self.begin(lba, CMD_READ_PIO)?;

        let mut data = Port::<u16>::new(REG_DATA);
        for pair in buf.chunks_exact_mut(2) {
            let word = unsafe { data.read() };
            pair.copy_from_slice(&word.to_le_bytes());
        }
        delay_400ns();
        Ok(())
    }

    fn write(&mut self, lba: u32, buf: &Sector) -> Result<(), BlockError> {
        self.begin(lba, CMD_WRITE_PIO)?;

        let mut data = Port::<u16>::new(REG_DATA);
        for pair in buf.chunks_exact(2) {
            unsafe { data.write(u16::from_le_bytes([pair[0], pair[1]])) };
        }
        delay_400ns();

        unsafe {
            Port::<u8>::new(REG_COMMAND).write(CMD_CACHE_FLUSH);
        }
        wait_not_busy()
    }

    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }
}

fn read_status() -> u8 {
    unsafe { Port::<u8>::new(REG_STATUS).read() }
}

/// Four alternate-status reads take roughly 400ns.
fn delay_400ns() {
    let mut alt = Port::<u8>::new(REG_ALT_STATUS);
    for _ in 0..4 {
        unsafe {
            alt.read();
        }
    }
}

fn select_drive(lba: u32) {
    unsafe {
        Port::<u8>::new(REG_DRIVE_SELECT).write(0xE0 | ((lba >> 24) & 0x0F) as u8);
    }
    delay_400ns();
}

fn wait_not_busy() -> Result<(), BlockError> {
    for _ in 0..TIMEOUT_POLLS {
        if read_status() & STATUS_BSY == 0 {
            return Ok(());
        }
    }
    Err(BlockError::Timeout)
}

fn wait_drq() -> Result<(), BlockError> {
    for _ in 0..TIMEOUT_POLLS {
        let status = read_status();
        if status & (STATUS_ERR | STATUS_DF) != 0 {
            return Err(BlockError::DeviceFault);
        }
        if status & STATUS_BSY == 0 && status & STATUS_DRQ != 0 {
            return Ok(());
        }
    }
    Err(BlockError::Timeout)
}
