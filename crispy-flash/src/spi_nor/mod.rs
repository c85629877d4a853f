// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! External SPI NOR flash.
//!
//! Two command families are supported, both behind [`FlashDevice`]:
//! - [`Sst25Flash`]: SST25VF parts, Auto Address Increment word programming
//! - [`PageFlash`]: JEDEC page-program parts (Winbond, Macronix, GigaDevice)
//!
//! [`ExternalFlash::probe`] reads the JEDEC ID and picks the right driver.
//! Neither family erases inside `write`: the destination must be erased first.

mod page;
mod sst25;

pub use page::PageFlash;
pub use sst25::Sst25Flash;

use embedded_hal::spi::{Operation, SpiDevice};

use crate::device::{align_down, align_up, check_range, FlashDevice};
use crate::error::FlashError;
use crate::watchdog::{wait_ready, PollPolicy, Watchdog};

/// SPI NOR opcodes used by both families.
pub mod opcode {
    pub const READ: u8 = 0x03;
    pub const PROGRAM: u8 = 0x02;
    pub const AAI_WORD_PROGRAM: u8 = 0xAD;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const READ_STATUS: u8 = 0x05;
    pub const WRITE_STATUS: u8 = 0x01;
    pub const ENABLE_WRITE_STATUS: u8 = 0x50;
    pub const JEDEC_ID: u8 = 0x9F;
    pub const ERASE_4K: u8 = 0x20;
    pub const ERASE_32K: u8 = 0x52;
    pub const ERASE_64K: u8 = 0xD8;
    pub const CHIP_ERASE_SST: u8 = 0x60;
    pub const CHIP_ERASE: u8 = 0xC7;
}

pub const STATUS_BUSY: u8 = 0x01;

pub const SECTOR_SIZE: u32 = 4 * 1024;
pub const PAGE_SIZE: u32 = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

/// Programming algorithm of a chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Family {
    /// Byte program + AAI word program, no pages.
    Sst25Aai,
    /// 256-byte page program.
    PageProgram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    pub id: JedecId,
    pub family: Family,
    /// Size in bytes.
    pub capacity: u32,
}

impl ChipInfo {
    pub const fn sector_count(&self) -> u32 {
        self.capacity / SECTOR_SIZE
    }
}

const MFR_SST: u8 = 0xBF;
const MFR_WINBOND: u8 = 0xEF;
const MFR_MACRONIX: u8 = 0xC2;
const MFR_GIGADEVICE: u8 = 0xC8;

/// Look up a JEDEC ID in the supported chip table.
pub fn identify(id: JedecId) -> Option<ChipInfo> {
    let (family, capacity) = match (id.manufacturer, id.memory_type, id.capacity) {
        // SST25VF040B / 080B / 016B / 032B
        (MFR_SST, 0x25, 0x8D) => (Family::Sst25Aai, 512 * 1024),
        (MFR_SST, 0x25, 0x8E) => (Family::Sst25Aai, 1024 * 1024),
        (MFR_SST, 0x25, 0x41) => (Family::Sst25Aai, 2 * 1024 * 1024),
        (MFR_SST, 0x25, 0x4A) => (Family::Sst25Aai, 4 * 1024 * 1024),
        // Capacity byte is log2(size) for these vendors: 512 KiB .. 16 MiB
        (MFR_WINBOND | MFR_MACRONIX | MFR_GIGADEVICE, _, cap @ 0x13..=0x18) => {
            (Family::PageProgram, 1u32 << cap)
        }
        _ => return None,
    };

    Some(ChipInfo {
        id,
        family,
        capacity,
    })
}

/// Erase primitive chosen for one step of a range erase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseBlock {
    Block64K,
    Block32K,
    Sector4K,
}

impl EraseBlock {
    pub const fn size(self) -> u32 {
        match self {
            EraseBlock::Block64K => 64 * 1024,
            EraseBlock::Block32K => 32 * 1024,
            EraseBlock::Sector4K => SECTOR_SIZE,
        }
    }

    pub const fn opcode(self) -> u8 {
        match self {
            EraseBlock::Block64K => opcode::ERASE_64K,
            EraseBlock::Block32K => opcode::ERASE_32K,
            EraseBlock::Sector4K => opcode::ERASE_4K,
        }
    }

    /// Largest block that starts at `addr` and does not run past `end`.
    /// `addr` must be 4K aligned.
    pub fn largest_fit(addr: u32, end: u32) -> Self {
        let remaining = end - addr;
        [EraseBlock::Block64K, EraseBlock::Block32K]
            .into_iter()
            .find(|block| addr % block.size() == 0 && remaining >= block.size())
            .unwrap_or(EraseBlock::Sector4K)
    }
}

/// Command layer shared by both families: one chip on one [`SpiDevice`].
pub struct SpiNor<S, W> {
    spi: S,
    watchdog: W,
    policy: PollPolicy,
}

impl<S: SpiDevice, W: Watchdog> SpiNor<S, W> {
    pub fn new(spi: S, watchdog: W) -> Self {
        Self {
            spi,
            watchdog,
            policy: PollPolicy::unbounded(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spi(&self) -> &S {
        &self.spi
    }

    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    pub fn release(self) -> S {
        self.spi
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn read_jedec_id(&mut self) -> Result<JedecId, FlashError> {
        let mut id = [0u8; 3];
        self.spi
            .transaction(&mut [
                Operation::Write(&[opcode::JEDEC_ID]),
                Operation::Read(&mut id),
            ])
            .map_err(|_| FlashError::ReadFailed)?;
        Ok(JedecId {
            manufacturer: id[0],
            memory_type: id[1],
            capacity: id[2],
        })
    }

    /// Read the JEDEC ID and require a chip of `family`.
    pub fn probe(&mut self, family: Family) -> Result<ChipInfo, FlashError> {
        let id = self.read_jedec_id()?;
        match identify(id) {
            Some(chip) if chip.family == family => {
                debug!(
                    "spi-nor: JEDEC {:02x} {:02x} {:02x}, {} bytes",
                    id.manufacturer,
                    id.memory_type,
                    id.capacity,
                    chip.capacity
                );
                Ok(chip)
            }
            _ => {
                warn!(
                    "spi-nor: unsupported JEDEC ID {:02x} {:02x} {:02x}",
                    id.manufacturer,
                    id.memory_type,
                    id.capacity
                );
                Err(FlashError::UnsupportedDevice)
            }
        }
    }

    pub fn read_status(&mut self) -> Result<u8, FlashError> {
        read_status(&mut self.spi)
    }

    /// Send a single-byte instruction.
    pub fn command(&mut self, op: u8) -> Result<(), FlashError> {
        self.spi.write(&[op]).map_err(|_| FlashError::WriteFailed)
    }

    pub fn write_enable(&mut self) -> Result<(), FlashError> {
        self.command(opcode::WRITE_ENABLE)
    }

    /// Spin on the status register busy bit.
    pub fn wait_idle(&mut self) -> Result<(), FlashError> {
        let spi = &mut self.spi;
        wait_ready(&self.watchdog, &self.policy, || {
            read_status(spi).map(|status| status & STATUS_BUSY == 0)
        })
    }

    /// Clear the block protection bits. `ewsr` selects the SST unlock sequence.
    pub fn unprotect(&mut self, ewsr: bool) -> Result<(), FlashError> {
        if ewsr {
            self.command(opcode::ENABLE_WRITE_STATUS)?;
        } else {
            self.write_enable()?;
        }
        self.spi
            .write(&[opcode::WRITE_STATUS, 0x00])
            .map_err(|_| FlashError::WriteFailed)?;
        self.wait_idle()
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if buf.is_empty() {
            return Ok(());
        }
        let [a2, a1, a0] = address_bytes(addr);
        self.spi
            .transaction(&mut [
                Operation::Write(&[opcode::READ, a2, a1, a0]),
                Operation::Read(buf),
            ])
            .map_err(|_| FlashError::ReadFailed)
    }

    /// Issue `op` with a 24-bit address followed by `data`, within one chip select.
    pub fn program(&mut self, op: u8, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let [a2, a1, a0] = address_bytes(addr);
        self.spi
            .transaction(&mut [Operation::Write(&[op, a2, a1, a0]), Operation::Write(data)])
            .map_err(|_| FlashError::WriteFailed)
    }

    /// Raw write of an instruction frame.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), FlashError> {
        self.spi.write(frame).map_err(|_| FlashError::WriteFailed)
    }

    fn erase_block(&mut self, block: EraseBlock, addr: u32) -> Result<(), FlashError> {
        trace!("spi-nor: erase {} bytes at 0x{:06x}", block.size(), addr);
        let [a2, a1, a0] = address_bytes(addr);
        self.write_enable().map_err(|_| FlashError::EraseFailed)?;
        self.spi
            .write(&[block.opcode(), a2, a1, a0])
            .map_err(|_| FlashError::EraseFailed)?;
        self.wait_idle()?;
        self.watchdog.periodic();
        Ok(())
    }

    /// Erase every sector overlapping `[from, to)` with as few commands as possible.
    pub fn erase_range(&mut self, chip: &ChipInfo, from: u32, to: u32) -> Result<(), FlashError> {
        if to <= from {
            return Ok(());
        }
        check_range(0, chip.capacity, from, (to - from) as usize)?;

        let mut addr = align_down(from, SECTOR_SIZE);
        let end = align_up(to, SECTOR_SIZE);
        while addr < end {
            let block = EraseBlock::largest_fit(addr, end);
            self.erase_block(block, addr)?;
            addr += block.size();
        }
        Ok(())
    }

    pub fn chip_erase(&mut self, op: u8) -> Result<(), FlashError> {
        info!("spi-nor: chip erase");
        self.write_enable().map_err(|_| FlashError::EraseFailed)?;
        self.command(op).map_err(|_| FlashError::EraseFailed)?;
        self.wait_idle()?;
        self.watchdog.periodic();
        Ok(())
    }
}

fn read_status<S: SpiDevice>(spi: &mut S) -> Result<u8, FlashError> {
    let mut status = [0u8; 1];
    spi.transaction(&mut [
        Operation::Write(&[opcode::READ_STATUS]),
        Operation::Read(&mut status),
    ])
    .map_err(|_| FlashError::ReadFailed)?;
    Ok(status[0])
}

pub(crate) fn address_bytes(addr: u32) -> [u8; 3] {
    let [_, a2, a1, a0] = addr.to_be_bytes();
    [a2, a1, a0]
}

/// Whichever family driver matches the fitted chip.
pub enum ExternalFlash<S, W> {
    Sst25(Sst25Flash<S, W>),
    Page(PageFlash<S, W>),
}

impl<S: SpiDevice, W: Watchdog> ExternalFlash<S, W> {
    /// Read the JEDEC ID and wrap the bus in the matching driver.
    pub fn probe(mut nor: SpiNor<S, W>) -> Result<Self, FlashError> {
        let id = nor.read_jedec_id()?;
        match identify(id).map(|chip| chip.family) {
            Some(Family::Sst25Aai) => Ok(Self::Sst25(Sst25Flash::new(nor))),
            Some(Family::PageProgram) => Ok(Self::Page(PageFlash::new(nor))),
            None => {
                warn!(
                    "spi-nor: no driver for JEDEC ID {:02x} {:02x} {:02x}",
                    id.manufacturer,
                    id.memory_type,
                    id.capacity
                );
                Err(FlashError::UnsupportedDevice)
            }
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Self::Sst25(_) => Family::Sst25Aai,
            Self::Page(_) => Family::PageProgram,
        }
    }

    /// Command layer of the wrapped driver.
    pub fn nor_mut(&mut self) -> &mut SpiNor<S, W> {
        match self {
            Self::Sst25(flash) => flash.nor_mut(),
            Self::Page(flash) => flash.nor_mut(),
        }
    }

    fn inner(&self) -> &dyn FlashDevice {
        match self {
            Self::Sst25(flash) => flash,
            Self::Page(flash) => flash,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FlashDevice {
        match self {
            Self::Sst25(flash) => flash,
            Self::Page(flash) => flash,
        }
    }
}

impl<S: SpiDevice, W: Watchdog> FlashDevice for ExternalFlash<S, W> {
    fn open(&mut self) -> Result<(), FlashError> {
        self.inner_mut().open()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        self.inner_mut().erase(from, to)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.inner_mut().read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.inner_mut().write(addr, data)
    }

    fn sector_size(&self) -> i32 {
        self.inner().sector_size()
    }

    fn sector_count(&self) -> i32 {
        self.inner().sector_count()
    }

    fn page_size(&self) -> i32 {
        self.inner().page_size()
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        self.inner_mut().erase_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_sst() {
        let chip = identify(JedecId {
            manufacturer: 0xBF,
            memory_type: 0x25,
            capacity: 0x41,
        })
        .unwrap();
        assert_eq!(chip.family, Family::Sst25Aai);
        assert_eq!(chip.capacity, 2 * 1024 * 1024);
        assert_eq!(chip.sector_count(), 512);
    }

    #[test]
    fn test_identify_winbond() {
        let chip = identify(JedecId {
            manufacturer: 0xEF,
            memory_type: 0x40,
            capacity: 0x15,
        })
        .unwrap();
        assert_eq!(chip.family, Family::PageProgram);
        assert_eq!(chip.capacity, 2 * 1024 * 1024);
    }

    #[test]
    fn test_identify_unknown() {
        assert!(identify(JedecId {
            manufacturer: 0xFF,
            memory_type: 0xFF,
            capacity: 0xFF,
        })
        .is_none());
        assert!(identify(JedecId {
            manufacturer: 0xBF,
            memory_type: 0x26,
            capacity: 0x41,
        })
        .is_none());
    }

    #[test]
    fn test_largest_fit() {
        assert_eq!(EraseBlock::largest_fit(0, 0x10000), EraseBlock::Block64K);
        assert_eq!(EraseBlock::largest_fit(0, 0xF000), EraseBlock::Block32K);
        assert_eq!(EraseBlock::largest_fit(0x8000, 0x20000), EraseBlock::Block32K);
        assert_eq!(EraseBlock::largest_fit(0x1000, 0x20000), EraseBlock::Sector4K);
        assert_eq!(EraseBlock::largest_fit(0x10000, 0x11000), EraseBlock::Sector4K);
    }

    #[test]
    fn test_address_bytes() {
        assert_eq!(address_bytes(0x0012_3456), [0x12, 0x34, 0x56]);
    }
}
