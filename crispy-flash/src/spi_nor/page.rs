// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Page-program SPI NOR driver (Winbond W25Q, Macronix MX25L, GigaDevice GD25Q).

use embedded_hal::spi::SpiDevice;

use super::{opcode, ChipInfo, Family, SpiNor, PAGE_SIZE, SECTOR_SIZE};
use crate::device::{check_range, FlashDevice};
use crate::error::FlashError;
use crate::watchdog::Watchdog;

pub struct PageFlash<S, W> {
    nor: SpiNor<S, W>,
    chip: Option<ChipInfo>,
}

impl<S: SpiDevice, W: Watchdog> PageFlash<S, W> {
    pub fn new(nor: SpiNor<S, W>) -> Self {
        Self { nor, chip: None }
    }

    pub fn nor(&self) -> &SpiNor<S, W> {
        &self.nor
    }

    pub fn nor_mut(&mut self) -> &mut SpiNor<S, W> {
        &mut self.nor
    }

    pub fn release(self) -> SpiNor<S, W> {
        self.nor
    }

    pub fn chip(&self) -> Option<ChipInfo> {
        self.chip
    }

    fn opened(&self) -> Result<ChipInfo, FlashError> {
        self.chip.ok_or(FlashError::NotOpen)
    }
}

impl<S: SpiDevice, W: Watchdog> FlashDevice for PageFlash<S, W> {
    fn open(&mut self) -> Result<(), FlashError> {
        if self.chip.is_some() {
            return Ok(());
        }
        let chip = self.nor.probe(Family::PageProgram)?;
        self.nor.unprotect(false)?;
        self.chip = Some(chip);
        Ok(())
    }

    fn close(&mut self) {
        self.chip = None;
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        let chip = self.opened()?;
        self.nor.erase_range(&chip, from, to)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let chip = self.opened()?;
        check_range(0, chip.capacity, addr, buf.len())?;
        self.nor.read(addr, buf)
    }

    /// One page-program command per page touched. The destination must
    /// already be erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let chip = self.opened()?;
        check_range(0, chip.capacity, addr, data.len())?;

        let mut addr = addr;
        let mut remaining = data;
        while !remaining.is_empty() {
            let room = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
            let (chunk, rest) = remaining.split_at(room.min(remaining.len()));

            self.nor.write_enable()?;
            self.nor.program(opcode::PROGRAM, addr, chunk)?;
            self.nor.wait_idle()?;
            self.nor.watchdog().periodic();

            addr += chunk.len() as u32;
            remaining = rest;
        }
        Ok(())
    }

    fn sector_size(&self) -> i32 {
        self.chip.map_or(0, |_| SECTOR_SIZE as i32)
    }

    fn sector_count(&self) -> i32 {
        self.chip.map_or(0, |chip| chip.sector_count() as i32)
    }

    fn page_size(&self) -> i32 {
        self.chip.map_or(0, |_| PAGE_SIZE as i32)
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        self.opened()?;
        self.nor.chip_erase(opcode::CHIP_ERASE)
    }
}
