// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! SST25VF driver: byte program plus Auto Address Increment word program.
//!
//! AAI programs two bytes per cycle at an even address, so a write is split
//! into an optional odd leading byte, an AAI run of whole words, and an
//! optional trailing byte. The chip has no page concept.

use embedded_hal::spi::SpiDevice;

use super::{address_bytes, opcode, ChipInfo, Family, SpiNor, SECTOR_SIZE};
use crate::device::{check_range, FlashDevice, NO_PAGE};
use crate::error::FlashError;
use crate::watchdog::Watchdog;

/// Words programmed between watchdog services during an AAI run.
const AAI_WORDS_PER_SERVICE: usize = 128;

pub struct Sst25Flash<S, W> {
    nor: SpiNor<S, W>,
    chip: Option<ChipInfo>,
}

impl<S: SpiDevice, W: Watchdog> Sst25Flash<S, W> {
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

    fn byte_program(&mut self, addr: u32, byte: u8) -> Result<(), FlashError> {
        self.nor.write_enable()?;
        self.nor.program(opcode::PROGRAM, addr, &[byte])?;
        self.nor.wait_idle()
    }

    /// Program `words` (even length) at even `addr` in one AAI sequence.
    fn aai_program(&mut self, addr: u32, words: &[u8]) -> Result<(), FlashError> {
        let mut pairs = words.chunks_exact(2);
        let Some(first) = pairs.next() else {
            return Ok(());
        };

        self.nor.write_enable()?;
        let [a2, a1, a0] = address_bytes(addr);
        self.nor
            .write_frame(&[opcode::AAI_WORD_PROGRAM, a2, a1, a0, first[0], first[1]])?;
        self.nor.wait_idle()?;

        for (i, pair) in pairs.enumerate() {
            self.nor
                .write_frame(&[opcode::AAI_WORD_PROGRAM, pair[0], pair[1]])?;
            self.nor.wait_idle()?;
            if i % AAI_WORDS_PER_SERVICE == 0 {
                self.nor.watchdog().periodic();
            }
        }
        Ok(())
    }
}

impl<S: SpiDevice, W: Watchdog> FlashDevice for Sst25Flash<S, W> {
    fn open(&mut self) -> Result<(), FlashError> {
        if self.chip.is_some() {
            return Ok(());
        }
        let chip = self.nor.probe(Family::Sst25Aai)?;
        self.nor.unprotect(true)?;
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

    /// The destination must already be erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let chip = self.opened()?;
        check_range(0, chip.capacity, addr, data.len())?;

        let mut addr = addr;
        let mut data = data;

        if addr % 2 == 1 {
            if let Some((&first, rest)) = data.split_first() {
                self.byte_program(addr, first)?;
                addr += 1;
                data = rest;
            }
        }

        let (words, tail) = data.split_at(data.len() & !1);
        let result = self.aai_program(addr, words);
        // AAI mode must be left even when the run failed.
        let exit = self.nor.command(opcode::WRITE_DISABLE);
        result?;
        exit?;
        self.nor.wait_idle()?;

        if let Some(&last) = tail.first() {
            self.byte_program(addr + words.len() as u32, last)?;
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
        NO_PAGE
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        self.opened()?;
        self.nor.chip_erase(opcode::CHIP_ERASE_SST)
    }
}
