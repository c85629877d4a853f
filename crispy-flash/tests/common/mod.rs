// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host simulators shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;

use crispy_flash::crc16::image_crc;
use crispy_flash::internal::{NvmController, NvmGeometry};
use crispy_flash::layout::{FirmwareHeader, FlashRegion, RegionMap, FW_HEADER_OFFSET, FW_SIGNATURE};
use crispy_flash::spi_nor::opcode;
use crispy_flash::{FlashDevice, FlashError, OpenDevice, PollPolicy, Watchdog};
use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};

pub const NVM_BASE: u32 = 0x1000_0000;
pub const NVM_PAGE: u32 = 256;
pub const NVM_PAGES_PER_SECTOR: u32 = 16;
pub const NVM_SECTOR: u32 = NVM_PAGE * NVM_PAGES_PER_SECTOR;

/// Polls allowed before a simulated busy flag is treated as a hang.
pub const TEST_POLLS: PollPolicy = PollPolicy::bounded(10_000);

// =============================================================================
// SimNvm: memory-mapped internal flash controller
// =============================================================================

/// RAM-backed NVM controller with NOR semantics: erase sets a sector to 0xFF,
/// programming can only clear bits.
pub struct SimNvm {
    pub geometry: NvmGeometry,
    pub mem: Vec<u8>,
    /// Erases performed per sector.
    pub erase_counts: Vec<u32>,
    /// Addresses of every page program, in order.
    pub programs: Vec<u32>,
    /// `is_ready` polls returning false after each operation.
    pub busy_cycles: u32,
    pub fail_erase: bool,
    pub fail_program: bool,
    /// Fail page programs at or above this address.
    pub fail_program_from: Option<u32>,
    busy: Cell<u32>,
}

impl SimNvm {
    pub fn new(sector_count: u32) -> Self {
        Self::with_geometry(NvmGeometry {
            base: NVM_BASE,
            page_size: NVM_PAGE,
            pages_per_sector: NVM_PAGES_PER_SECTOR,
            sector_count,
        })
    }

    pub fn with_geometry(geometry: NvmGeometry) -> Self {
        Self {
            geometry,
            mem: vec![0xFF; geometry.capacity() as usize],
            erase_counts: vec![0; geometry.sector_count as usize],
            programs: Vec::new(),
            busy_cycles: 0,
            fail_erase: false,
            fail_program: false,
            fail_program_from: None,
            busy: Cell::new(0),
        }
    }

    fn offset(&self, addr: u32) -> usize {
        (addr - self.geometry.base) as usize
    }

    /// Place raw bytes without going through erase/program.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let off = self.offset(addr);
        self.mem[off..off + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        let off = self.offset(addr);
        &self.mem[off..off + len]
    }

    pub fn sector_erases(&self, addr: u32) -> u32 {
        self.erase_counts[self.offset(addr) / self.geometry.sector_size() as usize]
    }

    pub fn total_erases(&self) -> u32 {
        self.erase_counts.iter().sum()
    }
}

impl NvmController for SimNvm {
    fn geometry(&mut self) -> NvmGeometry {
        self.geometry
    }

    fn mapped(&self, addr: u32, len: usize) -> &[u8] {
        self.bytes(addr, len)
    }

    fn start_erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        assert!(self.is_ready(), "erase issued while busy");
        let sector = self.geometry.sector_size() as usize;
        let off = self.offset(addr);
        assert_eq!(off % sector, 0, "unaligned sector erase at 0x{:08x}", addr);
        if self.fail_erase {
            return Err(FlashError::EraseFailed);
        }
        self.mem[off..off + sector].fill(0xFF);
        self.erase_counts[off / sector] += 1;
        self.busy.set(self.busy_cycles);
        Ok(())
    }

    fn start_program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        assert!(self.is_ready(), "program issued while busy");
        let page = self.geometry.page_size as usize;
        let off = self.offset(addr);
        assert_eq!(off % page, 0, "unaligned page program at 0x{:08x}", addr);
        assert_eq!(data.len(), page, "partial page program");
        if self.fail_program || self.fail_program_from.map_or(false, |from| addr >= from) {
            return Err(FlashError::WriteFailed);
        }
        for (cell, &byte) in self.mem[off..off + page].iter_mut().zip(data) {
            *cell &= byte;
        }
        self.programs.push(addr);
        self.busy.set(self.busy_cycles);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        match self.busy.get() {
            0 => true,
            n => {
                self.busy.set(n - 1);
                false
            }
        }
    }
}

// =============================================================================
// SimSpiNor: SPI NOR chip behind an SpiDevice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSpiError;

impl spi::Error for SimSpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFamily {
    Sst25,
    PageProgram,
}

/// SPI NOR emulation covering the SST25 AAI and JEDEC page-program command
/// sets. Each `transaction` is one chip-select frame.
pub struct SimSpiNor {
    pub family: SimFamily,
    pub jedec: [u8; 3],
    pub mem: Vec<u8>,
    /// Every erase as `(opcode, address)`.
    pub erases: Vec<(u8, u32)>,
    pub byte_programs: u32,
    pub page_programs: u32,
    pub aai_words: u32,
    /// Commands the chip ignored: no write enable, protected, or busy.
    pub violations: u32,
    /// Status polls reporting busy after each program or erase.
    pub busy_cycles: u32,
    /// Block protection bits; set at power-up.
    pub protect: u8,
    pub fail_reads: bool,
    wel: bool,
    ewsr: bool,
    aai_addr: Option<u32>,
    busy: u32,
}

impl SimSpiNor {
    fn new(family: SimFamily, jedec: [u8; 3], capacity: usize) -> Self {
        Self {
            family,
            jedec,
            mem: vec![0xFF; capacity],
            erases: Vec::new(),
            byte_programs: 0,
            page_programs: 0,
            aai_words: 0,
            violations: 0,
            busy_cycles: 2,
            protect: 0x1C,
            fail_reads: false,
            wel: false,
            ewsr: false,
            aai_addr: None,
            busy: 0,
        }
    }

    /// SST25VF016B, 2 MiB.
    pub fn sst25vf016b() -> Self {
        Self::new(SimFamily::Sst25, [0xBF, 0x25, 0x41], 2 * 1024 * 1024)
    }

    /// W25Q16, 2 MiB.
    pub fn w25q16() -> Self {
        Self::new(SimFamily::PageProgram, [0xEF, 0x40, 0x15], 2 * 1024 * 1024)
    }

    pub fn unknown() -> Self {
        Self::new(SimFamily::PageProgram, [0x12, 0x34, 0x56], 64 * 1024)
    }

    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let off = addr as usize;
        self.mem[off..off + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        &self.mem[addr as usize..addr as usize + len]
    }

    fn status(&self) -> u8 {
        let busy = if self.busy > 0 { 0x01 } else { 0 };
        let wel = if self.wel { 0x02 } else { 0 };
        busy | wel | self.protect
    }

    fn respond(&mut self, frame: &[u8], offset: usize, buf: &mut [u8]) {
        match frame.first() {
            Some(&opcode::JEDEC_ID) => {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = self.jedec.get(offset + i).copied().unwrap_or(0);
                }
            }
            Some(&opcode::READ_STATUS) => {
                buf.fill(self.status());
                self.busy = self.busy.saturating_sub(1);
            }
            Some(&opcode::READ) => {
                assert_eq!(frame.len(), 4, "read needs a 24-bit address");
                let addr = address(&frame[1..4]) as usize + offset;
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = self.mem[(addr + i) % self.mem.len()];
                }
            }
            other => panic!("read phase after unexpected command {:02x?}", other),
        }
    }

    fn program(&mut self, addr: u32, data: &[u8]) {
        let size = self.mem.len();
        for (i, &byte) in data.iter().enumerate() {
            let cell = &mut self.mem[(addr as usize + i) % size];
            *cell &= byte;
        }
    }

    fn writable(&mut self) -> bool {
        if self.busy > 0 || !self.wel || self.protect != 0 {
            self.violations += 1;
            return false;
        }
        true
    }

    fn execute(&mut self, frame: &[u8]) {
        let Some(&op) = frame.first() else {
            return;
        };
        if self.busy > 0 && op != opcode::READ_STATUS {
            self.violations += 1;
            return;
        }

        match op {
            opcode::WRITE_ENABLE => self.wel = true,
            opcode::WRITE_DISABLE => {
                self.wel = false;
                self.aai_addr = None;
            }
            opcode::ENABLE_WRITE_STATUS => self.ewsr = true,
            opcode::WRITE_STATUS => {
                let allowed = match self.family {
                    SimFamily::Sst25 => self.ewsr || self.wel,
                    SimFamily::PageProgram => self.wel,
                };
                if allowed {
                    self.protect = frame.get(1).copied().unwrap_or(0) & 0x3C;
                } else {
                    self.violations += 1;
                }
                self.ewsr = false;
                self.wel = false;
                self.busy = self.busy_cycles;
            }
            opcode::PROGRAM => {
                assert!(frame.len() > 4, "program without data");
                if !self.writable() {
                    return;
                }
                let addr = address(&frame[1..4]);
                let data = &frame[4..];
                match self.family {
                    SimFamily::Sst25 => {
                        assert_eq!(data.len(), 1, "SST25 byte program takes one byte");
                        self.program(addr, data);
                        self.byte_programs += 1;
                    }
                    SimFamily::PageProgram => {
                        assert!(data.len() <= 256, "page program longer than a page");
                        let page = addr & !0xFF;
                        for (i, &byte) in data.iter().enumerate() {
                            let at = page + ((addr + i as u32) & 0xFF);
                            self.program(at, &[byte]);
                        }
                        self.page_programs += 1;
                    }
                }
                self.wel = false;
                self.busy = self.busy_cycles;
            }
            opcode::AAI_WORD_PROGRAM => {
                assert_eq!(self.family, SimFamily::Sst25, "AAI on a page-program chip");
                match self.aai_addr {
                    None => {
                        assert_eq!(frame.len(), 6, "AAI start frame is op, address, 2 bytes");
                        if !self.writable() {
                            return;
                        }
                        let addr = address(&frame[1..4]);
                        assert_eq!(addr % 2, 0, "AAI start address must be even");
                        self.program(addr, &frame[4..6]);
                        self.aai_addr = Some(addr + 2);
                    }
                    Some(addr) => {
                        assert_eq!(frame.len(), 3, "AAI continuation frame is op, 2 bytes");
                        self.program(addr, &frame[1..3]);
                        self.aai_addr = Some(addr + 2);
                    }
                }
                self.aai_words += 1;
                self.busy = self.busy_cycles;
            }
            opcode::ERASE_4K | opcode::ERASE_32K | opcode::ERASE_64K => {
                if !self.writable() {
                    return;
                }
                let size = match op {
                    opcode::ERASE_4K => 4 * 1024,
                    opcode::ERASE_32K => 32 * 1024,
                    _ => 64 * 1024,
                };
                let addr = address(&frame[1..4]);
                assert_eq!(addr % size, 0, "unaligned erase {:02x} at 0x{:06x}", op, addr);
                self.mem[addr as usize..(addr + size) as usize].fill(0xFF);
                self.erases.push((op, addr));
                self.wel = false;
                self.busy = self.busy_cycles;
            }
            opcode::CHIP_ERASE_SST | opcode::CHIP_ERASE => {
                if !self.writable() {
                    return;
                }
                self.mem.fill(0xFF);
                self.erases.push((op, 0));
                self.wel = false;
                self.busy = self.busy_cycles;
            }
            other => panic!("unexpected command {:02x}", other),
        }
    }
}

fn address(raw: &[u8]) -> u32 {
    u32::from_be_bytes([0, raw[0], raw[1], raw[2]])
}

impl ErrorType for SimSpiNor {
    type Error = SimSpiError;
}

impl SpiDevice for SimSpiNor {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut frame = Vec::new();
        let mut read_offset = 0;
        let mut has_read = false;

        for op in operations.iter_mut() {
            match op {
                Operation::Write(data) => frame.extend_from_slice(data),
                Operation::Read(buf) => {
                    if self.fail_reads {
                        return Err(SimSpiError);
                    }
                    self.respond(&frame, read_offset, buf);
                    read_offset += buf.len();
                    has_read = true;
                }
                Operation::DelayNs(_) => {}
                _ => panic!("unsupported SPI operation"),
            }
        }

        if !has_read {
            self.execute(&frame);
        }
        Ok(())
    }
}

// =============================================================================
// Counting watchdog
// =============================================================================

#[derive(Default)]
pub struct CountingWatchdog {
    pub feeds: Cell<u32>,
}

impl Watchdog for CountingWatchdog {
    fn periodic(&self) {
        self.feeds.set(self.feeds.get() + 1);
    }
}

// =============================================================================
// Layout and image helpers
// =============================================================================

pub const TEST_APP_SIZE: u32 = 32 * 1024;

/// Small region map over a 64-sector `SimNvm` and a 2 MiB external chip.
pub fn test_regions() -> RegionMap {
    RegionMap {
        bootloader: FlashRegion::new("bootloader", NVM_BASE, 16 * 1024),
        params: FlashRegion::new("params", NVM_BASE + 0x4000, NVM_SECTOR),
        application: FlashRegion::new("application", NVM_BASE + 0x8000, TEST_APP_SIZE),
        backup: FlashRegion::new("backup", 0, TEST_APP_SIZE),
        download: FlashRegion::new("download", 0x1_0000, TEST_APP_SIZE),
    }
}

/// Firmware image of `size` bytes with a valid trailing CRC.
pub fn make_image(size: u32, version: u32, seed: u8) -> Vec<u8> {
    let mut image = make_unstamped_image(size, version, seed);
    let crc = image_crc(&image).unwrap();
    let n = image.len();
    image[n - 2..].copy_from_slice(&crc.to_le_bytes());
    image
}

/// Firmware image whose CRC slot is still erased.
pub fn make_unstamped_image(size: u32, version: u32, seed: u8) -> Vec<u8> {
    let mut image: Vec<u8> = (0..size)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    let header = FirmwareHeader {
        signature: FW_SIGNATURE,
        version,
        load_address: NVM_BASE + 0x8000,
        start_address: NVM_BASE + 0x8000,
        end_address: NVM_BASE + 0x8000 + size,
    };
    let at = FW_HEADER_OFFSET as usize;
    image[at..at + FirmwareHeader::SIZE].copy_from_slice(&header.to_bytes());
    let n = image.len();
    image[n - 2..].fill(0xFF);
    image
}

/// Read `len` bytes through the device contract.
pub fn read_back(device: &mut dyn FlashDevice, addr: u32, len: usize) -> Vec<u8> {
    let mut dev = OpenDevice::open(device).unwrap();
    let mut buf = vec![0u8; len];
    dev.read(addr, &mut buf).unwrap();
    buf
}
