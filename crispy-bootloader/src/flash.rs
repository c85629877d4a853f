// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! On-chip flash controller over the RP2040 ROM routines.
//!
//! On RP2040, flash operations (erase/program) require disabling XIP first.
//! The full sequence is:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash.
//! We use `#[link_section = ".data"]` to place critical functions in RAM,
//! and pre-resolve all ROM function pointers in [`Rp2040Nvm::new`].

use crispy_flash::layout::{FLASH_BASE, FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE};
use crispy_flash::{FlashError, NvmController, NvmGeometry};

/// W25Q16 on the Pico board.
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;

/// 4 KiB sector erase command used by `flash_range_erase`.
const SECTOR_ERASE_CMD: u8 = 0x20;

// ROM function pointer types
type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

/// ROM function pointers, resolved once from the ROM table.
/// Stored in static RAM so RAM-resident functions can call them without
/// accessing flash-based code.
static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// Look up a ROM function by its two-character tag.
/// ROM table pointer at 0x14 and lookup function at 0x18 are 16-bit halfword pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

/// Erase `size` bytes at the flash-relative `offset`.
/// Runs entirely from RAM with proper XIP teardown/setup.
#[link_section = ".data"]
#[inline(never)]
unsafe fn rom_erase(offset: u32, size: u32) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(offset, size as usize, FLASH_SECTOR_SIZE, SECTOR_ERASE_CMD);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// Program `len` bytes at the flash-relative `offset`.
/// Runs entirely from RAM with proper XIP teardown/setup.
#[link_section = ".data"]
#[inline(never)]
unsafe fn rom_program(offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_PROGRAM(offset, data, len);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// XIP flash as an [`NvmController`]. The ROM routines block, so the
/// controller is always ready.
pub struct Rp2040Nvm {
    _private: (),
}

impl Rp2040Nvm {
    /// Resolve the ROM flash routines.
    ///
    /// # Safety
    /// Call once, while XIP is active, before anything else touches the
    /// flash controller.
    pub unsafe fn new() -> Self {
        ROM_CONNECT_INTERNAL_FLASH =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
        ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
        ROM_FLASH_RANGE_ERASE =
            core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
        ROM_FLASH_RANGE_PROGRAM =
            core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
        ROM_FLASH_FLUSH_CACHE = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
        ROM_FLASH_ENTER_CMD_XIP =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
        Self { _private: () }
    }
}

/// Convert an absolute XIP flash address to a flash-relative offset.
fn to_offset(addr: u32) -> Result<u32, FlashError> {
    match addr.checked_sub(FLASH_BASE) {
        Some(offset) if offset < FLASH_SIZE => Ok(offset),
        _ => Err(FlashError::OutOfBounds),
    }
}

impl NvmController for Rp2040Nvm {
    fn geometry(&mut self) -> NvmGeometry {
        NvmGeometry {
            base: FLASH_BASE,
            page_size: FLASH_PAGE_SIZE,
            pages_per_sector: FLASH_SECTOR_SIZE / FLASH_PAGE_SIZE,
            sector_count: FLASH_SIZE / FLASH_SECTOR_SIZE,
        }
    }

    fn mapped(&self, addr: u32, len: usize) -> &[u8] {
        // The whole chip is mapped read-only at FLASH_BASE while XIP is on,
        // which is always the case outside rom_erase/rom_program.
        unsafe { core::slice::from_raw_parts(addr as *const u8, len) }
    }

    fn start_erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        let offset = to_offset(addr)?;
        unsafe { rom_erase(offset, FLASH_SECTOR_SIZE) };
        Ok(())
    }

    fn start_program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let offset = to_offset(addr)?;
        unsafe { rom_program(offset, data.as_ptr(), data.len()) };
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}
