// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory-mapped internal NVM driver.
//!
//! The controller can only erase whole sectors and program whole pages, while
//! callers write arbitrary byte ranges. For every sector a write touches, the
//! driver:
//!   1. copies the sector from the memory map into a one-sector staging buffer
//!   2. overlays the caller's bytes
//!   3. erases the sector (skipped when the target bytes are already erased)
//!   4. programs the buffer back page by page
//!
//! Bytes of the sector outside the written range come back unchanged.

use core::ops::Range;

use crate::device::{align_down, align_up, check_range, FlashDevice};
use crate::error::FlashError;
use crate::watchdog::{wait_ready, PollPolicy, Watchdog};

/// Default staging capacity: one 4 KiB sector.
pub const DEFAULT_SECTOR_CAPACITY: usize = 4096;

/// Physical layout reported by the NVM controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvmGeometry {
    /// CPU address of the first byte.
    pub base: u32,
    pub page_size: u32,
    pub pages_per_sector: u32,
    pub sector_count: u32,
}

impl NvmGeometry {
    pub const fn sector_size(&self) -> u32 {
        self.page_size * self.pages_per_sector
    }

    pub const fn capacity(&self) -> u32 {
        self.sector_size() * self.sector_count
    }
}

/// Hardware primitives of a memory-mapped NVM controller.
///
/// `start_*` calls begin an operation; completion is reported by `is_ready`.
/// Controllers with blocking primitives simply always report ready.
pub trait NvmController {
    /// Read the chip parameters.
    fn geometry(&mut self) -> NvmGeometry;

    /// CPU-visible bytes at `[addr, addr + len)`.
    fn mapped(&self, addr: u32, len: usize) -> &[u8];

    /// Begin erasing the sector starting at `addr`.
    fn start_erase_sector(&mut self, addr: u32) -> Result<(), FlashError>;

    /// Begin programming one page (`data.len() == page_size`) at `addr`.
    fn start_program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    fn is_ready(&self) -> bool;
}

/// [`FlashDevice`] over a memory-mapped NVM controller.
///
/// `SECTOR` bounds the staging buffer; `open()` rejects chips with bigger sectors.
pub struct InternalFlash<C, W, const SECTOR: usize = DEFAULT_SECTOR_CAPACITY> {
    controller: C,
    watchdog: W,
    policy: PollPolicy,
    geometry: Option<NvmGeometry>,
    staging: [u8; SECTOR],
}

impl<C: NvmController, W: Watchdog> InternalFlash<C, W> {
    pub fn new(controller: C, watchdog: W) -> Self {
        Self::with_capacity(controller, watchdog)
    }
}

impl<C: NvmController, W: Watchdog, const SECTOR: usize> InternalFlash<C, W, SECTOR> {
    /// Driver with a `SECTOR`-byte staging buffer.
    pub fn with_capacity(controller: C, watchdog: W) -> Self {
        Self {
            controller,
            watchdog,
            policy: PollPolicy::unbounded(),
            geometry: None,
            staging: [0xFF; SECTOR],
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn geometry(&self) -> Option<NvmGeometry> {
        self.geometry
    }

    fn opened(&self) -> Result<NvmGeometry, FlashError> {
        self.geometry.ok_or(FlashError::NotOpen)
    }

    /// Write the part of `data` that falls into the sector at `sector_start`,
    /// beginning `offset` bytes into the sector.
    fn write_sector(
        &mut self,
        g: &NvmGeometry,
        sector_start: u32,
        offset: usize,
        data: &[u8],
    ) -> Result<(), FlashError> {
        let sector_size = g.sector_size() as usize;
        let page_size = g.page_size as usize;
        let end = offset + data.len();

        let already_erased = self
            .controller
            .mapped(sector_start + offset as u32, data.len())
            .iter()
            .all(|&b| b == 0xFF);

        if offset == 0 && data.len() == sector_size {
            if !already_erased {
                erase_sector(&mut self.controller, &self.watchdog, &self.policy, sector_start)?;
            }
            return program_pages(
                &mut self.controller,
                &self.watchdog,
                &self.policy,
                sector_start,
                data,
                page_size,
                0..g.pages_per_sector as usize,
            );
        }

        let staging = &mut self.staging[..sector_size];
        staging.copy_from_slice(self.controller.mapped(sector_start, sector_size));
        staging[offset..end].copy_from_slice(data);

        let pages = if already_erased {
            // Erased bytes can be programmed in place; only touched pages change.
            offset / page_size..(end - 1) / page_size + 1
        } else {
            erase_sector(&mut self.controller, &self.watchdog, &self.policy, sector_start)?;
            0..g.pages_per_sector as usize
        };

        program_pages(
            &mut self.controller,
            &self.watchdog,
            &self.policy,
            sector_start,
            &self.staging[..sector_size],
            page_size,
            pages,
        )
    }
}

fn erase_sector<C: NvmController, W: Watchdog>(
    controller: &mut C,
    watchdog: &W,
    policy: &PollPolicy,
    addr: u32,
) -> Result<(), FlashError> {
    trace!("nvm: erase sector 0x{:08x}", addr);
    controller
        .start_erase_sector(addr)
        .map_err(|_| FlashError::EraseFailed)?;
    wait_ready(watchdog, policy, || Ok(controller.is_ready()))?;
    watchdog.periodic();
    Ok(())
}

/// Program `pages` of `data` (a whole sector image) starting at `sector_start`.
fn program_pages<C: NvmController, W: Watchdog>(
    controller: &mut C,
    watchdog: &W,
    policy: &PollPolicy,
    sector_start: u32,
    data: &[u8],
    page_size: usize,
    pages: Range<usize>,
) -> Result<(), FlashError> {
    for page in pages {
        let start = page * page_size;
        let chunk = &data[start..start + page_size];
        controller
            .start_program_page(sector_start + start as u32, chunk)
            .map_err(|_| FlashError::WriteFailed)?;
        wait_ready(watchdog, policy, || Ok(controller.is_ready()))?;
        watchdog.periodic();
    }
    Ok(())
}

impl<C: NvmController, W: Watchdog, const SECTOR: usize> FlashDevice for InternalFlash<C, W, SECTOR> {
    fn open(&mut self) -> Result<(), FlashError> {
        if self.geometry.is_some() {
            return Ok(());
        }

        let g = self.controller.geometry();
        if g.page_size == 0
            || g.pages_per_sector == 0
            || g.sector_count == 0
            || g.sector_size() as usize > SECTOR
        {
            error!(
                "nvm: unsupported geometry (page {}, pages/sector {})",
                g.page_size,
                g.pages_per_sector
            );
            return Err(FlashError::UnsupportedDevice);
        }

        debug!(
            "nvm: open base 0x{:08x}, {} sectors of {} bytes",
            g.base,
            g.sector_count,
            g.sector_size()
        );
        self.geometry = Some(g);
        Ok(())
    }

    fn close(&mut self) {
        self.geometry = None;
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        let g = self.opened()?;
        if to <= from {
            return Ok(());
        }
        check_range(g.base, g.capacity(), from, (to - from) as usize)?;

        let sector_size = g.sector_size();
        let first = g.base + align_down(from - g.base, sector_size);
        let last = g.base + align_up(to - g.base, sector_size);

        let mut addr = first;
        while addr < last {
            erase_sector(&mut self.controller, &self.watchdog, &self.policy, addr)?;
            addr += sector_size;
        }
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let g = self.opened()?;
        check_range(g.base, g.capacity(), addr, buf.len())?;
        buf.copy_from_slice(self.controller.mapped(addr, buf.len()));
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let g = self.opened()?;
        check_range(g.base, g.capacity(), addr, data.len())?;

        let sector_size = g.sector_size();
        let mut addr = addr;
        let mut remaining = data;

        while !remaining.is_empty() {
            let sector_start = g.base + align_down(addr - g.base, sector_size);
            let offset = (addr - sector_start) as usize;
            let n = (sector_size as usize - offset).min(remaining.len());
            let (chunk, rest) = remaining.split_at(n);

            self.write_sector(&g, sector_start, offset, chunk)?;

            addr += n as u32;
            remaining = rest;
        }
        Ok(())
    }

    fn sector_size(&self) -> i32 {
        self.geometry.map_or(0, |g| g.sector_size() as i32)
    }

    fn sector_count(&self) -> i32 {
        self.geometry.map_or(0, |g| g.sector_count as i32)
    }

    fn page_size(&self) -> i32 {
        self.geometry.map_or(0, |g| g.page_size as i32)
    }

    fn base_address(&self) -> u32 {
        self.geometry.map_or(0, |g| g.base)
    }

    fn mapped(&self, addr: u32, len: usize) -> Option<&[u8]> {
        let g = self.geometry?;
        check_range(g.base, g.capacity(), addr, len).ok()?;
        Some(self.controller.mapped(addr, len))
    }
}
