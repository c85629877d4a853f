// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The flash device contract shared by every chip driver.
//!
//! Callers hold a `&mut dyn FlashDevice` and never learn which chip sits behind
//! it. Each driver owns its chip's state (geometry, opened flag); nothing about
//! a device lives in a global.

use core::ops::{Deref, DerefMut};

use crate::crc16::{crc16, CRC16_INIT};
use crate::error::FlashError;
use crate::layout::FlashRegion;

/// `page_size()` value of a device that only has sector granularity.
pub const NO_PAGE: i32 = -1;

/// Block device view of one flash chip.
pub trait FlashDevice {
    /// Establish chip parameters. Calling it on an open device is a no-op.
    fn open(&mut self) -> Result<(), FlashError>;

    /// Release the open state. Never fails, also when `open()` never succeeded.
    fn close(&mut self);

    /// Erase every sector overlapping `[from, to)`.
    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError>;

    /// Fill `buf` from `addr`. Either the whole buffer is read or an error is returned.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` at `addr`; may span pages and sectors.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    fn sector_size(&self) -> i32;
    fn sector_count(&self) -> i32;

    /// Program granularity, or [`NO_PAGE`].
    fn page_size(&self) -> i32;

    /// First address of the device.
    fn base_address(&self) -> u32 {
        0
    }

    /// Erase the whole chip.
    fn erase_all(&mut self) -> Result<(), FlashError> {
        let capacity = capacity(self).ok_or(FlashError::NotOpen)?;
        let base = self.base_address();
        self.erase(base, base + capacity)
    }

    /// CPU-addressable view of `[addr, addr + len)` for memory-mapped devices.
    fn mapped(&self, _addr: u32, _len: usize) -> Option<&[u8]> {
        None
    }
}

impl<D: FlashDevice + ?Sized> FlashDevice for &mut D {
    fn open(&mut self) -> Result<(), FlashError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        (**self).erase(from, to)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(addr, data)
    }

    fn sector_size(&self) -> i32 {
        (**self).sector_size()
    }

    fn sector_count(&self) -> i32 {
        (**self).sector_count()
    }

    fn page_size(&self) -> i32 {
        (**self).page_size()
    }

    fn base_address(&self) -> u32 {
        (**self).base_address()
    }

    fn erase_all(&mut self) -> Result<(), FlashError> {
        (**self).erase_all()
    }

    fn mapped(&self, addr: u32, len: usize) -> Option<&[u8]> {
        (**self).mapped(addr, len)
    }
}

/// Total size in bytes of an open device.
pub fn capacity<D: FlashDevice + ?Sized>(device: &D) -> Option<u32> {
    let sector_size = u32::try_from(device.sector_size()).ok()?;
    let sector_count = u32::try_from(device.sector_count()).ok()?;
    match sector_size.checked_mul(sector_count)? {
        0 => None,
        size => Some(size),
    }
}

/// An open device that is closed again when dropped, on every exit path.
pub struct OpenDevice<'a> {
    device: &'a mut dyn FlashDevice,
}

impl<'a> OpenDevice<'a> {
    pub fn open(device: &'a mut dyn FlashDevice) -> Result<Self, FlashError> {
        if let Err(e) = device.open() {
            device.close();
            return Err(e);
        }
        Ok(Self { device })
    }
}

impl<'a> Deref for OpenDevice<'a> {
    type Target = dyn FlashDevice + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.device
    }
}

impl<'a> DerefMut for OpenDevice<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.device
    }
}

impl Drop for OpenDevice<'_> {
    fn drop(&mut self) {
        self.device.close();
    }
}

/// CRC16 of `len` bytes at `addr` on an open device.
///
/// Uses the memory map when the device has one, otherwise streams through a
/// small stack buffer.
pub fn region_crc(device: &mut dyn FlashDevice, addr: u32, len: u32) -> Result<u16, FlashError> {
    if let Some(bytes) = device.mapped(addr, len as usize) {
        return Ok(crc16(bytes, CRC16_INIT));
    }

    let mut crc = CRC16_INIT;
    let mut chunk = [0u8; 256];
    let mut addr = addr;
    let mut remaining = len as usize;

    while remaining > 0 {
        let n = remaining.min(chunk.len());
        device.read(addr, &mut chunk[..n])?;
        crc = crc16(&chunk[..n], crc);
        addr += n as u32;
        remaining -= n;
    }

    Ok(crc)
}

/// Read the little-endian CRC16 stored in the last two bytes of a region.
pub fn stored_crc(device: &mut dyn FlashDevice, region: &FlashRegion) -> Result<u16, FlashError> {
    let mut raw = [0u8; 2];
    device.read(region.crc_address(), &mut raw)?;
    Ok(u16::from_le_bytes(raw))
}

/// Check a firmware region's trailing CRC. Returns `(stored, computed)`.
pub fn region_crc_pair(
    device: &mut dyn FlashDevice,
    region: &FlashRegion,
) -> Result<(u16, u16), FlashError> {
    let computed = region_crc(device, region.start_address, region.payload_size())?;
    let stored = stored_crc(device, region)?;
    Ok((stored, computed))
}

/// True when the region's trailing CRC matches its content.
pub fn image_is_valid(device: &mut dyn FlashDevice, region: &FlashRegion) -> Result<bool, FlashError> {
    let (stored, computed) = region_crc_pair(device, region)?;
    Ok(stored == computed)
}

pub(crate) const fn align_down(value: u32, align: u32) -> u32 {
    value - value % align
}

pub(crate) const fn align_up(value: u32, align: u32) -> u32 {
    align_down(value + align - 1, align)
}

/// Check that `[addr, addr + len)` lies within `[base, base + capacity)`.
pub(crate) fn check_range(base: u32, capacity: u32, addr: u32, len: usize) -> Result<(), FlashError> {
    let start = addr.checked_sub(base).ok_or(FlashError::OutOfBounds)?;
    let len = u32::try_from(len).map_err(|_| FlashError::OutOfBounds)?;
    let end = start.checked_add(len).ok_or(FlashError::OutOfBounds)?;
    if end > capacity {
        return Err(FlashError::OutOfBounds);
    }
    Ok(())
}
