// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash-to-flash image copy with CRC verification of the destination.
//!
//! The copied range is a firmware image: its last two bytes hold the
//! little-endian CRC16 of everything before them. A copy only succeeds once
//! the destination matches that CRC.

use crate::device::{region_crc, FlashDevice, OpenDevice};
use crate::error::{CopyError, FlashError};

/// Bounce buffer size for reads from a device without a memory map.
pub const COPY_CHUNK_SIZE: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CopyDirection {
    /// Memory-mapped source, SPI destination. The destination is erased first.
    InternalToExternal,
    /// SPI source streamed through [`COPY_CHUNK_SIZE`] chunks into the
    /// internal device, whose driver handles erasing.
    ExternalToInternal,
}

/// Copy `len` bytes from `src_addr` on `src` to `dst_addr` on `dst`, then
/// check the destination's trailing CRC.
///
/// Both devices are opened for the duration of the call and closed on return.
pub fn copy(
    src: &mut dyn FlashDevice,
    src_addr: u32,
    dst: &mut dyn FlashDevice,
    dst_addr: u32,
    len: u32,
    direction: CopyDirection,
) -> Result<(), CopyError> {
    if len < 2 {
        return Err(CopyError::SourceReadFailed(FlashError::OutOfBounds));
    }

    let mut src = OpenDevice::open(src).map_err(CopyError::SourceReadFailed)?;
    let mut dst = OpenDevice::open(dst).map_err(CopyError::DestWriteFailed)?;

    debug!(
        "copy: 0x{:08x} -> 0x{:08x}, {} bytes ({:?})",
        src_addr,
        dst_addr,
        len,
        direction
    );

    if direction == CopyDirection::InternalToExternal {
        dst.erase(dst_addr, dst_addr + len)
            .map_err(CopyError::DestWriteFailed)?;
    }

    match src.mapped(src_addr, len as usize) {
        Some(bytes) => dst.write(dst_addr, bytes).map_err(CopyError::DestWriteFailed)?,
        None => stream(&mut *src, src_addr, &mut *dst, dst_addr, len)?,
    }

    verify_destination(&mut *dst, dst_addr, len)
}

fn stream(
    src: &mut dyn FlashDevice,
    src_addr: u32,
    dst: &mut dyn FlashDevice,
    dst_addr: u32,
    len: u32,
) -> Result<(), CopyError> {
    let mut chunk = [0u8; COPY_CHUNK_SIZE];
    let mut offset = 0u32;

    while offset < len {
        let n = ((len - offset) as usize).min(COPY_CHUNK_SIZE);
        src.read(src_addr + offset, &mut chunk[..n])
            .map_err(CopyError::SourceReadFailed)?;
        dst.write(dst_addr + offset, &chunk[..n])
            .map_err(CopyError::DestWriteFailed)?;
        offset += n as u32;
    }
    Ok(())
}

/// Compare the CRC of `[addr, addr + len - 2)` with the two bytes after it.
fn verify_destination(dst: &mut dyn FlashDevice, addr: u32, len: u32) -> Result<(), CopyError> {
    let payload = len - 2;
    let computed = region_crc(dst, addr, payload).map_err(CopyError::DestWriteFailed)?;

    let mut raw = [0u8; 2];
    dst.read(addr + payload, &mut raw)
        .map_err(CopyError::DestWriteFailed)?;
    let stored = u16::from_le_bytes(raw);

    if stored != computed {
        warn!(
            "copy: CRC mismatch at 0x{:08x}: stored 0x{:04x}, computed 0x{:04x}",
            addr,
            stored,
            computed
        );
        return Err(CopyError::CrcMismatch { stored, computed });
    }
    Ok(())
}

