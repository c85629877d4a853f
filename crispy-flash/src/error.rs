// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error types shared by the flash drivers, the copier and the boot procedure.

use core::fmt;

/// Failure of a single flash device operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Operation issued before a successful `open()`.
    NotOpen,
    /// Geometry or JEDEC ID matches no supported chip.
    UnsupportedDevice,
    EraseFailed,
    WriteFailed,
    ReadFailed,
    /// Busy flag never cleared within the configured poll budget.
    Timeout,
    /// Address range falls outside the device.
    OutOfBounds,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FlashError::NotOpen => "flash device not open",
            FlashError::UnsupportedDevice => "unsupported flash device",
            FlashError::EraseFailed => "flash erase failed",
            FlashError::WriteFailed => "flash write failed",
            FlashError::ReadFailed => "flash read failed",
            FlashError::Timeout => "flash busy timeout",
            FlashError::OutOfBounds => "address out of device range",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

/// Failure of a flash-to-flash copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CopyError {
    SourceReadFailed(FlashError),
    DestWriteFailed(FlashError),
    /// Destination content does not match its trailing CRC after the copy.
    CrcMismatch { stored: u16, computed: u16 },
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::SourceReadFailed(e) => write!(f, "source read failed: {}", e),
            CopyError::DestWriteFailed(e) => write!(f, "destination write failed: {}", e),
            CopyError::CrcMismatch { stored, computed } => write!(
                f,
                "destination CRC mismatch: stored 0x{:04x}, computed 0x{:04x}",
                stored, computed
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CopyError {}
