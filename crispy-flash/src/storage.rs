// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! `embedded-storage` view of one region of a [`FlashDevice`].
//!
//! Offsets are relative to the region start. The device stays open for the
//! lifetime of the adapter.

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashError, NorFlashErrorKind,
    ReadNorFlash,
};

use crate::device::{capacity, FlashDevice};
use crate::error::FlashError;
use crate::layout::FlashRegion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    NotAligned,
    OutOfBounds,
    Flash(FlashError),
}

impl NorFlashError for StorageError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            StorageError::NotAligned => NorFlashErrorKind::NotAligned,
            StorageError::OutOfBounds | StorageError::Flash(FlashError::OutOfBounds) => {
                NorFlashErrorKind::OutOfBounds
            }
            StorageError::Flash(_) => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for StorageError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => StorageError::NotAligned,
            NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
            _ => StorageError::Flash(FlashError::WriteFailed),
        }
    }
}

impl From<FlashError> for StorageError {
    fn from(e: FlashError) -> Self {
        StorageError::Flash(e)
    }
}

/// `ERASE` must equal the device's sector size.
pub struct NorStorage<D: FlashDevice, const ERASE: usize = 4096> {
    device: D,
    region: FlashRegion,
}

impl<D: FlashDevice, const ERASE: usize> NorStorage<D, ERASE> {
    /// Open `device` and check that `region` fits it with `ERASE`-byte sectors.
    pub fn new(mut device: D, region: FlashRegion) -> Result<Self, FlashError> {
        if let Err(e) = device.open() {
            device.close();
            return Err(e);
        }
        let storage = Self { device, region };

        let sector_size = storage.device.sector_size();
        if sector_size != ERASE as i32 || !region.is_sector_aligned(ERASE as u32) {
            return Err(FlashError::UnsupportedDevice);
        }
        let base = storage.device.base_address();
        let end = capacity(&storage.device).ok_or(FlashError::NotOpen)? as u64 + base as u64;
        if region.start_address < base || region.end() as u64 > end {
            return Err(FlashError::OutOfBounds);
        }
        Ok(storage)
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }
}

impl<D: FlashDevice, const ERASE: usize> Drop for NorStorage<D, ERASE> {
    fn drop(&mut self) {
        self.device.close();
    }
}

impl<D: FlashDevice, const ERASE: usize> ErrorType for NorStorage<D, ERASE> {
    type Error = StorageError;
}

impl<D: FlashDevice, const ERASE: usize> ReadNorFlash for NorStorage<D, ERASE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        self.device.read(self.region.start_address + offset, bytes)?;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.region.size as usize
    }
}

impl<D: FlashDevice, const ERASE: usize> NorFlash for NorStorage<D, ERASE> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        let start = self.region.start_address;
        self.device.erase(start + from, start + to)?;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        self.device.write(self.region.start_address + offset, bytes)?;
        Ok(())
    }
}
