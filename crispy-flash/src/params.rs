// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Persisted bootloader parameters: the device's update state.
//!
//! Record layout (8 bytes, little-endian):
//!
//! | offset | field                | size |
//! |--------|----------------------|------|
//! | 0      | `bootloader_version` | 4    |
//! | 4      | `new_fw_downloaded`  | 1    |
//! | 5      | `new_fw_boot_ok`     | 1    |
//! | 6      | `crc`                | 2    |
//!
//! `crc` is the CRC16 of bytes 0..6. Every setter persists immediately.

use core::fmt;

use crate::crc16::{crc16, CRC16_INIT};
use crate::device::{FlashDevice, OpenDevice};
use crate::error::FlashError;

pub const PARAMS_RECORD_SIZE: usize = 8;

/// Version compiled into this bootloader build.
pub const BOOTLOADER_VERSION: u32 = 0x0001_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootloaderParams {
    pub bootloader_version: u32,
    /// A new image waits in the download region.
    pub new_fw_downloaded: bool,
    /// The running image confirmed a successful boot.
    pub new_fw_boot_ok: bool,
    pub crc: u16,
}

/// Why a stored record was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamError {
    ReadFailed(FlashError),
    CrcMismatch { stored: u16, computed: u16 },
    VersionMismatch { stored: u32, expected: u32 },
    InvalidFlag(u8),
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::ReadFailed(e) => write!(f, "record read failed: {}", e),
            ParamError::CrcMismatch { stored, computed } => write!(
                f,
                "record CRC mismatch: stored 0x{:04x}, computed 0x{:04x}",
                stored, computed
            ),
            ParamError::VersionMismatch { stored, expected } => write!(
                f,
                "bootloader version mismatch: stored 0x{:08x}, expected 0x{:08x}",
                stored, expected
            ),
            ParamError::InvalidFlag(v) => write!(f, "invalid flag byte 0x{:02x}", v),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParamError {}

impl BootloaderParams {
    /// Record written on first boot or after corruption.
    pub fn init_defaults(bootloader_version: u32) -> Self {
        let mut params = Self {
            bootloader_version,
            new_fw_downloaded: false,
            new_fw_boot_ok: true,
            crc: 0,
        };
        params.crc = params.compute_crc();
        params
    }

    pub fn compute_crc(&self) -> u16 {
        crc16(&self.to_bytes()[..6], CRC16_INIT)
    }

    pub fn is_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    pub fn to_bytes(&self) -> [u8; PARAMS_RECORD_SIZE] {
        let mut raw = [0u8; PARAMS_RECORD_SIZE];
        raw[..4].copy_from_slice(&self.bootloader_version.to_le_bytes());
        raw[4] = self.new_fw_downloaded as u8;
        raw[5] = self.new_fw_boot_ok as u8;
        raw[6..].copy_from_slice(&self.crc.to_le_bytes());
        raw
    }

    /// Decode a raw record, checking its CRC and flag encoding.
    pub fn decode(raw: &[u8; PARAMS_RECORD_SIZE]) -> Result<Self, ParamError> {
        let stored = u16::from_le_bytes([raw[6], raw[7]]);
        let computed = crc16(&raw[..6], CRC16_INIT);
        if stored != computed {
            return Err(ParamError::CrcMismatch { stored, computed });
        }

        Ok(Self {
            bootloader_version: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            new_fw_downloaded: decode_flag(raw[4])?,
            new_fw_boot_ok: decode_flag(raw[5])?,
            crc: stored,
        })
    }

    /// Decode and additionally require `expected_version`.
    pub fn validate(raw: &[u8; PARAMS_RECORD_SIZE], expected_version: u32) -> Result<Self, ParamError> {
        let params = Self::decode(raw)?;
        if params.bootloader_version != expected_version {
            return Err(ParamError::VersionMismatch {
                stored: params.bootloader_version,
                expected: expected_version,
            });
        }
        Ok(params)
    }
}

fn decode_flag(raw: u8) -> Result<bool, ParamError> {
    match raw {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ParamError::InvalidFlag(other)),
    }
}

/// RAM mirror of the record at `address`, flushed on every change.
#[derive(Debug)]
pub struct ParamStore {
    address: u32,
    params: BootloaderParams,
}

impl ParamStore {
    /// Load the record, replacing it with defaults when it is unreadable,
    /// corrupt or written by another bootloader version.
    ///
    /// Only a failure to persist those defaults is returned.
    pub fn load(
        device: &mut dyn FlashDevice,
        address: u32,
        bootloader_version: u32,
    ) -> Result<Self, FlashError> {
        match read_record(device, address)
            .and_then(|raw| BootloaderParams::validate(&raw, bootloader_version))
        {
            Ok(params) => {
                debug!(
                    "params: downloaded={}, boot_ok={}",
                    params.new_fw_downloaded,
                    params.new_fw_boot_ok
                );
                Ok(Self { address, params })
            }
            Err(e) => {
                warn!("params: {:?}, restoring defaults", e);
                let mut store = Self {
                    address,
                    params: BootloaderParams::init_defaults(bootloader_version),
                };
                store.save(device)?;
                Ok(store)
            }
        }
    }

    /// Read an existing record without repairing it (application side).
    pub fn read(device: &mut dyn FlashDevice, address: u32) -> Result<Self, ParamError> {
        let raw = read_record(device, address)?;
        let params = BootloaderParams::decode(&raw)?;
        Ok(Self { address, params })
    }

    pub fn params(&self) -> &BootloaderParams {
        &self.params
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn new_fw_downloaded(&self) -> bool {
        self.params.new_fw_downloaded
    }

    pub fn new_fw_boot_ok(&self) -> bool {
        self.params.new_fw_boot_ok
    }

    pub fn set_new_fw_downloaded(
        &mut self,
        device: &mut dyn FlashDevice,
        value: bool,
    ) -> Result<(), FlashError> {
        if self.params.new_fw_downloaded == value {
            return Ok(());
        }
        self.params.new_fw_downloaded = value;
        self.save(device)
    }

    pub fn set_new_fw_boot_ok(
        &mut self,
        device: &mut dyn FlashDevice,
        value: bool,
    ) -> Result<(), FlashError> {
        if self.params.new_fw_boot_ok == value {
            return Ok(());
        }
        self.params.new_fw_boot_ok = value;
        self.save(device)
    }

    /// Called by a freshly installed application once it runs correctly.
    pub fn confirm_boot(&mut self, device: &mut dyn FlashDevice) -> Result<(), FlashError> {
        self.set_new_fw_boot_ok(device, true)
    }

    /// Called by the application after a complete image landed in the download region.
    pub fn request_update(&mut self, device: &mut dyn FlashDevice) -> Result<(), FlashError> {
        self.set_new_fw_downloaded(device, true)
    }

    /// Recompute the CRC and write the whole record.
    pub fn save(&mut self, device: &mut dyn FlashDevice) -> Result<(), FlashError> {
        self.params.crc = self.params.compute_crc();
        let mut dev = OpenDevice::open(device)?;
        dev.write(self.address, &self.params.to_bytes())
            .inspect_err(|e| error!("params: save failed: {:?}", e))
    }
}

fn read_record(device: &mut dyn FlashDevice, address: u32) -> Result<[u8; PARAMS_RECORD_SIZE], ParamError> {
    let mut dev = OpenDevice::open(device).map_err(ParamError::ReadFailed)?;
    let mut raw = [0u8; PARAMS_RECORD_SIZE];
    dev.read(address, &mut raw).map_err(ParamError::ReadFailed)?;
    Ok(raw)
}
