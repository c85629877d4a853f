// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash region map and firmware image header layout.
//!
//! Internal NVM is the RP2040 XIP flash mapped at [`FLASH_BASE`]. The external
//! SPI NOR chip is addressed from 0 and holds the backup and download images.

// --- Internal flash geometry ---

pub const FLASH_BASE: u32 = 0x1000_0000;
pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const FLASH_PAGE_SIZE: u32 = 256;

// --- Region map ---

pub const BOOTLOADER_ADDR: u32 = 0x1000_0000;
pub const BOOTLOADER_SIZE: u32 = 64 * 1024;

pub const PARAMS_ADDR: u32 = 0x1001_0000;
pub const PARAMS_SIZE: u32 = FLASH_SECTOR_SIZE;

pub const APP_ADDR: u32 = 0x1002_0000;
pub const APP_MAX_SIZE: u32 = 512 * 1024;

/// Backup and download live on the external chip.
pub const BACKUP_ADDR: u32 = 0x0000_0000;
pub const DOWNLOAD_ADDR: u32 = 0x0008_0000;

// --- Firmware image header ---

/// Header sits right after the Cortex-M0+ vector table (48 entries).
pub const FW_HEADER_OFFSET: u32 = 0xC0;
pub const FW_SIGNATURE: u64 = u64::from_le_bytes(*b"CRISPYFW");

/// Version read from an erased header slot: no application present.
pub const NO_VERSION: u32 = 0xFFFF_FFFF;

/// Logical flash region. Several regions may live on the same device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    pub name: &'static str,
    pub start_address: u32,
    pub size: u32,
}

impl FlashRegion {
    pub const fn new(name: &'static str, start_address: u32, size: u32) -> Self {
        Self {
            name,
            start_address,
            size,
        }
    }

    /// One past the last address.
    pub const fn end(&self) -> u32 {
        self.start_address + self.size
    }

    /// Bytes covered by the trailing CRC.
    pub const fn payload_size(&self) -> u32 {
        self.size - 2
    }

    /// Address of the two trailing CRC bytes.
    pub const fn crc_address(&self) -> u32 {
        self.start_address + self.payload_size()
    }

    /// Address of the header's `version` field.
    pub const fn version_address(&self) -> u32 {
        self.start_address + FW_HEADER_OFFSET + FirmwareHeader::VERSION_OFFSET
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start_address && addr < self.end()
    }

    pub const fn is_sector_aligned(&self, sector_size: u32) -> bool {
        self.start_address % sector_size == 0 && self.size % sector_size == 0
    }
}

/// Where everything lives. The bootloader uses [`RegionMap::DEFAULT`]; tests
/// build smaller maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionMap {
    pub bootloader: FlashRegion,
    pub params: FlashRegion,
    pub application: FlashRegion,
    pub backup: FlashRegion,
    pub download: FlashRegion,
}

impl RegionMap {
    pub const DEFAULT: RegionMap = RegionMap {
        bootloader: FlashRegion::new("bootloader", BOOTLOADER_ADDR, BOOTLOADER_SIZE),
        params: FlashRegion::new("params", PARAMS_ADDR, PARAMS_SIZE),
        application: FlashRegion::new("application", APP_ADDR, APP_MAX_SIZE),
        backup: FlashRegion::new("backup", BACKUP_ADDR, APP_MAX_SIZE),
        download: FlashRegion::new("download", DOWNLOAD_ADDR, APP_MAX_SIZE),
    };
}

// Compile-time layout checks
const _: () = assert!(RegionMap::DEFAULT.application.is_sector_aligned(FLASH_SECTOR_SIZE));
const _: () = assert!(RegionMap::DEFAULT.backup.is_sector_aligned(FLASH_SECTOR_SIZE));
const _: () = assert!(RegionMap::DEFAULT.download.is_sector_aligned(FLASH_SECTOR_SIZE));
const _: () = assert!(BOOTLOADER_ADDR + BOOTLOADER_SIZE <= PARAMS_ADDR);
const _: () = assert!(PARAMS_ADDR + PARAMS_SIZE <= APP_ADDR);
const _: () = assert!(BACKUP_ADDR + APP_MAX_SIZE <= DOWNLOAD_ADDR);

/// Header embedded in every application image at [`FW_HEADER_OFFSET`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareHeader {
    pub signature: u64,
    pub version: u32,
    pub load_address: u32,
    pub start_address: u32,
    pub end_address: u32,
}

impl FirmwareHeader {
    pub const SIZE: usize = 24;
    pub const VERSION_OFFSET: u32 = 8;

    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        let word = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&raw[..8]);
        Self {
            signature: u64::from_le_bytes(signature),
            version: word(8),
            load_address: word(12),
            start_address: word(16),
            end_address: word(20),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        raw[..8].copy_from_slice(&self.signature.to_le_bytes());
        raw[8..12].copy_from_slice(&self.version.to_le_bytes());
        raw[12..16].copy_from_slice(&self.load_address.to_le_bytes());
        raw[16..20].copy_from_slice(&self.start_address.to_le_bytes());
        raw[20..24].copy_from_slice(&self.end_address.to_le_bytes());
        raw
    }

    pub fn has_signature(&self) -> bool {
        self.signature == FW_SIGNATURE
    }
}
