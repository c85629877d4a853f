// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash storage abstraction and rollback boot procedure for crispy-bootloader.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std`, no logging
//! - `std` feature: `std::error::Error` impls for host tools
//! - `defmt` / `log` features: route internal logging to either backend
//!
//! Layers, leaf first:
//! - [`crc16`]: the one checksum used for images and the parameter record
//! - [`device`]: the [`FlashDevice`] contract, with [`internal`] and
//!   [`spi_nor`] drivers behind it
//! - [`params`]: the persisted 8-byte boot state record
//! - [`copy`]: CRC-verified flash-to-flash image copy
//! - [`bootloader`]: the verify / restore / install / boot procedure

#![cfg_attr(not(feature = "std"), no_std)]

// This must go first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod boot_fsm;
pub mod bootloader;
pub mod copy;
pub mod crc16;
pub mod device;
pub mod error;
pub mod internal;
pub mod layout;
pub mod params;
pub mod spi_nor;
pub mod storage;
pub mod watchdog;

// Re-export commonly used types
pub use bootloader::{BootOutcome, BootReport, Bootloader, FatalReason, UpdateError};
pub use copy::{copy, CopyDirection, COPY_CHUNK_SIZE};
pub use crc16::{crc16, CRC16_ERASED, CRC16_INIT};
pub use device::{image_is_valid, region_crc, FlashDevice, OpenDevice, NO_PAGE};
pub use error::{CopyError, FlashError};
pub use internal::{InternalFlash, NvmController, NvmGeometry};
pub use layout::{FirmwareHeader, FlashRegion, RegionMap};
pub use params::{BootloaderParams, ParamError, ParamStore, BOOTLOADER_VERSION};
pub use spi_nor::{ExternalFlash, PageFlash, SpiNor, Sst25Flash};
pub use watchdog::{NoWatchdog, PollPolicy, Watchdog};
