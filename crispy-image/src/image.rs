// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Application image stamping and inspection.
//!
//! A stamped image is exactly one application region long:
//!
//! ```text
//! 0x000  vector table
//! 0x0C0  FirmwareHeader (24 bytes)
//!  ...   firmware, then 0xFF padding
//! -2     CRC16 of everything before it, little-endian
//! ```

use anyhow::{bail, Result};
use log::{debug, warn};

use crispy_flash::crc16::image_crc;
use crispy_flash::layout::{APP_ADDR, APP_MAX_SIZE, FW_HEADER_OFFSET, FW_SIGNATURE, NO_VERSION};
use crispy_flash::FirmwareHeader;

const HEADER_START: usize = FW_HEADER_OFFSET as usize;
const HEADER_END: usize = HEADER_START + FirmwareHeader::SIZE;

/// Where and how an image gets stamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StampOptions {
    pub version: u32,
    /// Region the image is flashed to; also the padded image length.
    pub load_address: u32,
    pub region_size: u32,
}

impl StampOptions {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            load_address: APP_ADDR,
            region_size: APP_MAX_SIZE,
        }
    }
}

/// Pad `firmware` to the region, fill in the header and append the CRC.
///
/// The header slot must be reserved by the firmware's linker script: it has
/// to be erased, zeroed or hold a previous header.
pub fn stamp(firmware: &[u8], opts: &StampOptions) -> Result<Vec<u8>> {
    if opts.version == NO_VERSION {
        bail!("Version 0x{:08x} marks an empty slot", NO_VERSION);
    }
    let region_size = opts.region_size as usize;
    if region_size < HEADER_END + 2 {
        bail!("Region of {} bytes cannot hold the image header", region_size);
    }
    if firmware.len() < HEADER_END {
        bail!(
            "Firmware is {} bytes, shorter than the header end at 0x{:x}",
            firmware.len(),
            HEADER_END
        );
    }
    if firmware.len() > region_size - 2 {
        bail!(
            "Firmware is {} bytes, region holds at most {} plus the CRC",
            firmware.len(),
            region_size - 2
        );
    }

    let slot = &firmware[HEADER_START..HEADER_END];
    let previous = header_at(firmware);
    if !previous.has_signature()
        && !slot.iter().all(|&b| b == 0xFF)
        && !slot.iter().all(|&b| b == 0x00)
    {
        bail!(
            "Header slot at 0x{:x} holds firmware data; reserve it in the linker script",
            HEADER_START
        );
    }

    let header = FirmwareHeader {
        signature: FW_SIGNATURE,
        version: opts.version,
        load_address: opts.load_address,
        start_address: reset_vector(firmware),
        end_address: opts.load_address + firmware.len() as u32,
    };
    debug!("stamping {:x?}", header);

    let mut image = vec![0xFF; region_size];
    image[..firmware.len()].copy_from_slice(firmware);
    image[HEADER_START..HEADER_END].copy_from_slice(&header.to_bytes());

    let payload = region_size - 2;
    let crc = match image_crc(&image) {
        Some(crc) => crc,
        None => bail!("Image too short for a CRC"),
    };
    image[payload..].copy_from_slice(&crc.to_le_bytes());
    Ok(image)
}

/// What a stamped image says about itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub len: usize,
    pub header: FirmwareHeader,
    pub stored_crc: u16,
    pub computed_crc: u16,
}

impl ImageInfo {
    pub fn crc_ok(&self) -> bool {
        self.stored_crc == self.computed_crc
    }
}

pub fn inspect(image: &[u8]) -> Result<ImageInfo> {
    if image.len() < HEADER_END + 2 {
        bail!("Image is {} bytes, too short to hold a header", image.len());
    }
    let computed_crc = match image_crc(image) {
        Some(crc) => crc,
        None => bail!("Image too short for a CRC"),
    };
    let tail = image.len() - 2;
    Ok(ImageInfo {
        len: image.len(),
        header: header_at(image),
        stored_crc: u16::from_le_bytes([image[tail], image[tail + 1]]),
        computed_crc,
    })
}

/// Check a stamped image the way the bootloader will.
pub fn verify(image: &[u8], region_size: Option<u32>) -> Result<ImageInfo> {
    let info = inspect(image)?;
    if let Some(size) = region_size {
        if info.len != size as usize {
            bail!("Image is {} bytes, region is {}", info.len, size);
        }
    }
    if !info.header.has_signature() {
        warn!("image has no header signature");
    }
    if info.header.version == NO_VERSION {
        bail!("Image has no version, the bootloader treats it as absent");
    }
    if !info.crc_ok() {
        bail!(
            "CRC mismatch: stored 0x{:04x}, computed 0x{:04x}",
            info.stored_crc,
            info.computed_crc
        );
    }
    Ok(info)
}

fn header_at(image: &[u8]) -> FirmwareHeader {
    let mut raw = [0u8; FirmwareHeader::SIZE];
    raw.copy_from_slice(&image[HEADER_START..HEADER_END]);
    FirmwareHeader::from_bytes(&raw)
}

/// Second word of the vector table.
fn reset_vector(firmware: &[u8]) -> u32 {
    u32::from_le_bytes([firmware[4], firmware[5], firmware[6], firmware[7]])
}
