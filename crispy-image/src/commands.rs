// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crispy_flash::params::PARAMS_RECORD_SIZE;
use crispy_flash::BootloaderParams;
use crispy_image::image::{self, ImageInfo, StampOptions};

fn read_file(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn write_file(file: &Path, data: &[u8]) -> Result<()> {
    fs::write(file, data).with_context(|| format!("Failed to write {}", file.display()))
}

/// Stamp a firmware binary into a flashable application image.
pub fn stamp(file: &Path, output: &Path, version: u32, load_address: u32, region_size: u32) -> Result<()> {
    let firmware = read_file(file)?;
    let opts = StampOptions {
        version,
        load_address,
        region_size,
    };
    let stamped = image::stamp(&firmware, &opts)
        .with_context(|| format!("Cannot stamp {}", file.display()))?;
    write_file(output, &stamped)?;

    let info = image::inspect(&stamped)?;
    info!(
        "{} -> {} ({} bytes firmware, {} bytes image)",
        file.display(),
        output.display(),
        firmware.len(),
        stamped.len()
    );
    print_info(&info);
    Ok(())
}

pub fn verify(file: &Path, region_size: Option<u32>) -> Result<()> {
    let data = read_file(file)?;
    let info = image::verify(&data, region_size)
        .with_context(|| format!("{} is not a valid image", file.display()))?;
    println!(
        "{}: OK (version 0x{:08x}, CRC 0x{:04x})",
        file.display(),
        info.header.version,
        info.stored_crc
    );
    Ok(())
}

pub fn info(file: &Path) -> Result<()> {
    let data = read_file(file)?;
    let info = image::inspect(&data)?;
    println!("Image: {}", file.display());
    print_info(&info);
    Ok(())
}

fn print_info(info: &ImageInfo) {
    let header = &info.header;
    println!("  Size:          {} bytes", info.len);
    println!(
        "  Signature:     {}",
        if header.has_signature() { "present" } else { "missing" }
    );
    println!("  Version:       0x{:08x}", header.version);
    println!("  Load address:  0x{:08x}", header.load_address);
    println!("  Start address: 0x{:08x}", header.start_address);
    println!("  End address:   0x{:08x}", header.end_address);
    println!(
        "  CRC16:         stored 0x{:04x}, computed 0x{:04x} ({})",
        info.stored_crc,
        info.computed_crc,
        if info.crc_ok() { "match" } else { "MISMATCH" }
    );
}

/// Decode a parameter record from a flash dump.
pub fn params(file: &Path, offset: u32, expect_version: Option<u32>) -> Result<()> {
    let data = read_file(file)?;
    let start = offset as usize;
    let raw: [u8; PARAMS_RECORD_SIZE] = match data.get(start..start + PARAMS_RECORD_SIZE) {
        Some(slice) => slice.try_into()?,
        None => bail!(
            "{} has no {}-byte record at offset {}",
            file.display(),
            PARAMS_RECORD_SIZE,
            offset
        ),
    };

    let decoded = match expect_version {
        Some(version) => BootloaderParams::validate(&raw, version),
        None => BootloaderParams::decode(&raw),
    };
    let params = decoded.with_context(|| {
        format!(
            "Invalid record {:02x?} (the bootloader would reset it to defaults)",
            raw
        )
    })?;

    println!("Bootloader parameters:");
    println!("  Bootloader version: 0x{:08x}", params.bootloader_version);
    println!("  New FW downloaded:  {}", params.new_fw_downloaded);
    println!("  New FW boot OK:     {}", params.new_fw_boot_ok);
    println!("  CRC16:              0x{:04x}", params.crc);
    Ok(())
}

/// Write a valid parameter record.
pub fn make_params(output: &Path, bootloader_version: u32, downloaded: bool, boot_ok: bool) -> Result<()> {
    let mut params = BootloaderParams::init_defaults(bootloader_version);
    params.new_fw_downloaded = downloaded;
    params.new_fw_boot_ok = boot_ok;
    params.crc = params.compute_crc();
    write_file(output, &params.to_bytes())?;
    info!(
        "wrote {} (downloaded={}, boot_ok={})",
        output.display(),
        downloaded,
        boot_ok
    );
    Ok(())
}
