// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crispy_flash::layout::{APP_ADDR, APP_MAX_SIZE};
use crispy_flash::BOOTLOADER_VERSION;

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "crispy-image")]
#[command(about = "Stamp and inspect crispy-bootloader application images")]
pub struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Pad a firmware binary to the application region, fill in its header and append the CRC
    Stamp {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Stamped image output
        #[arg(short, long)]
        output: PathBuf,

        /// Firmware version number
        #[arg(long, value_parser = parse_u32)]
        version: u32,

        /// Address the image is flashed to
        #[arg(long, value_parser = parse_u32, default_value_t = APP_ADDR)]
        load_address: u32,

        /// Application region size
        #[arg(long, value_parser = parse_u32, default_value_t = APP_MAX_SIZE)]
        region_size: u32,
    },

    /// Check a stamped image the way the bootloader does
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Also require the image to be exactly this long
        #[arg(long, value_parser = parse_u32)]
        region_size: Option<u32>,
    },

    /// Print the header and CRC of an image
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Decode a bootloader parameter record dump
    Params {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Byte offset of the record inside the dump
        #[arg(long, value_parser = parse_u32, default_value_t = 0)]
        offset: u32,

        /// Bootloader version the record must belong to
        #[arg(long, value_parser = parse_u32)]
        expect_version: Option<u32>,
    },

    /// Write a parameter record, e.g. to flag a download for installation
    MakeParams {
        /// Record output
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_parser = parse_u32, default_value_t = BOOTLOADER_VERSION)]
        bootloader_version: u32,

        /// Set new_fw_downloaded
        #[arg(long)]
        downloaded: bool,

        /// Clear new_fw_boot_ok
        #[arg(long)]
        unconfirmed: bool,
    },
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Stamp {
            file,
            output,
            version,
            load_address,
            region_size,
        } => commands::stamp(&file, &output, version, load_address, region_size),
        Commands::Verify { file, region_size } => commands::verify(&file, region_size),
        Commands::Info { file } => commands::info(&file),
        Commands::Params {
            file,
            offset,
            expect_version,
        } => commands::params(&file, offset, expect_version),
        Commands::MakeParams {
            output,
            bootloader_version,
            downloaded,
            unconfirmed,
        } => commands::make_params(&output, bootloader_version, downloaded, !unconfirmed),
    }
}
