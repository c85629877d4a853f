// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for crispy-bootloader application images.
//!
//! Usage:
//!   crispy-image stamp app.bin -o app.img --version 0x00010002
//!   crispy-image verify app.img
//!   crispy-image info app.img
//!   crispy-image params params.bin

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    env_logger::builder()
        .filter_level(args.log_level())
        .format_timestamp(None)
        .init();
    cli::run(args)
}
