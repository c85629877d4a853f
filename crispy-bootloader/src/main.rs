// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Crispy Bootloader for RP2040 with external-flash update and rollback.

#![no_std]
#![no_main]

mod boot;
mod flash;
mod peripherals;

use crispy_flash::spi_nor::{identify, ExternalFlash, Family, PageFlash, SpiNor, Sst25Flash};
use crispy_flash::{BootOutcome, Bootloader, InternalFlash, RegionMap};
use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    defmt::println!(
        "Bootloader init (version 0x{:08x})",
        crispy_flash::BOOTLOADER_VERSION
    );

    let p = match peripherals::init() {
        Ok(p) => p,
        Err(_) => {
            defmt::error!("Clock init failed");
            boot::halt();
        }
    };

    let nvm = unsafe { flash::Rp2040Nvm::new() };
    let mut internal = InternalFlash::new(nvm, &p.watchdog);

    let mut nor = SpiNor::new(p.external_spi, &p.watchdog);
    let family = nor.read_jedec_id().ok().and_then(identify).map(|chip| chip.family);
    let mut external = match family {
        Some(Family::Sst25Aai) => ExternalFlash::Sst25(Sst25Flash::new(nor)),
        Some(Family::PageProgram) => ExternalFlash::Page(PageFlash::new(nor)),
        None => {
            // open() keeps failing, so update steps are skipped and the
            // installed application still boots
            defmt::warn!("No supported external flash found");
            ExternalFlash::Page(PageFlash::new(nor))
        }
    };

    let report = Bootloader::new(&mut internal, &mut external).run();
    defmt::info!("{}", report);

    match report.outcome {
        BootOutcome::Boot { vector_table } => {
            boot::jump(vector_table, &RegionMap::DEFAULT.application)
        }
        BootOutcome::Fatal(reason) => {
            defmt::error!("Fatal: {}", reason);
            boot::halt()
        }
    }
}
