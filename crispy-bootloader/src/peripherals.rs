// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Peripheral initialization for the bootloader.

use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use rp2040_hal as hal;
use rp2040_hal::clocks::{Clock, InitError};
use rp2040_hal::fugit::{ExtU32, RateExtU32};
use rp2040_hal::gpio::bank0::{Gpio16, Gpio17, Gpio18, Gpio19};
use rp2040_hal::gpio::{FunctionSioOutput, FunctionSpi, Pin, PinState, PullDown};

/// Watchdog period once the boot procedure starts. The application inherits
/// the running watchdog.
const WATCHDOG_PERIOD_US: u32 = 2_000_000;

const EXTERNAL_SPI_HZ: u32 = 16_000_000;

type MosiPin = Pin<Gpio19, FunctionSpi, PullDown>;
type MisoPin = Pin<Gpio16, FunctionSpi, PullDown>;
type SclkPin = Pin<Gpio18, FunctionSpi, PullDown>;
type CsPin = Pin<Gpio17, FunctionSioOutput, PullDown>;

type ExternalBus = hal::spi::Spi<hal::spi::Enabled, hal::pac::SPI0, (MosiPin, MisoPin, SclkPin), 8>;

/// SPI0 with GP17 as chip select, wired to the external NOR chip.
pub type ExternalSpi = ExclusiveDevice<ExternalBus, CsPin, NoDelay>;

/// Hardware watchdog fed by the flash drivers while they wait.
pub struct BoardWatchdog(hal::Watchdog);

impl crispy_flash::Watchdog for BoardWatchdog {
    fn periodic(&self) {
        self.0.feed();
    }
}

pub struct Peripherals {
    pub watchdog: BoardWatchdog,
    pub external_spi: ExternalSpi,
}

pub fn init() -> Result<Peripherals, InitError> {
    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )?;
    watchdog.start(WATCHDOG_PERIOD_US.micros());

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mosi: MosiPin = pins.gpio19.into_function();
    let miso: MisoPin = pins.gpio16.into_function();
    let sclk: SclkPin = pins.gpio18.into_function();
    let cs: CsPin = pins.gpio17.into_push_pull_output_in_state(PinState::High);

    let bus = hal::spi::Spi::<_, _, _, 8>::new(pac.SPI0, (mosi, miso, sclk)).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        EXTERNAL_SPI_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );
    let external_spi = match ExclusiveDevice::new_no_delay(bus, cs) {
        Ok(device) => device,
        Err(never) => match never {},
    };

    Ok(Peripherals {
        watchdog: BoardWatchdog(watchdog),
        external_spi,
    })
}
