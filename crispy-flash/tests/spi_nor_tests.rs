// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the SST25 (AAI) and page-program SPI NOR drivers.

mod common;

use common::{CountingWatchdog, SimSpiNor, TEST_POLLS};
use crispy_flash::spi_nor::{opcode, ExternalFlash, Family, PageFlash, SpiNor, Sst25Flash};
use crispy_flash::{FlashDevice, FlashError, NoWatchdog, NO_PAGE};

fn nor(sim: &mut SimSpiNor) -> SpiNor<&mut SimSpiNor, NoWatchdog> {
    SpiNor::new(sim, NoWatchdog).with_poll_policy(TEST_POLLS)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 + 5) as u8).collect()
}

// =============================================================================
// Identification
// =============================================================================

#[test]
fn test_probe_selects_sst25_driver() {
    let mut sim = SimSpiNor::sst25vf016b();
    let flash = ExternalFlash::probe(nor(&mut sim)).unwrap();
    assert_eq!(flash.family(), Family::Sst25Aai);
}

#[test]
fn test_probe_selects_page_driver() {
    let mut sim = SimSpiNor::w25q16();
    let flash = ExternalFlash::probe(nor(&mut sim)).unwrap();
    assert_eq!(flash.family(), Family::PageProgram);
}

#[test]
fn test_probe_rejects_unknown_chip() {
    let mut sim = SimSpiNor::unknown();
    assert!(matches!(
        ExternalFlash::probe(nor(&mut sim)),
        Err(FlashError::UnsupportedDevice)
    ));
}

#[test]
fn test_open_rejects_wrong_family() {
    let mut sim = SimSpiNor::w25q16();
    let mut flash = Sst25Flash::new(nor(&mut sim));
    assert_eq!(flash.open(), Err(FlashError::UnsupportedDevice));
    assert_eq!(flash.sector_size(), 0);
}

#[test]
fn test_open_reports_geometry_and_clears_protection() {
    let mut sim = SimSpiNor::sst25vf016b();
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.open().unwrap();
        assert_eq!(flash.sector_size(), 4096);
        assert_eq!(flash.sector_count(), 512);
        assert_eq!(flash.page_size(), NO_PAGE);
    }
    assert_eq!(sim.protect, 0);
    assert_eq!(sim.violations, 0);
}

#[test]
fn test_operations_before_open_fail() {
    let mut sim = SimSpiNor::w25q16();
    let mut flash = PageFlash::new(nor(&mut sim));
    let mut buf = [0u8; 4];
    assert_eq!(flash.read(0, &mut buf), Err(FlashError::NotOpen));
    assert_eq!(flash.write(0, &buf), Err(FlashError::NotOpen));
    assert_eq!(flash.erase(0, 4096), Err(FlashError::NotOpen));
}

// =============================================================================
// SST25 AAI programming
// =============================================================================

#[test]
fn test_sst25_odd_start_and_length_round_trip() {
    let mut sim = SimSpiNor::sst25vf016b();
    let data = pattern(102);
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.write(0x1001, &data).unwrap();

        let mut buf = vec![0u8; data.len()];
        flash.read(0x1001, &mut buf).unwrap();
        assert_eq!(buf, data);
    }
    // Leading and trailing odd bytes, 50 words in between
    assert_eq!(sim.byte_programs, 2);
    assert_eq!(sim.aai_words, 50);
    assert_eq!(sim.violations, 0);
    assert_eq!(sim.bytes(0x1000, 1), &[0xFF]);
    assert_eq!(sim.bytes(0x1001 + 102, 1), &[0xFF]);
}

#[test]
fn test_sst25_aligned_write_uses_only_aai() {
    let mut sim = SimSpiNor::sst25vf016b();
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.write(0x2000, &[1, 2, 3, 4]).unwrap();
    }
    assert_eq!(sim.byte_programs, 0);
    assert_eq!(sim.aai_words, 2);
    assert_eq!(sim.bytes(0x2000, 4), &[1, 2, 3, 4]);
}

#[test]
fn test_sst25_single_odd_byte() {
    let mut sim = SimSpiNor::sst25vf016b();
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.write(0x3003, &[0x42]).unwrap();
    }
    assert_eq!(sim.byte_programs, 1);
    assert_eq!(sim.aai_words, 0);
    assert_eq!(sim.bytes(0x3002, 3), &[0xFF, 0x42, 0xFF]);
    assert_eq!(sim.violations, 0);
}

#[test]
fn test_sst25_chip_erase_opcode() {
    let mut sim = SimSpiNor::sst25vf016b();
    sim.load(0x100, &[0u8; 16]);
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.erase_all().unwrap();
    }
    assert_eq!(sim.erases, vec![(opcode::CHIP_ERASE_SST, 0)]);
    assert_eq!(sim.bytes(0x100, 16), &[0xFF; 16]);
}

// =============================================================================
// Page program
// =============================================================================

#[test]
fn test_page_write_splits_at_page_boundaries() {
    let mut sim = SimSpiNor::w25q16();
    let data = pattern(600);
    {
        let mut flash = PageFlash::new(nor(&mut sim));
        flash.open().unwrap();
        assert_eq!(flash.page_size(), 256);
        flash.write(0x1F0, &data).unwrap();

        let mut buf = vec![0u8; data.len()];
        flash.read(0x1F0, &mut buf).unwrap();
        assert_eq!(buf, data);
    }
    // 16 + 256 + 256 + 72 bytes
    assert_eq!(sim.page_programs, 4);
    assert_eq!(sim.violations, 0);
}

#[test]
fn test_page_chip_erase_opcode() {
    let mut sim = SimSpiNor::w25q16();
    {
        let mut flash = PageFlash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.erase_all().unwrap();
    }
    assert_eq!(sim.erases, vec![(opcode::CHIP_ERASE, 0)]);
}

#[test]
fn test_page_write_feeds_watchdog() {
    let watchdog = CountingWatchdog::default();
    let mut sim = SimSpiNor::w25q16();
    sim.busy_cycles = 0;
    {
        let mut flash = PageFlash::new(SpiNor::new(&mut sim, &watchdog));
        flash.open().unwrap();
        flash.write(0, &[0u8; 1024]).unwrap();
    }
    assert_eq!(watchdog.feeds.get(), 4);
}

// =============================================================================
// Erase planning
// =============================================================================

#[test]
fn test_erase_uses_largest_aligned_blocks() {
    let mut sim = SimSpiNor::w25q16();
    {
        let mut flash = PageFlash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.erase(0, 0x1_9000).unwrap();
    }
    assert_eq!(
        sim.erases,
        vec![
            (opcode::ERASE_64K, 0),
            (opcode::ERASE_32K, 0x1_0000),
            (opcode::ERASE_4K, 0x1_8000),
        ]
    );
}

#[test]
fn test_erase_rounds_to_sectors() {
    let mut sim = SimSpiNor::sst25vf016b();
    sim.load(0x1000, &vec![0u8; 0x2000]);
    {
        let mut flash = Sst25Flash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.erase(0x1100, 0x2001).unwrap();
    }
    assert_eq!(
        sim.erases,
        vec![(opcode::ERASE_4K, 0x1000), (opcode::ERASE_4K, 0x2000)]
    );
    assert!(sim.bytes(0x1000, 0x2000).iter().all(|&b| b == 0xFF));
}

#[test]
fn test_unaligned_start_steps_up_to_larger_blocks() {
    let mut sim = SimSpiNor::w25q16();
    {
        let mut flash = PageFlash::new(nor(&mut sim));
        flash.open().unwrap();
        flash.erase(0x7000, 0x1_0000).unwrap();
    }
    assert_eq!(
        sim.erases,
        vec![(opcode::ERASE_4K, 0x7000), (opcode::ERASE_32K, 0x8000)]
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_out_of_range_rejected() {
    let mut sim = SimSpiNor::w25q16();
    let mut flash = PageFlash::new(nor(&mut sim));
    flash.open().unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(flash.read(2 * 1024 * 1024 - 4, &mut buf), Err(FlashError::OutOfBounds));
    assert_eq!(flash.write(2 * 1024 * 1024, &buf), Err(FlashError::OutOfBounds));
    assert_eq!(
        flash.erase(2 * 1024 * 1024 - 4096, 2 * 1024 * 1024 + 1),
        Err(FlashError::OutOfBounds)
    );
}

#[test]
fn test_bus_failure_maps_to_read_failed() {
    let mut sim = SimSpiNor::w25q16();
    sim.fail_reads = true;
    let mut flash = PageFlash::new(nor(&mut sim));
    assert_eq!(flash.open(), Err(FlashError::ReadFailed));
}

#[test]
fn test_external_flash_delegates_to_driver() {
    let mut sim = SimSpiNor::w25q16();
    {
        let mut flash = ExternalFlash::probe(nor(&mut sim)).unwrap();
        let device: &mut dyn FlashDevice = &mut flash;
        device.open().unwrap();
        assert_eq!(device.sector_count(), 512);
        assert_eq!(device.page_size(), 256);
        device.write(0x10, b"crispy").unwrap();
        device.close();
    }
    assert_eq!(sim.bytes(0x10, 6), b"crispy");
}
