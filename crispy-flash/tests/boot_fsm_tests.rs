// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the boot decision FSM.

use crispy_flash::boot_fsm::{
    classify_app_crc, decide, has_application, AppCheck, BootState, BootStep,
};
use crispy_flash::layout::NO_VERSION;
use crispy_flash::BootloaderParams;

fn make_params(downloaded: bool, boot_ok: bool) -> BootloaderParams {
    let mut params = BootloaderParams::init_defaults(1);
    params.new_fw_downloaded = downloaded;
    params.new_fw_boot_ok = boot_ok;
    params.crc = params.compute_crc();
    params
}

// =============================================================================
// has_application tests
// =============================================================================

#[test]
fn test_erased_version_means_no_application() {
    assert!(!has_application(NO_VERSION));
    assert!(!has_application(0xFFFF_FFFF));
}

#[test]
fn test_any_other_version_is_an_application() {
    assert!(has_application(0));
    assert!(has_application(1));
    assert!(has_application(0xFFFF_FFFE));
}

// =============================================================================
// classify_app_crc tests
// =============================================================================

#[test]
fn test_matching_crc_is_valid() {
    assert_eq!(classify_app_crc(0x1234, 0x1234), AppCheck::Valid);
}

#[test]
fn test_erased_crc_slot_is_first_programming() {
    assert_eq!(
        classify_app_crc(0xFFFF, 0x1234),
        AppCheck::FirstProgramming { computed: 0x1234 }
    );
}

#[test]
fn test_erased_slot_matching_content_is_valid() {
    // An image whose CRC happens to be 0xFFFF is indistinguishable from valid
    assert_eq!(classify_app_crc(0xFFFF, 0xFFFF), AppCheck::Valid);
}

#[test]
fn test_other_mismatch_is_damaged() {
    assert_eq!(
        classify_app_crc(0x0001, 0x1234),
        AppCheck::Damaged {
            stored: 0x0001,
            computed: 0x1234,
        }
    );
}

// =============================================================================
// decide tests
// =============================================================================

#[test]
fn test_idle_when_nothing_pending() {
    assert_eq!(decide(&make_params(false, true)), BootStep::Idle);
}

#[test]
fn test_install_when_download_pending() {
    assert_eq!(decide(&make_params(true, true)), BootStep::InstallUpdate);
}

#[test]
fn test_restore_when_boot_not_confirmed() {
    assert_eq!(decide(&make_params(false, false)), BootStep::RestoreBackup);
}

#[test]
fn test_restore_takes_priority_over_install() {
    assert_eq!(decide(&make_params(true, false)), BootStep::RestoreBackup);
}

#[test]
fn test_defaults_decide_idle() {
    assert_eq!(decide(&BootloaderParams::init_defaults(7)), BootStep::Idle);
}

// =============================================================================
// BootState mapping
// =============================================================================

#[test]
fn test_step_maps_to_state() {
    assert_eq!(BootState::from(BootStep::RestoreBackup), BootState::RestoreBackup);
    assert_eq!(BootState::from(BootStep::InstallUpdate), BootState::InstallUpdate);
    assert_eq!(BootState::from(BootStep::Idle), BootState::Idle);
}
