// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot decision FSM - pure logic without hardware dependencies.
//!
//! The bootloader feeds this module values it read from flash (the
//! application's version field, stored and computed CRC, the parameter
//! record) and acts on the returned decisions.
//!
//! ```text
//! Verify --(no application)--> Fatal
//!    |
//!    +--(!new_fw_boot_ok)------> RestoreBackup --+
//!    +--(new_fw_downloaded)----> InstallUpdate --+--> Boot
//!    +--(otherwise)------------> Idle -----------+
//! ```

use crate::crc16::CRC16_ERASED;
use crate::layout::NO_VERSION;
use crate::params::BootloaderParams;

/// States of the boot procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootState {
    Verify,
    RestoreBackup,
    InstallUpdate,
    Idle,
    Boot,
    Fatal,
}

/// Outcome of the application CRC check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppCheck {
    Valid,
    /// CRC slot still erased: the image was flashed without a stamp.
    FirstProgramming { computed: u16 },
    /// Content and stored CRC disagree. Boot continues anyway.
    Damaged { stored: u16, computed: u16 },
}

/// Step taken between Verify and Boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStep {
    /// The last installed image never confirmed its boot.
    RestoreBackup,
    /// A downloaded image waits for installation.
    InstallUpdate,
    Idle,
}

impl From<BootStep> for BootState {
    fn from(step: BootStep) -> Self {
        match step {
            BootStep::RestoreBackup => BootState::RestoreBackup,
            BootStep::InstallUpdate => BootState::InstallUpdate,
            BootStep::Idle => BootState::Idle,
        }
    }
}

/// An erased version field means nothing was ever programmed.
pub fn has_application(version: u32) -> bool {
    version != NO_VERSION
}

pub fn classify_app_crc(stored: u16, computed: u16) -> AppCheck {
    if stored == computed {
        AppCheck::Valid
    } else if stored == CRC16_ERASED {
        AppCheck::FirstProgramming { computed }
    } else {
        AppCheck::Damaged { stored, computed }
    }
}

/// Pick the step for the current parameter record. Restore takes priority.
pub fn decide(params: &BootloaderParams) -> BootStep {
    if !params.new_fw_boot_ok {
        BootStep::RestoreBackup
    } else if params.new_fw_downloaded {
        BootStep::InstallUpdate
    } else {
        BootStep::Idle
    }
}
