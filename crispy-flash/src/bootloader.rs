// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The boot procedure: load parameters, verify the application, restore or
//! install an image when the parameters ask for it, then hand over.
//!
//! Everything up to the jump runs here against `&mut dyn FlashDevice`, so the
//! same code drives the RP2040 and the host simulators. The jump itself is
//! left to the caller through [`BootOutcome::Boot`].
//!
//! Copy failures are logged and reported but never stop the boot: the
//! application region is only overwritten after the source image checked out,
//! and an install only starts once the current application is safely backed
//! up (or is already damaged, in which case the existing backup is kept) and
//! `new_fw_boot_ok` is cleared. An install that stops partway therefore ends
//! in a restore on the next boot.

use core::fmt;

use crate::boot_fsm::{classify_app_crc, decide, has_application, AppCheck, BootState, BootStep};
use crate::copy::{copy, CopyDirection};
use crate::device::{region_crc_pair, FlashDevice, OpenDevice};
use crate::error::{CopyError, FlashError};
use crate::layout::{FlashRegion, RegionMap};
use crate::params::{BootloaderParams, ParamStore, BOOTLOADER_VERSION};

/// Why the procedure stopped before booting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalReason {
    /// The application's version field is erased.
    NoApplication,
    /// The parameter record could not be persisted.
    ParamSaveFailed(FlashError),
    /// Internal flash could not be opened or read during verification.
    InternalFlash(FlashError),
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::NoApplication => f.write_str("no application present"),
            FatalReason::ParamSaveFailed(e) => write!(f, "parameter save failed: {}", e),
            FatalReason::InternalFlash(e) => write!(f, "internal flash: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FatalReason {}

/// Failure of a restore or install step. The boot continues regardless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// The source image does not match its own trailing CRC.
    SourceInvalid { stored: u16, computed: u16 },
    /// The source image could not be read for checking.
    Source(FlashError),
    Backup(CopyError),
    Install(CopyError),
    Restore(CopyError),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::SourceInvalid { stored, computed } => write!(
                f,
                "source image invalid: stored 0x{:04x}, computed 0x{:04x}",
                stored, computed
            ),
            UpdateError::Source(e) => write!(f, "source image unreadable: {}", e),
            UpdateError::Backup(e) => write!(f, "backup failed: {}", e),
            UpdateError::Install(e) => write!(f, "install failed: {}", e),
            UpdateError::Restore(e) => write!(f, "restore failed: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UpdateError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootOutcome {
    /// Jump to the vector table at this address.
    Boot { vector_table: u32 },
    /// Halt; the watchdog resets the device.
    Fatal(FatalReason),
}

/// What one run of the procedure saw and did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootReport {
    pub check: Option<AppCheck>,
    pub step: Option<BootStep>,
    pub step_result: Option<Result<(), UpdateError>>,
    /// Parameter record as left behind by the run.
    pub params: Option<BootloaderParams>,
    pub outcome: BootOutcome,
}

impl BootReport {
    fn new() -> Self {
        Self {
            check: None,
            step: None,
            step_result: None,
            params: None,
            outcome: BootOutcome::Fatal(FatalReason::NoApplication),
        }
    }
}

pub struct Bootloader<'a> {
    internal: &'a mut dyn FlashDevice,
    external: &'a mut dyn FlashDevice,
    regions: RegionMap,
    version: u32,
}

impl<'a> Bootloader<'a> {
    /// Bootloader over the default RP2040 region map.
    pub fn new(internal: &'a mut dyn FlashDevice, external: &'a mut dyn FlashDevice) -> Self {
        Self {
            internal,
            external,
            regions: RegionMap::DEFAULT,
            version: BOOTLOADER_VERSION,
        }
    }

    pub fn with_regions(mut self, regions: RegionMap) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    /// Run the whole procedure up to, but not including, the jump.
    pub fn run(&mut self) -> BootReport {
        let mut report = BootReport::new();
        report.outcome = match self.execute(&mut report) {
            Ok(vector_table) => {
                enter(BootState::Boot);
                BootOutcome::Boot { vector_table }
            }
            Err(reason) => {
                enter(BootState::Fatal);
                error!("boot: fatal: {:?}", reason);
                BootOutcome::Fatal(reason)
            }
        };
        report
    }

    fn execute(&mut self, report: &mut BootReport) -> Result<u32, FatalReason> {
        let mut store = ParamStore::load(
            &mut *self.internal,
            self.regions.params.start_address,
            self.version,
        )
        .map_err(FatalReason::ParamSaveFailed)?;
        report.params = Some(*store.params());

        enter(BootState::Verify);
        let check = self.verify_application()?;
        report.check = Some(check);

        let step = decide(store.params());
        enter(step.into());
        report.step = Some(step);

        let result = match step {
            BootStep::RestoreBackup => {
                let result = self.restore_backup();
                if result.is_ok() {
                    store
                        .set_new_fw_boot_ok(&mut *self.internal, true)
                        .map_err(FatalReason::ParamSaveFailed)?;
                }
                Some(result)
            }
            BootStep::InstallUpdate => {
                let result = self.install_update(&mut store, check)?;
                store
                    .set_new_fw_downloaded(&mut *self.internal, false)
                    .map_err(FatalReason::ParamSaveFailed)?;
                Some(result)
            }
            BootStep::Idle => None,
        };

        if let Some(Err(e)) = result {
            warn!("boot: {:?} failed: {:?}", step, e);
        }
        report.step_result = result;
        report.params = Some(*store.params());

        Ok(self.regions.application.start_address)
    }

    /// Check the application's header and trailing CRC.
    ///
    /// An unstamped image (CRC slot erased) gets its CRC written. A damaged
    /// image is only reported.
    pub fn verify_application(&mut self) -> Result<AppCheck, FatalReason> {
        let app = self.regions.application;
        let mut dev = OpenDevice::open(&mut *self.internal).map_err(FatalReason::InternalFlash)?;

        let mut raw = [0u8; 4];
        dev.read(app.version_address(), &mut raw)
            .map_err(FatalReason::InternalFlash)?;
        let version = u32::from_le_bytes(raw);
        if !has_application(version) {
            error!("verify: no application at 0x{:08x}", app.start_address);
            return Err(FatalReason::NoApplication);
        }

        let (stored, computed) =
            region_crc_pair(&mut *dev, &app).map_err(FatalReason::InternalFlash)?;
        let check = classify_app_crc(stored, computed);

        match check {
            AppCheck::Valid => info!("verify: application 0x{:08x} ok", version),
            AppCheck::FirstProgramming { computed } => {
                info!("verify: first programming, stamping CRC 0x{:04x}", computed);
                if let Err(e) = dev.write(app.crc_address(), &computed.to_le_bytes()) {
                    warn!("verify: CRC stamp failed: {:?}", e);
                }
            }
            AppCheck::Damaged { stored, computed } => warn!(
                "verify: application CRC mismatch (stored 0x{:04x}, computed 0x{:04x})",
                stored,
                computed
            ),
        }
        Ok(check)
    }

    /// Copy the application to the backup region.
    ///
    /// The backup region is left alone unless the application matches its
    /// own CRC.
    pub fn backup_application(&mut self) -> Result<(), UpdateError> {
        let app = self.regions.application;
        let (stored, computed) = {
            let mut dev = OpenDevice::open(&mut *self.internal)
                .map_err(|e| UpdateError::Backup(CopyError::SourceReadFailed(e)))?;
            region_crc_pair(&mut *dev, &app)
                .map_err(|e| UpdateError::Backup(CopyError::SourceReadFailed(e)))?
        };
        if stored != computed {
            warn!(
                "backup: application CRC mismatch (stored 0x{:04x}, computed 0x{:04x}), backup kept",
                stored,
                computed
            );
            return Err(UpdateError::Backup(CopyError::CrcMismatch { stored, computed }));
        }

        info!("backup: application -> external 0x{:08x}", self.regions.backup.start_address);
        copy(
            &mut *self.internal,
            app.start_address,
            &mut *self.external,
            self.regions.backup.start_address,
            app.size,
            CopyDirection::InternalToExternal,
        )
        .map_err(UpdateError::Backup)
    }

    /// Check the download, back up the application, clear `new_fw_boot_ok`
    /// and install.
    ///
    /// Nothing is written when the download is invalid; the install is
    /// skipped when the backup fails. A damaged application is not backed up
    /// so the backup region keeps the last good image.
    fn install_update(
        &mut self,
        store: &mut ParamStore,
        app: AppCheck,
    ) -> Result<Result<(), UpdateError>, FatalReason> {
        if let Err(e) = self.prepare_install(app) {
            return Ok(Err(e));
        }
        // From here on the application region may be left half written
        store
            .set_new_fw_boot_ok(&mut *self.internal, false)
            .map_err(FatalReason::ParamSaveFailed)?;
        Ok(self.install_application())
    }

    fn prepare_install(&mut self, app: AppCheck) -> Result<(), UpdateError> {
        self.check_source(self.regions.download)?;
        match app {
            AppCheck::Damaged { .. } => {
                warn!("install: application damaged, keeping the existing backup");
                Ok(())
            }
            AppCheck::Valid | AppCheck::FirstProgramming { .. } => self.backup_application(),
        }
    }

    /// Copy the downloaded image over the application.
    pub fn install_application(&mut self) -> Result<(), UpdateError> {
        let app = self.regions.application;
        info!("install: external 0x{:08x} -> application", self.regions.download.start_address);
        copy(
            &mut *self.external,
            self.regions.download.start_address,
            &mut *self.internal,
            app.start_address,
            app.size,
            CopyDirection::ExternalToInternal,
        )
        .map_err(UpdateError::Install)
    }

    /// Copy the backup image over the application.
    pub fn restore_backup(&mut self) -> Result<(), UpdateError> {
        self.check_source(self.regions.backup)?;

        let app = self.regions.application;
        info!("restore: external 0x{:08x} -> application", self.regions.backup.start_address);
        copy(
            &mut *self.external,
            self.regions.backup.start_address,
            &mut *self.internal,
            app.start_address,
            app.size,
            CopyDirection::ExternalToInternal,
        )
        .map_err(UpdateError::Restore)
    }

    /// Check an external image of application size at `region`'s start.
    fn check_source(&mut self, region: FlashRegion) -> Result<(), UpdateError> {
        let image = FlashRegion::new(region.name, region.start_address, self.regions.application.size);
        let mut dev = OpenDevice::open(&mut *self.external).map_err(UpdateError::Source)?;
        let (stored, computed) = region_crc_pair(&mut *dev, &image).map_err(UpdateError::Source)?;
        if stored != computed {
            warn!(
                "{}: image invalid (stored 0x{:04x}, computed 0x{:04x})",
                region.name,
                stored,
                computed
            );
            return Err(UpdateError::SourceInvalid { stored, computed });
        }
        Ok(())
    }
}

fn enter(state: BootState) {
    debug!("boot: -> {:?}", state);
}
