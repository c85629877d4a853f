// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Watchdog service hook and busy-wait polling.
//!
//! Flash controllers signal completion through a status flag. Drivers spin on
//! that flag through [`wait_ready`], which services the watchdog every
//! `service_interval` polls and optionally gives up after `max_polls`.

use crate::error::FlashError;

/// Hook called during long flash operations to keep the hardware watchdog fed.
pub trait Watchdog {
    fn periodic(&self);
}

impl<W: Watchdog + ?Sized> Watchdog for &W {
    fn periodic(&self) {
        (**self).periodic()
    }
}

/// Watchdog for targets without one (host tools, tests).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn periodic(&self) {}
}

/// How a driver spins on a busy flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Service the watchdog every this many polls (0 = every poll).
    pub service_interval: u32,
    /// Give up with [`FlashError::Timeout`] after this many polls.
    pub max_polls: Option<u32>,
}

impl PollPolicy {
    /// Spin until ready. Used on target, where the watchdog is the timeout.
    pub const fn unbounded() -> Self {
        Self {
            service_interval: 64,
            max_polls: None,
        }
    }

    pub const fn bounded(max_polls: u32) -> Self {
        Self {
            service_interval: 64,
            max_polls: Some(max_polls),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Spin until `ready` reports true.
pub fn wait_ready<W, F>(watchdog: &W, policy: &PollPolicy, mut ready: F) -> Result<(), FlashError>
where
    W: Watchdog + ?Sized,
    F: FnMut() -> Result<bool, FlashError>,
{
    let mut polls: u32 = 0;
    loop {
        if ready()? {
            return Ok(());
        }

        polls = polls.wrapping_add(1);
        if let Some(max) = policy.max_polls {
            if polls >= max {
                return Err(FlashError::Timeout);
            }
        }
        if policy.service_interval == 0 || polls % policy.service_interval == 0 {
            watchdog.periodic();
        }
        core::hint::spin_loop();
    }
}
