// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC16 used for firmware images, the parameter record and copy verification.
//!
//! Every call site in the workspace goes through [`crc16`], so images stamped
//! by the host tool, records written by the bootloader and copies verified
//! after a transfer all agree on the algorithm (CRC-16/XMODEM).

use crc::{Crc, CRC_16_XMODEM};

pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Seed for the first chunk of a stream.
pub const CRC16_INIT: u16 = 0x0000;

/// Value read back from a trailing CRC slot that was never programmed.
pub const CRC16_ERASED: u16 = 0xFFFF;

/// Compute the CRC16 of `data`, continuing from `running`.
///
/// Pass [`CRC16_INIT`] for the first chunk and the previous result for every
/// following chunk; the final value equals the CRC of the concatenated input.
pub fn crc16(data: &[u8], running: u16) -> u16 {
    let mut digest = CRC16.digest_with_initial(running);
    digest.update(data);
    digest.finalize()
}

/// CRC16 of an in-memory image, excluding its trailing two CRC bytes.
pub fn image_crc(image: &[u8]) -> Option<u16> {
    let payload = image.len().checked_sub(2)?;
    Some(crc16(&image[..payload], CRC16_INIT))
}
