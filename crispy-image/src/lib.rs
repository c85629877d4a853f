// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image stamping and inspection shared by the `crispy-image` binary and its tests.

pub mod image;

pub use image::{inspect, stamp, verify, ImageInfo, StampOptions};
