// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sensor/actuator device the agent bridges.
//!
//! The device speaks a line protocol: it emits `key:value` sample lines and
//! an empty line at the end of each sample cycle, and accepts single-byte
//! actuator codes.

mod line_device;

pub use line_device::LineDevice;

use crate::error::DeviceError;

/// A line-oriented sensor with a single-byte actuator.
#[allow(async_fn_in_trait)]
pub trait Device {
    /// Reads one line without its terminator. An empty string is a cycle
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Closed` at end of stream, or the I/O error.
    async fn read_line(&mut self) -> Result<String, DeviceError>;

    /// Writes one actuator code.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Io` if the write fails.
    async fn write(&mut self, code: u8) -> Result<(), DeviceError>;
}
