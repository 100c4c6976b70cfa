// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Observable state of the light.

use std::fmt;

use super::Color;

/// Actuator code that switches the light off.
pub const OFF_CODE: u8 = b'f';

/// What the light shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    /// Light is off.
    Off,
    /// Light is on with a color.
    On(Color),
}

impl LightState {
    /// Returns the byte written to the actuator for this state.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Off => OFF_CODE,
            Self::On(color) => color.code(),
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::On(color) => write!(f, "on({color})"),
        }
    }
}
