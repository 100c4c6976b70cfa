// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.

use crate::types::{Color, LightState};

/// In-memory state of the light.
///
/// The color is remembered while the light is off, so `turnon` without a
/// usable color brings back the previous one.
///
/// `pending_change` is set by every transition and cleared by
/// [`take_pending_code`](Self::take_pending_code), once per actuation.
///
/// # Examples
///
/// ```
/// use kaa_endpoint::state::DeviceState;
/// use kaa_endpoint::types::{Color, LightState};
///
/// let mut state = DeviceState::new();
/// assert_eq!(state.light(), LightState::Off);
///
/// state.turn_on(Some(Color::Green));
/// assert_eq!(state.take_pending_code(), Some(b'g'));
/// assert_eq!(state.take_pending_code(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    powered: bool,
    color: Color,
    pending_change: bool,
}

impl DeviceState {
    /// Creates the initial state: off, red selected, nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the light is powered.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Returns the selected color, also while off.
    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Returns `true` if the actuator has not been updated since the last change.
    #[must_use]
    pub fn has_pending_change(&self) -> bool {
        self.pending_change
    }

    /// Returns what the light shows.
    #[must_use]
    pub fn light(&self) -> LightState {
        if self.powered {
            LightState::On(self.color)
        } else {
            LightState::Off
        }
    }

    /// Powers the light on, switching color when one is given.
    pub fn turn_on(&mut self, color: Option<Color>) {
        if let Some(color) = color {
            self.color = color;
        }
        self.powered = true;
        self.pending_change = true;
    }

    /// Powers the light off.
    pub fn turn_off(&mut self) {
        self.powered = false;
        self.pending_change = true;
    }

    /// Clears the pending flag and returns the code to write, if any.
    pub fn take_pending_code(&mut self) -> Option<u8> {
        if !self.pending_change {
            return None;
        }
        self.pending_change = false;
        Some(self.light().code())
    }
}
