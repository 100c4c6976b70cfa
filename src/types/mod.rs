// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for device control.
//!
//! - [`Color`] - color selector of the light (`r`, `g`, `b`)
//! - [`LightState`] - `Off` or `On(color)`

mod color;
mod light;

pub use color::Color;
pub use light::{LightState, OFF_CODE};
