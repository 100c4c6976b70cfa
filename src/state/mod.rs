// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state shared between the delivery loop and the steady loop.
//!
//! Commands mutate the state from the delivery task; the steady loop reads it
//! when it adjusts the actuator. Both go through [`SharedDeviceState`].

mod device_state;

pub use device_state::DeviceState;

use std::sync::Arc;

use parking_lot::Mutex;

/// Device state behind a mutex, shared by both execution contexts.
pub type SharedDeviceState = Arc<Mutex<DeviceState>>;
