// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command execution against the shared device state.

use std::sync::Arc;

use serde_json::Value;

use crate::device::Device;
use crate::error::{DeviceError, ParseError, ValueError};
use crate::protocol::Publication;
use crate::state::{DeviceState, SharedDeviceState};
use crate::topic::KaaTopics;
use crate::types::Color;

use super::{AckPolicy, Action, Command, CommandResult};

/// Applies command batches to the device state and acknowledges them.
///
/// Batches are handled in the delivery task; [`adjust`](Self::adjust) runs in
/// the steady loop. Both sides only touch the state under its mutex.
#[derive(Debug)]
pub struct CommandDispatcher {
    state: SharedDeviceState,
    topics: KaaTopics,
    policy: AckPolicy,
}

impl CommandDispatcher {
    /// Creates a dispatcher with the lenient acknowledgment policy.
    #[must_use]
    pub fn new(state: SharedDeviceState, topics: KaaTopics) -> Self {
        Self {
            state,
            topics,
            policy: AckPolicy::default(),
        }
    }

    /// Sets the acknowledgment policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns a snapshot of the device state.
    #[must_use]
    pub fn snapshot(&self) -> DeviceState {
        self.state.lock().clone()
    }

    /// Applies a batch in order and returns one result per command.
    pub fn apply(&self, action: Action, batch: &[Command]) -> Vec<CommandResult> {
        let mut state = self.state.lock();
        batch
            .iter()
            .map(|command| self.apply_one(&mut state, action, command))
            .collect()
    }

    fn apply_one(&self, state: &mut DeviceState, action: Action, command: &Command) -> CommandResult {
        match action {
            Action::TurnOff => {
                state.turn_off();
                CommandResult::success(command.id.clone())
            }
            Action::TurnOn => match requested_color(&command.payload) {
                Ok(color) => {
                    if color.is_none() {
                        tracing::warn!(id = %command.id, "No color requested, keeping current color");
                    }
                    state.turn_on(color);
                    CommandResult::success(command.id.clone())
                }
                Err(e) => {
                    tracing::warn!(id = %command.id, error = %e, "Unrecognized command parameter");
                    match self.policy {
                        AckPolicy::Lenient => {
                            state.turn_on(None);
                            CommandResult::success(command.id.clone())
                        }
                        AckPolicy::Strict => CommandResult::bad_request(command.id.clone(), e.to_string()),
                    }
                }
            },
        }
    }

    /// Parses an inbound batch, applies it, and builds the acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedCommandBatch` if the payload is not a
    /// JSON array of command objects; the state is left untouched.
    pub fn handle(&self, action: Action, payload: &str) -> Result<Publication, ParseError> {
        let batch: Vec<Command> = serde_json::from_str(payload)
            .map_err(|e| ParseError::MalformedCommandBatch(e.to_string()))?;

        tracing::info!(action = %action, commands = batch.len(), "Received command batch");
        let results = self.apply(action, &batch);
        let body = serde_json::to_string(&results)?;

        Ok(Publication::new(self.topics.command_result(action.as_str()), body))
    }

    /// Returns a router handler executing `action` batches.
    pub fn handler(
        self: &Arc<Self>,
        action: Action,
    ) -> impl Fn(&str, &str) -> Option<Publication> + Send + Sync + 'static {
        let dispatcher = Arc::clone(self);
        move |topic, payload| match dispatcher.handle(action, payload) {
            Ok(publication) => Some(publication),
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Dropping command batch");
                None
            }
        }
    }

    /// Writes the current state to the actuator if it changed since the last
    /// write.
    ///
    /// Returns `true` if a write happened.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the write fails. The change is still
    /// considered consumed.
    pub async fn adjust<D: Device>(&self, device: &mut D) -> Result<bool, DeviceError> {
        let code = self.state.lock().take_pending_code();
        let Some(code) = code else {
            return Ok(false);
        };

        tracing::debug!(code = %char::from(code), "Adjusting light");
        device.write(code).await?;
        Ok(true)
    }
}

/// Extracts the optional `color` parameter of a `turnon` command.
fn requested_color(payload: &Value) -> Result<Option<Color>, ValueError> {
    match payload.get("color") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(other) => Err(ValueError::UnrecognizedColor(other.to_string())),
    }
}
