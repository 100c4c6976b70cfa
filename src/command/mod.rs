// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command batches delivered by the Kaa command execution extension.
//!
//! A batch arrives on `.../command/<name>/status` as a JSON array:
//!
//! ```json
//! [{"id": 1, "payload": {"color": "g"}}]
//! ```
//!
//! and is acknowledged on `.../result/<name>` with one result per command, in
//! the same order:
//!
//! ```json
//! [{"id": 1, "statusCode": 200, "reasonPhrase": "OK", "payload": "Success"}]
//! ```
//!
//! # Available Actions
//!
//! | Action | Payload | Effect |
//! |--------|---------|--------|
//! | [`Action::TurnOn`] | `{"color": "r" \| "g" \| "b"}` | light on, optionally switching color |
//! | [`Action::TurnOff`] | ignored | light off |

mod dispatcher;

pub use dispatcher::CommandDispatcher;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValueError;

/// The fixed set of commands the endpoint executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// `turnon`
    TurnOn,
    /// `turnoff`
    TurnOff,
}

impl Action {
    /// Every supported action.
    pub const ALL: [Self; 2] = [Self::TurnOn, Self::TurnOff];

    /// Returns the command name used in topics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TurnOn => "turnon",
            Self::TurnOff => "turnoff",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turnon" => Ok(Self::TurnOn),
            "turnoff" => Ok(Self::TurnOff),
            other => Err(ValueError::UnknownAction(other.to_string())),
        }
    }
}

/// Identifier supplied by the platform; mirrored verbatim in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub Value);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of an inbound command batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    /// Platform-supplied identifier.
    pub id: CommandId,
    /// Command name, when the platform repeats it in the body.
    #[serde(default)]
    pub name: Option<String>,
    /// Command parameters.
    #[serde(default)]
    pub payload: Value,
}

/// One entry of an outbound result batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Mirrors [`Command::id`].
    pub id: CommandId,
    /// HTTP-style status code.
    pub status_code: u16,
    /// Reason phrase for the status code.
    pub reason_phrase: String,
    /// Result payload.
    pub payload: Value,
}

impl CommandResult {
    /// A successful result.
    #[must_use]
    pub fn success(id: CommandId) -> Self {
        Self {
            id,
            status_code: 200,
            reason_phrase: "OK".to_string(),
            payload: Value::String("Success".to_string()),
        }
    }

    /// A result for a command that was rejected because of a bad parameter.
    #[must_use]
    pub fn bad_request(id: CommandId, reason: impl Into<String>) -> Self {
        Self {
            id,
            status_code: 400,
            reason_phrase: "Bad Request".to_string(),
            payload: Value::String(reason.into()),
        }
    }
}

/// How commands with unrecognized parameters are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckPolicy {
    /// Ignore the bad parameter, apply the rest, report success.
    #[default]
    Lenient,
    /// Do not apply the command and report `400 Bad Request`.
    Strict,
}
