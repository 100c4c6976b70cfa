// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the endpoint agent.
//!
//! Only [`ProtocolError::ResponseTimeout`] during startup is fatal to the
//! agent. Everything else is logged by the component that observes it and
//! the agent keeps running.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during broker communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing an inbound message or device line.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while talking to the sensor/actuator device.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Error occurred while loading the configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A color selector outside `r`, `g`, `b`.
    #[error("unrecognized color: {0}")]
    UnrecognizedColor(String),

    /// A command action name that is not supported.
    #[error("unknown command action: {0}")]
    UnknownAction(String),

    /// A topic filter that violates MQTT wildcard rules.
    #[error("invalid topic filter: {0}")]
    InvalidTopicFilter(String),
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The MQTT client rejected a request.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker connection is currently down.
    #[error("not connected to broker")]
    NotConnected,

    /// No response arrived for a correlated request.
    #[error("no response for request {id} within {timeout_ms} ms")]
    ResponseTimeout {
        /// Identifier of the request that timed out.
        id: u64,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors related to parsing inbound payloads and device lines.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A message on a correlation topic did not have the expected shape.
    #[error("malformed response on topic {topic}")]
    MalformedResponse {
        /// The topic the message arrived on.
        topic: String,
    },

    /// A command payload that is not a batch of command objects.
    #[error("malformed command batch: {0}")]
    MalformedCommandBatch(String),

    /// A device line that is not `key:value` with a numeric value.
    #[error("malformed telemetry line: {0:?}")]
    MalformedTelemetryLine(String),
}

/// Errors related to the sensor/actuator device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// I/O on the device failed.
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The device stream reached end of file.
    #[error("device stream closed")]
    Closed,
}

/// Errors related to loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`AgentConfig`](crate::config::AgentConfig).
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
