// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Agent configuration loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [broker]
//! host = "mqtt.cloud.kaaiot.com"
//! port = 1883
//!
//! [endpoint]
//! app_version = "cpd0dbic8hds7384b2n0-v1"
//! token = "token1"
//!
//! [device]
//! path = "/dev/ttyACM0"
//!
//! [telemetry]
//! on_failure = "retain"
//!
//! [commands]
//! ack_policy = "lenient"
//!
//! [metadata]
//! model = "rgb-lamp"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::command::AckPolicy;
use crate::error::ConfigError;
use crate::protocol::BrokerSettings;
use crate::telemetry::FailurePolicy;
use crate::topic::{DEFAULT_SCHEMA_VERSION, KaaTopics};

/// Complete agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// `[broker]`
    pub broker: BrokerSettings,
    /// `[endpoint]`
    pub endpoint: EndpointSettings,
    /// `[device]`
    pub device: DeviceSettings,
    /// `[telemetry]`
    pub telemetry: TelemetrySettings,
    /// `[commands]`
    pub commands: CommandSettings,
    /// Metadata keys reported once after startup.
    pub metadata: Option<Map<String, Value>>,
}

impl AgentConfig {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Toml` if it is not a valid configuration.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = content.parse::<Self>()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Topics of the configured endpoint.
    #[must_use]
    pub fn topics(&self) -> KaaTopics {
        KaaTopics::new(&self.endpoint.app_version, &self.endpoint.token)
    }
}

impl FromStr for AgentConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// Identity of the endpoint on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Application version name, the second topic level.
    pub app_version: String,
    /// Endpoint token.
    pub token: String,
    /// Data collection schema version.
    pub schema_version: String,
    /// How long correlated requests wait, in milliseconds.
    pub response_timeout_ms: u64,
}

impl EndpointSettings {
    /// Response timeout as a duration.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            app_version: "cpd0dbic8hds7384b2n0-v1".to_string(),
            token: "token1".to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            response_timeout_ms: 5000,
        }
    }
}

/// Where the sensor/actuator is attached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Serial device or file path.
    pub path: PathBuf,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/ttyACM0"),
        }
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// What to do with samples whose publish failed.
    pub on_failure: FailurePolicy,
}

/// `[commands]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// How commands with bad parameters are acknowledged.
    pub ack_policy: AckPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AgentConfig = "".parse().unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.broker.host, "mqtt.cloud.kaaiot.com");
        assert_eq!(config.endpoint.token, "token1");
        assert_eq!(config.endpoint.response_timeout(), Duration::from_secs(5));
        assert_eq!(config.telemetry.on_failure, FailurePolicy::Retain);
        assert_eq!(config.commands.ack_policy, AckPolicy::Lenient);
        assert!(config.metadata.is_none());
    }

    #[test]
    fn full_file_overrides_defaults() {
        let config: AgentConfig = r#"
            [broker]
            host = "localhost"
            port = 1884
            username = "lamp"
            password = "secret"

            [endpoint]
            app_version = "app-v2"
            token = "lamp-7"
            response_timeout_ms = 1500

            [device]
            path = "/dev/ttyUSB0"

            [telemetry]
            on_failure = "discard"

            [commands]
            ack_policy = "strict"

            [metadata]
            model = "rgb-lamp"
            revision = 3
        "#
        .parse()
        .unwrap();

        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(config.broker.username.as_deref(), Some("lamp"));
        assert_eq!(config.endpoint.schema_version, "15");
        assert_eq!(config.device.path, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.telemetry.on_failure, FailurePolicy::Discard);
        assert_eq!(config.commands.ack_policy, AckPolicy::Strict);
        assert_eq!(
            Value::Object(config.metadata.clone().unwrap()),
            json!({"model": "rgb-lamp", "revision": 3})
        );
        assert_eq!(
            config.topics().data_collection(&config.endpoint.schema_version),
            "kp1/app-v2/dcx/lamp-7/json/15"
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = "[telemetry]\non_failure = \"sometimes\"".parse::<AgentConfig>();
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = AgentConfig::load("/nonexistent/kaa-endpoint.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("kaa-endpoint.toml")));
    }
}
