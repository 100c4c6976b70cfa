// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kaa topic naming and MQTT topic filter matching.
//!
//! Every topic the agent publishes or subscribes to is built by
//! [`KaaTopics`]. The layout must match the broker-side contract exactly:
//!
//! ```text
//! kp1/<app_version>/epmx/<token>/get/<id>            metadata request
//! kp1/<app_version>/epmx/<token>/get/<id>/status     metadata response
//! kp1/<app_version>/epmx/<token>/update/keys         metadata partial update
//! kp1/<app_version>/dcx/<token>/json/<schema>        telemetry
//! kp1/<app_version>/cex/<token>/command/<name>/status  command intake
//! kp1/<app_version>/cex/<token>/result/<name>        command result
//! ```
//!
//! # Examples
//!
//! ```
//! use kaa_endpoint::topic::{KaaTopics, TopicFilter, request_topic, subtree_filter};
//!
//! let topics = KaaTopics::new("app-v1", "token1");
//! let base = topics.metadata_get_base();
//! assert_eq!(request_topic(&base, 7), "kp1/app-v1/epmx/token1/get/7");
//!
//! let filter = TopicFilter::new(subtree_filter(&base)).unwrap();
//! assert!(filter.matches("kp1/app-v1/epmx/token1/get/7/status"));
//! ```

use std::fmt;

use crate::error::ValueError;

/// Protocol prefix of every Kaa topic.
const PROTOCOL_PREFIX: &str = "kp1";

/// Default data collection schema version.
pub const DEFAULT_SCHEMA_VERSION: &str = "15";

/// Builder for the topics of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KaaTopics {
    /// `kp1/<app_version>`.
    prefix: String,
    /// Endpoint token.
    token: String,
}

impl KaaTopics {
    /// Creates the topic set for an endpoint of an application version.
    #[must_use]
    pub fn new(app_version: impl AsRef<str>, token: impl Into<String>) -> Self {
        Self {
            prefix: format!("{PROTOCOL_PREFIX}/{}", app_version.as_ref()),
            token: token.into(),
        }
    }

    /// Base of metadata requests; a request id is appended as the last level.
    #[must_use]
    pub fn metadata_get_base(&self) -> String {
        format!("{}/epmx/{}/get", self.prefix, self.token)
    }

    /// Topic for unconfirmed partial metadata updates.
    #[must_use]
    pub fn metadata_update(&self) -> String {
        format!("{}/epmx/{}/update/keys", self.prefix, self.token)
    }

    /// Telemetry topic for a data collection schema version.
    #[must_use]
    pub fn data_collection(&self, schema_version: &str) -> String {
        format!("{}/dcx/{}/json/{schema_version}", self.prefix, self.token)
    }

    /// Intake topic for a command name.
    #[must_use]
    pub fn command(&self, name: &str) -> String {
        format!("{}/cex/{}/command/{name}/status", self.prefix, self.token)
    }

    /// Acknowledgment topic for a command name.
    #[must_use]
    pub fn command_result(&self, name: &str) -> String {
        format!("{}/cex/{}/result/{name}", self.prefix, self.token)
    }
}

/// Topic of request `id` under a correlation base such as
/// [`KaaTopics::metadata_get_base`].
#[must_use]
pub fn request_topic(base: &str, id: u64) -> String {
    format!("{base}/{id}")
}

/// Filter covering every topic below `base`.
#[must_use]
pub fn subtree_filter(base: &str) -> String {
    format!("{base}/#")
}

/// A validated MQTT subscription filter.
///
/// `+` matches exactly one level, `#` matches the remaining levels
/// (including none) and must be the last level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    /// Validates and wraps a filter string.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidTopicFilter` if the filter is empty or a
    /// wildcard does not occupy a whole level, or `#` is not last.
    pub fn new(filter: impl Into<String>) -> Result<Self, ValueError> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(ValueError::InvalidTopicFilter(filter));
        }

        let levels: Vec<&str> = filter.split('/').collect();
        let last = levels.len() - 1;
        for (i, level) in levels.iter().enumerate() {
            let bad_multi = level.contains('#') && (*level != "#" || i != last);
            let bad_single = level.contains('+') && *level != "+";
            if bad_multi || bad_single {
                return Err(ValueError::InvalidTopicFilter(filter));
            }
        }

        Ok(Self(filter))
    }

    /// Returns the filter string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `topic` would be delivered to this filter.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        // Wildcards at the first level never match system topics.
        if topic.starts_with('$') && self.0.starts_with(['+', '#']) {
            return false;
        }

        let mut filter = self.0.split('/');
        let mut levels = topic.split('/');
        loop {
            match (filter.next(), levels.next()) {
                (Some("#"), _) | (None, None) => return true,
                (Some("+"), Some(_)) => {}
                (Some(f), Some(l)) if f == l => {}
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
