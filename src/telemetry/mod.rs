// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telemetry collection from device lines and publishing to the data
//! collection extension.
//!
//! The device writes one `key:value` line per sample and an empty line at the
//! end of each cycle:
//!
//! ```text
//! temp:21.5
//! humidity:40
//!
//! ```
//!
//! which is published on `kp1/<app>/dcx/<token>/json/<schema>` as
//!
//! ```json
//! {"humidity":40.0,"temp":21.5,"timestamp":1700000000000}
//! ```
//!
//! Publishing is fire-and-forget. A failed publish triggers a single
//! reconnect attempt; [`FailurePolicy`] decides whether the samples of the
//! failed cycle are replayed with the next one.

mod record;

pub use record::{TIMESTAMP_FIELD, TelemetryRecord};

use std::sync::Arc;

use serde::Deserialize;

use crate::protocol::Transport;

/// What happens to the samples of a cycle whose publish failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the samples; the next cycle overwrites them key by key and
    /// publishes the rest again with a fresh timestamp.
    #[default]
    Retain,
    /// Drop the samples.
    Discard,
}

/// Result of flushing one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The record was handed to the transport.
    Published,
    /// Publishing failed and the samples are kept for the next cycle.
    Retained,
    /// Publishing failed and the samples were dropped.
    Discarded,
}

/// Accumulates device lines into records and publishes them.
#[derive(Debug)]
pub struct TelemetryPublisher<T> {
    transport: Arc<T>,
    topic: String,
    policy: FailurePolicy,
    record: TelemetryRecord,
}

impl<T: Transport> TelemetryPublisher<T> {
    /// Creates a publisher for a telemetry topic.
    #[must_use]
    pub fn new(transport: Arc<T>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
            policy: FailurePolicy::default(),
            record: TelemetryRecord::new(),
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the samples collected so far.
    #[must_use]
    pub fn record(&self) -> &TelemetryRecord {
        &self.record
    }

    /// Feeds one device line.
    ///
    /// Returns the flush outcome when the line was a cycle boundary.
    pub async fn handle_line(&mut self, line: &str) -> Option<FlushOutcome> {
        let line = line.trim();
        if line.is_empty() {
            return Some(self.flush().await);
        }
        if let Err(e) = self.record.ingest(line) {
            tracing::debug!(error = %e, "Skipping device line");
        }
        None
    }

    /// Publishes the current record with a timestamp.
    pub async fn flush(&mut self) -> FlushOutcome {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = self.record.to_payload(timestamp);

        match self.transport.publish(&self.topic, payload.clone()).await {
            Ok(()) => {
                tracing::info!(topic = %self.topic, payload = %payload, "Sent telemetry");
                self.record = TelemetryRecord::new();
                FlushOutcome::Published
            }
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    error = %e,
                    "Server connection lost, attempting to reconnect"
                );
                if let Err(e) = self.transport.reconnect().await {
                    tracing::warn!(error = %e, "Reconnect attempt failed");
                }
                match self.policy {
                    FailurePolicy::Retain => FlushOutcome::Retained,
                    FailurePolicy::Discard => {
                        self.record = TelemetryRecord::new();
                        FlushOutcome::Discarded
                    }
                }
            }
        }
    }
}
