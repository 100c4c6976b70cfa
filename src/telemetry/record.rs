// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample accumulation for one telemetry cycle.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::ParseError;

/// Field added to every published record.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Samples collected since the last flush.
///
/// # Examples
///
/// ```
/// use kaa_endpoint::telemetry::TelemetryRecord;
///
/// let mut record = TelemetryRecord::new();
/// record.ingest("temp:21.5").unwrap();
/// record.ingest("temp:22").unwrap();
/// assert_eq!(record.get("temp"), Some(22.0));
/// assert!(record.ingest("garbage").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    samples: BTreeMap<String, f64>,
}

impl TelemetryRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `key:value` line and stores the sample, overwriting any
    /// earlier value for the key.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedTelemetryLine` if the line has no `:`,
    /// an empty key, or a value that is not a finite number.
    pub fn ingest(&mut self, line: &str) -> Result<(), ParseError> {
        let (key, value) = parse_sample(line)?;
        self.samples.insert(key.to_string(), value);
        Ok(())
    }

    /// Returns the value of a sample.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.samples.get(key).copied()
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no sample has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Serializes the samples together with a `timestamp` in milliseconds.
    ///
    /// A sample named `timestamp` is replaced by the flush time.
    #[must_use]
    pub fn to_payload(&self, timestamp_ms: i64) -> String {
        let mut object: Map<String, Value> = self
            .samples
            .iter()
            .filter_map(|(k, v)| Number::from_f64(*v).map(|n| (k.clone(), Value::Number(n))))
            .collect();
        object.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp_ms));
        Value::Object(object).to_string()
    }
}

fn parse_sample(line: &str) -> Result<(&str, f64), ParseError> {
    let malformed = || ParseError::MalformedTelemetryLine(line.to_string());

    let (key, value) = line.split_once(':').ok_or_else(malformed)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(malformed());
    }
    let value: f64 = value.trim().parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(malformed());
    }
    Ok((key, value))
}
