// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint metadata extension client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{PendingRequests, RequestCorrelator, Transport};
use crate::topic::KaaTopics;

/// Reads and reports endpoint metadata.
#[derive(Debug)]
pub struct MetadataClient<T> {
    transport: Arc<T>,
    correlator: RequestCorrelator<T>,
    update_topic: String,
}

impl<T: Transport> MetadataClient<T> {
    /// Creates a client for the endpoint described by `topics`.
    #[must_use]
    pub fn new(transport: Arc<T>, topics: &KaaTopics) -> Self {
        Self {
            correlator: RequestCorrelator::new(Arc::clone(&transport), topics.metadata_get_base()),
            transport,
            update_topic: topics.metadata_update(),
        }
    }

    /// Sets how long [`get`](Self::get) waits for the platform.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.correlator = self.correlator.with_timeout(timeout);
        self
    }

    /// Pending table to fulfil from the response handler.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingRequests> {
        self.correlator.pending()
    }

    /// Filter covering every metadata response.
    #[must_use]
    pub fn response_filter(&self) -> String {
        self.correlator.response_filter()
    }

    /// Fetches the endpoint metadata.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ResponseTimeout` if the platform does not
    /// answer in time.
    pub async fn get(&self) -> Result<String, ProtocolError> {
        let metadata = self.correlator.request("{}".to_string()).await?;
        tracing::info!(metadata = %metadata, "Received endpoint metadata");
        Ok(metadata)
    }

    /// Reports metadata keys without waiting for confirmation.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the update cannot be published.
    pub async fn patch_unconfirmed(&self, metadata: &Value) -> Result<(), ProtocolError> {
        self.transport
            .publish(&self.update_topic, metadata.to_string())
            .await?;
        tracing::info!(topic = %self.update_topic, "Reported endpoint metadata");
        Ok(())
    }
}
