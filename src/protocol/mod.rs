// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request/response and routing layered on top of MQTT publish/subscribe.
//!
//! # Components
//!
//! - [`TopicRouter`]: dispatches inbound messages to handlers by topic filter
//! - [`RequestCorrelator`]: matches asynchronous responses to requests via
//!   identifiers embedded in the topic
//! - [`KaaBroker`]: the rumqttc connection and its background delivery loop
//!
//! Components publish through the [`Transport`] trait so they can be driven
//! without a broker.

mod broker;
mod correlator;
mod router;

pub use broker::{BrokerSettings, KaaBroker, KaaBrokerBuilder};
pub use correlator::{DEFAULT_RESPONSE_TIMEOUT, PendingRequests, RequestCorrelator};
pub use router::{Handler, TopicRouter};

use crate::error::ProtocolError;

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Topic to publish on.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
}

impl Publication {
    /// Creates a new publication.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A publish/subscribe connection.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the message could not be handed to the
    /// connection. This is the transport publish failure of the agent.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError>;

    /// Subscribes to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the subscription request fails.
    async fn subscribe(&self, filter: &str) -> Result<(), ProtocolError>;

    /// Waits for the connection to come back after a failure.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ConnectionFailed` if it does not recover in time.
    async fn reconnect(&self) -> Result<(), ProtocolError>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the disconnect request fails.
    async fn disconnect(&self) -> Result<(), ProtocolError>;
}
