// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint lifecycle.
//!
//! [`Agent::run`] performs, in order:
//!
//! 1. handler registration and subscriptions for metadata responses and
//!    every command
//! 2. the initial metadata fetch, which must succeed
//! 3. the optional metadata report
//! 4. the steady loop: write a pending light change, read one device line,
//!    feed it to telemetry, until shutdown or a device error
//! 5. disconnect, whatever the outcome of the previous steps

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::command::{Action, CommandDispatcher};
use crate::config::AgentConfig;
use crate::device::{Device, LineDevice};
use crate::error::Result;
use crate::metadata::MetadataClient;
use crate::protocol::{KaaBroker, TopicRouter, Transport};
use crate::shutdown::Shutdown;
use crate::state::DeviceState;
use crate::telemetry::TelemetryPublisher;
use crate::topic::KaaTopics;

/// Bridges one device to the platform.
#[derive(Debug)]
pub struct Agent<T, D> {
    transport: Arc<T>,
    router: Arc<TopicRouter>,
    topics: KaaTopics,
    metadata: MetadataClient<T>,
    dispatcher: Arc<CommandDispatcher>,
    telemetry: TelemetryPublisher<T>,
    device: D,
    report: Option<Value>,
}

impl<T: Transport, D: Device> Agent<T, D> {
    /// Creates an agent.
    ///
    /// `router` must be the router `transport` delivers inbound messages to.
    #[must_use]
    pub fn new(transport: Arc<T>, router: Arc<TopicRouter>, device: D, config: &AgentConfig) -> Self {
        let topics = config.topics();
        let state = Arc::new(Mutex::new(DeviceState::new()));
        let dispatcher = CommandDispatcher::new(state, topics.clone())
            .with_policy(config.commands.ack_policy);
        let metadata = MetadataClient::new(Arc::clone(&transport), &topics)
            .with_timeout(config.endpoint.response_timeout());
        let telemetry = TelemetryPublisher::new(
            Arc::clone(&transport),
            topics.data_collection(&config.endpoint.schema_version),
        )
        .with_policy(config.telemetry.on_failure);

        Self {
            transport,
            router,
            topics,
            metadata,
            dispatcher: Arc::new(dispatcher),
            telemetry,
            device,
            report: config.metadata.clone().map(Value::Object),
        }
    }

    /// Returns the command dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Returns the device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Runs the agent until shutdown is requested or the device fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the handlers cannot be installed, the initial
    /// metadata fetch times out, or the device cannot be read or written.
    /// The transport is disconnected in every case.
    pub async fn run(&mut self, shutdown: &Shutdown) -> Result<()> {
        let result = self.serve(shutdown).await;
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(error = %e, "Failed to disconnect from broker");
        }
        result
    }

    async fn serve(&mut self, shutdown: &Shutdown) -> Result<()> {
        self.install_handlers().await?;

        self.metadata.get().await?;
        if let Some(report) = &self.report
            && let Err(e) = self.metadata.patch_unconfirmed(report).await
        {
            tracing::warn!(error = %e, "Failed to report endpoint metadata");
        }

        while !shutdown.is_requested() {
            self.dispatcher.adjust(&mut self.device).await?;

            let line = tokio::select! {
                line = self.device.read_line() => line?,
                () = shutdown.requested() => break,
            };
            self.telemetry.handle_line(&line).await;
        }

        tracing::info!("Agent stopped");
        Ok(())
    }

    async fn install_handlers(&self) -> Result<()> {
        let pending = self.metadata.pending();
        let metadata_filter = self.metadata.response_filter();
        self.router.register(&metadata_filter, move |topic, payload| {
            pending.handle_response(topic, payload);
            None
        })?;
        self.transport.subscribe(&metadata_filter).await?;

        for action in Action::ALL {
            let filter = self.topics.command(action.as_str());
            self.router.register(&filter, self.dispatcher.handler(action))?;
            self.transport.subscribe(&filter).await?;
        }

        tracing::debug!(routes = self.router.route_count(), "Installed handlers");
        Ok(())
    }
}

/// Runs the endpoint described by `config` until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the device cannot be opened, the broker is
/// unreachable, or the agent stops on an error.
pub async fn run(config: AgentConfig) -> Result<()> {
    let shutdown = Shutdown::install();

    let device = LineDevice::open(&config.device.path).await?;
    let router = Arc::new(TopicRouter::new());
    let broker = KaaBroker::builder()
        .settings(config.broker.clone())
        .build(Arc::clone(&router))
        .await?;

    tracing::info!(
        app_version = %config.endpoint.app_version,
        token = %config.endpoint.token,
        "Starting endpoint"
    );

    let mut agent = Agent::new(Arc::new(broker), router, device, &config);
    agent.run(&shutdown).await
}
