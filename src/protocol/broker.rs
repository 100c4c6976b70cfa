// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection for the endpoint.
//!
//! [`KaaBroker`] owns the rumqttc client and spawns the background delivery
//! loop. Inbound messages are handed to a shared [`TopicRouter`]; replies
//! returned by handlers are published from the same loop.
//!
//! The delivery loop never gives up on a connection error: it marks the
//! broker disconnected, waits the reconnect delay and polls again, which makes
//! rumqttc reconnect. Every filter subscribed through [`Transport::subscribe`]
//! is subscribed again on each new session.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use kaa_endpoint::protocol::{KaaBroker, TopicRouter};
//!
//! # async fn example() -> kaa_endpoint::Result<()> {
//! let router = Arc::new(TopicRouter::new());
//! let broker = KaaBroker::builder()
//!     .host("mqtt.cloud.kaaiot.com")
//!     .port(1883)
//!     .build(router)
//!     .await?;
//!
//! assert!(broker.is_connected());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ProtocolError;

use super::{TopicRouter, Transport};

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long `disconnect` waits for the delivery loop to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection settings for the broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// How long to wait for a ConnAck, in seconds.
    pub connection_timeout_secs: u64,
    /// Pause between reconnection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// MQTT client id; generated when absent.
    pub client_id: Option<String>,
    /// Broker user name.
    pub username: Option<String>,
    /// Broker password.
    pub password: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "mqtt.cloud.kaaiot.com".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            connection_timeout_secs: 10,
            reconnect_delay_ms: 1000,
            client_id: None,
            username: None,
            password: None,
        }
    }
}

/// An MQTT connection to the Kaa broker.
///
/// `KaaBroker` is cheaply cloneable (via `Arc`).
#[derive(Clone)]
pub struct KaaBroker {
    inner: Arc<KaaBrokerInner>,
}

struct KaaBrokerInner {
    client: AsyncClient,
    router: Arc<TopicRouter>,
    /// Filters to restore on every new session.
    subscriptions: Mutex<Vec<String>>,
    settings: BrokerSettings,
    client_id: String,
    connected: watch::Sender<bool>,
    /// Set once `disconnect` is requested; stops the delivery loop.
    closing: AtomicBool,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl KaaBroker {
    /// Creates a new builder for configuring a broker connection.
    #[must_use]
    pub fn builder() -> KaaBrokerBuilder {
        KaaBrokerBuilder::default()
    }

    /// Returns whether the broker is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.settings.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.settings.port
    }

    /// Returns the MQTT client id in use.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.inner.settings.connection_timeout_secs)
    }

    async fn wait_connected(&self, timeout: Duration) -> Result<(), ProtocolError> {
        let mut rx = self.inner.connected.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed(
                "connection state channel closed".to_string(),
            )),
            Err(_) => Err(ProtocolError::ConnectionFailed(format!(
                "MQTT connection timeout after {}s",
                timeout.as_secs()
            ))),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.inner.connected.send_replace(connected);
    }

    /// Restores every known subscription after a ConnAck.
    fn resubscribe(&self) {
        let filters = self.inner.subscriptions.lock().clone();
        for filter in filters {
            if let Err(e) = self.inner.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                tracing::warn!(filter = %filter, error = %e, "Failed to restore subscription");
            }
        }
    }

    /// Routes one inbound message and publishes the handlers' replies.
    fn deliver(&self, topic: &str, payload: &str) {
        for reply in self.inner.router.dispatch(topic, payload) {
            tracing::debug!(topic = %reply.topic, payload = %reply.payload, "Publishing reply");
            if let Err(e) = self.inner.client.try_publish(
                reply.topic.as_str(),
                QoS::AtLeastOnce,
                false,
                reply.payload,
            ) {
                tracing::warn!(topic = %reply.topic, error = %e, "Failed to publish reply");
            }
        }
    }
}

impl Transport for KaaBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        tracing::debug!(topic = %topic, payload = %payload, "Publishing MQTT message");
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn subscribe(&self, filter: &str) -> Result<(), ProtocolError> {
        {
            let mut subscriptions = self.inner.subscriptions.lock();
            if !subscriptions.iter().any(|f| f == filter) {
                subscriptions.push(filter.to_string());
            }
        }
        self.inner
            .client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(filter = %filter, "Subscribed to topic filter");
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), ProtocolError> {
        if self.inner.closing.load(Ordering::Acquire) {
            return Err(ProtocolError::ConnectionFailed(
                "broker connection is closed".to_string(),
            ));
        }
        tracing::info!(
            host = %self.inner.settings.host,
            port = %self.inner.settings.port,
            "Attempting to reconnect to MQTT broker"
        );
        self.wait_connected(self.connection_timeout()).await
    }

    async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.settings.host,
            port = %self.inner.settings.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.closing.store(true, Ordering::Release);
        let result = self
            .inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt);

        let task = self.inner.event_task.lock().take();
        if let Some(task) = task
            && tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err()
        {
            tracing::warn!("MQTT event loop did not stop in time");
        }

        self.set_connected(false);
        result
    }
}

impl std::fmt::Debug for KaaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaaBroker")
            .field("host", &self.inner.settings.host)
            .field("port", &self.inner.settings.port)
            .field("client_id", &self.inner.client_id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for creating a broker connection.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use kaa_endpoint::protocol::{KaaBroker, TopicRouter};
///
/// # async fn example() -> kaa_endpoint::Result<()> {
/// let broker = KaaBroker::builder()
///     .host("192.168.1.50")
///     .credentials("user", "password")
///     .keep_alive(Duration::from_secs(30))
///     .connection_timeout(Duration::from_secs(5))
///     .build(Arc::new(TopicRouter::new()))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct KaaBrokerBuilder {
    settings: BrokerSettings,
}

impl KaaBrokerBuilder {
    /// Starts from loaded settings.
    #[must_use]
    pub fn settings(mut self, settings: BrokerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self.settings.password = Some(password.into());
        self
    }

    /// Sets a fixed client id.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.settings.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.settings.keep_alive_secs = duration.as_secs();
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.settings.connection_timeout_secs = duration.as_secs();
        self
    }

    /// Sets the pause between reconnection attempts (default: 1 second).
    #[must_use]
    pub fn reconnect_delay(mut self, duration: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let millis = duration.as_millis() as u64;
        self.settings.reconnect_delay_ms = millis;
        self
    }

    /// Connects to the broker and starts the delivery loop.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is empty
    /// - The broker does not acknowledge the connection in time
    pub async fn build(self, router: Arc<TopicRouter>) -> Result<KaaBroker, ProtocolError> {
        let settings = self.settings;
        if settings.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| format!("kaa_endpoint_{}", uuid::Uuid::new_v4().simple()));

        tracing::info!(
            host = %settings.host,
            port = %settings.port,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let mut mqtt_options = MqttOptions::new(&client_id, &settings.host, settings.port);
        mqtt_options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        mqtt_options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (connected, _) = watch::channel(false);

        let broker = KaaBroker {
            inner: Arc::new(KaaBrokerInner {
                client,
                router,
                subscriptions: Mutex::new(Vec::new()),
                settings,
                client_id,
                connected,
                closing: AtomicBool::new(false),
                event_task: Mutex::new(None),
            }),
        };

        let task = tokio::spawn(handle_broker_events(event_loop, broker.clone()));
        *broker.inner.event_task.lock() = Some(task);

        if let Err(e) = broker.wait_connected(broker.connection_timeout()).await {
            broker.inner.closing.store(true, Ordering::Release);
            if let Some(task) = broker.inner.event_task.lock().take() {
                task.abort();
            }
            return Err(e);
        }

        tracing::info!(
            host = %broker.inner.settings.host,
            port = %broker.inner.settings.port,
            "Connected to MQTT broker"
        );
        Ok(broker)
    }
}

/// Drives the rumqttc event loop until the broker is closed.
async fn handle_broker_events(mut event_loop: EventLoop, broker: KaaBroker) {
    use rumqttc::{Event, Outgoing, Packet};

    let reconnect_delay = Duration::from_millis(broker.inner.settings.reconnect_delay_ms);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                broker.set_connected(true);
                broker.resubscribe();
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => {
                        tracing::debug!(
                            topic = %publish.topic,
                            payload = %payload,
                            "MQTT message received"
                        );
                        broker.deliver(&publish.topic, &payload);
                    }
                    Err(e) => {
                        tracing::warn!(topic = %publish.topic, error = %e, "Dropping non-UTF-8 message");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                broker.set_connected(false);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                broker.set_connected(false);
                tracing::debug!("MQTT event loop stopped");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                broker.set_connected(false);
                if broker.inner.closing.load(Ordering::Acquire) {
                    tracing::debug!("MQTT event loop stopped");
                    break;
                }
                tracing::error!(error = %e, "MQTT broker event loop error");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}
