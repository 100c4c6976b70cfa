// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the broker connection using mockforge-mqtt.

use std::sync::Arc;
use std::time::Duration;

use kaa_endpoint::config::AgentConfig;
use kaa_endpoint::protocol::{KaaBroker, RequestCorrelator, TopicRouter, Transport};
use kaa_endpoint::{Agent, Error, KaaTopics, LineDevice, ProtocolError, Shutdown};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18850);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    sleep(Duration::from_millis(500)).await;
}

async fn connect(port: u16, router: Arc<TopicRouter>) -> KaaBroker {
    KaaBroker::builder()
        .host("127.0.0.1")
        .port(port)
        .connection_timeout(Duration::from_secs(5))
        .reconnect_delay(Duration::from_millis(100))
        .build(router)
        .await
        .expect("broker should accept the connection")
}

// ============================================================================
// Connection Tests
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port, Arc::new(TopicRouter::new())).await;

        assert!(broker.is_connected());
        assert_eq!(broker.host(), "127.0.0.1");
        assert_eq!(broker.port(), port);
        assert!(broker.client_id().starts_with("kaa_endpoint_"));
    }

    #[tokio::test]
    async fn connect_with_fixed_client_id() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = KaaBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .client_id("lamp-1")
            .build(Arc::new(TopicRouter::new()))
            .await
            .unwrap();

        assert_eq!(broker.client_id(), "lamp-1");
    }

    #[tokio::test]
    async fn connect_without_broker_times_out() {
        let port = get_test_port();

        let result = KaaBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .connection_timeout(Duration::from_secs(1))
            .build(Arc::new(TopicRouter::new()))
            .await;

        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn publish_and_subscribe_while_connected() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port, Arc::new(TopicRouter::new())).await;
        let topics = KaaTopics::new("app-v1", "token1");

        broker.subscribe(&topics.command("turnon")).await.unwrap();
        broker
            .publish(&topics.data_collection("15"), r#"{"temp":21.5}"#.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_after_disconnect_fails() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port, Arc::new(TopicRouter::new())).await;
        broker.disconnect().await.unwrap();

        assert!(!broker.is_connected());
        let result = broker.publish("kp1/app/dcx/tok/json/15", "{}".to_string()).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
        assert!(broker.reconnect().await.is_err());
    }
}

// ============================================================================
// Correlation Tests
// ============================================================================
//
// NOTE: The mockforge-mqtt broker doesn't forward publications between
// clients, so nothing ever answers a request here. Response routing is
// covered by the unit tests in src/protocol/correlator.rs and src/agent.rs.

mod correlation {
    use super::*;

    #[tokio::test]
    async fn request_without_platform_times_out() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = Arc::new(connect(port, Arc::new(TopicRouter::new())).await);
        let topics = KaaTopics::new("app-v1", "token1");
        let correlator = RequestCorrelator::new(Arc::clone(&broker), topics.metadata_get_base())
            .with_timeout(Duration::from_millis(300));

        let result = correlator.request("{}".to_string()).await;

        assert!(matches!(
            result,
            Err(ProtocolError::ResponseTimeout {
                id: 0,
                timeout_ms: 300
            })
        ));
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test]
    async fn agent_stops_when_metadata_is_unavailable() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let router = Arc::new(TopicRouter::new());
        let broker = Arc::new(connect(port, Arc::clone(&router)).await);
        let mut config = AgentConfig::default();
        config.endpoint.response_timeout_ms = 300;
        let device = LineDevice::new(&b"temp:1\n\n"[..], Vec::new());

        let (_trigger, shutdown) = Shutdown::new();
        let mut agent = Agent::new(Arc::clone(&broker), Arc::clone(&router), device, &config);
        let result = agent.run(&shutdown).await;

        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ResponseTimeout { .. }))
        ));
        assert_eq!(router.route_count(), 3);
        assert!(!broker.is_connected());
        assert!(agent.device().writer().is_empty());
    }
}
