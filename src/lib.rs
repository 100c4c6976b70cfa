// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `kaa_endpoint` - An endpoint agent bridging a serial sensor/actuator to
//! the Kaa IoT platform over MQTT.
//!
//! The agent reads `key:value` sample lines from the device and publishes
//! one telemetry record per cycle, executes `turnon`/`turnoff` commands
//! against an RGB light, and fetches the endpoint metadata on startup.
//!
//! # Supported Features
//!
//! - **Telemetry**: data collection records with a millisecond timestamp
//! - **Commands**: batched `turnon`/`turnoff` with per-command results
//! - **Metadata**: correlated get and unconfirmed partial update
//! - **Resilience**: background reconnect with automatic resubscription
//!
//! # Quick Start
//!
//! ```no_run
//! use kaa_endpoint::config::AgentConfig;
//!
//! #[tokio::main]
//! async fn main() -> kaa_endpoint::Result<()> {
//!     let config = AgentConfig::load("kaa-endpoint.toml").await?;
//!     kaa_endpoint::run(config).await
//! }
//! ```
//!
//! # Driving an Agent by Hand
//!
//! ```no_run
//! use std::sync::Arc;
//! use kaa_endpoint::{Agent, KaaBroker, LineDevice, Shutdown, TopicRouter};
//! use kaa_endpoint::config::AgentConfig;
//!
//! # async fn example() -> kaa_endpoint::Result<()> {
//! let config = AgentConfig::default();
//! let router = Arc::new(TopicRouter::new());
//! let broker = KaaBroker::builder()
//!     .host("localhost")
//!     .build(Arc::clone(&router))
//!     .await?;
//! let device = LineDevice::open("/dev/ttyACM0").await?;
//!
//! let shutdown = Shutdown::install();
//! Agent::new(Arc::new(broker), router, device, &config)
//!     .run(&shutdown)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod agent;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod metadata;
pub mod protocol;
pub mod shutdown;
pub mod state;
pub mod telemetry;
pub mod topic;
pub mod types;

pub use agent::{Agent, run};
pub use command::{AckPolicy, Action, Command, CommandDispatcher, CommandId, CommandResult};
pub use device::{Device, LineDevice};
pub use error::{ConfigError, DeviceError, Error, ParseError, ProtocolError, Result, ValueError};
pub use metadata::MetadataClient;
pub use protocol::{KaaBroker, KaaBrokerBuilder, Publication, RequestCorrelator, TopicRouter, Transport};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use state::DeviceState;
pub use telemetry::{FailurePolicy, FlushOutcome, TelemetryPublisher, TelemetryRecord};
pub use topic::{KaaTopics, TopicFilter};
pub use types::{Color, LightState};
