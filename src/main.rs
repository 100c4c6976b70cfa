// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `kaa-endpoint [CONFIG]`
//!
//! Runs the endpoint agent with the TOML configuration at `CONFIG`
//! (default `kaa-endpoint.toml`). Log verbosity follows `RUST_LOG`.

use std::process::ExitCode;

use kaa_endpoint::config::AgentConfig;

const DEFAULT_CONFIG_PATH: &str = "kaa-endpoint.toml";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match AgentConfig::load(&path).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match kaa_endpoint::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Endpoint stopped");
            ExitCode::FAILURE
        }
    }
}
