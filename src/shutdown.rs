// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooperative shutdown on SIGINT/SIGTERM.

use std::future;

use tokio::sync::watch;

/// Observes whether shutdown was requested.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Requests shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Sets the shutdown flag.
    ///
    /// Returns `true` the first time, `false` once shutdown is already
    /// requested.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }
}

impl Shutdown {
    /// Creates a flag with a manual trigger.
    #[must_use]
    pub fn new() -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Self { rx })
    }

    /// Creates a flag set by the first SIGINT or SIGTERM.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn install() -> Self {
        let (trigger, shutdown) = Self::new();
        tokio::spawn(listen(trigger));
        shutdown
    }

    /// Returns `true` once shutdown was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when shutdown is requested.
    ///
    /// Never completes if the trigger is dropped without firing.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|requested| *requested).await.is_err() {
            future::pending::<()>().await;
        }
    }
}

async fn listen(trigger: ShutdownTrigger) {
    let mut terminate = terminate_stream();
    loop {
        let signal = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for SIGINT");
                    return;
                }
                "SIGINT"
            }
            () = next_terminate(&mut terminate) => "SIGTERM",
        };

        if trigger.trigger() {
            tracing::info!(signal, "Shutting down...");
        } else {
            tracing::info!(signal, "Shutdown already in progress");
        }
    }
}

#[cfg(unix)]
type Terminate = Option<tokio::signal::unix::Signal>;

#[cfg(not(unix))]
type Terminate = ();

#[cfg(unix)]
fn terminate_stream() -> Terminate {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for SIGTERM");
            None
        }
    }
}

#[cfg(not(unix))]
fn terminate_stream() -> Terminate {}

#[cfg(unix)]
async fn next_terminate(stream: &mut Terminate) {
    if let Some(stream) = stream
        && stream.recv().await.is_some()
    {
        return;
    }
    future::pending::<()>().await;
}

#[cfg(not(unix))]
async fn next_terminate(_stream: &mut Terminate) {
    future::pending::<()>().await;
}
