// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request/response correlation over publish/subscribe.
//!
//! A request is published on `<base>/<id>` and its response arrives on
//! `<base>/<id>/status`. The id comes from a counter owned by the
//! [`RequestCorrelator`] and is never reused, so a late response for a
//! timed-out request can never be mistaken for a newer one.
//!
//! The waiting side and the fulfilling side only share the
//! [`PendingRequests`] table: the caller waits on a oneshot receiver, and the
//! router handler fulfils the matching sender from the delivery task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{ParseError, ProtocolError};
use crate::topic::{request_topic, subtree_filter};

use super::Transport;

/// Timeout applied to correlated requests unless configured otherwise.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Last topic level of a successful response.
const STATUS_MARKER: &str = "status";

/// Requests waiting for their response, keyed by request id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<u64, oneshot::Sender<String>>>,
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, id: u64) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    fn remove(&self, id: u64) -> bool {
        self.slots.lock().remove(&id).is_some()
    }

    /// Returns the number of requests still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no request is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Fulfils the request a response topic refers to.
    ///
    /// The topic must end in `<id>/status` with `<id>` pending. Other shapes
    /// are logged as malformed and never touch a slot. A response for an id
    /// that is not pending (already answered, timed out, or never issued) is
    /// ignored.
    ///
    /// Returns `true` if a waiting request received the payload.
    pub fn handle_response(&self, topic: &str, payload: &str) -> bool {
        let id = match parse_response_topic(topic) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, payload = %payload, "Dropping bad response");
                return false;
            }
        };

        let Some(slot) = self.slots.lock().remove(&id) else {
            tracing::debug!(topic = %topic, id, "Response for a request that is not pending");
            return false;
        };

        tracing::debug!(topic = %topic, id, "Received correlated response");
        // The receiver is gone only if the caller stopped waiting in between.
        slot.send(payload.to_string()).is_ok()
    }
}

/// Extracts the request id from `.../<id>/status`.
fn parse_response_topic(topic: &str) -> Result<u64, ParseError> {
    let malformed = || ParseError::MalformedResponse {
        topic: topic.to_string(),
    };

    let mut levels = topic.rsplit('/');
    let marker = levels.next().ok_or_else(malformed)?;
    let id = levels.next().ok_or_else(malformed)?;
    if marker != STATUS_MARKER {
        return Err(malformed());
    }
    id.parse().map_err(|_| malformed())
}

/// Removes a pending slot when dropped.
struct SlotGuard<'a> {
    pending: &'a PendingRequests,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

/// Issues correlated requests on a base topic.
///
/// # Examples
///
/// ```ignore
/// let correlator = RequestCorrelator::new(transport, topics.metadata_get_base());
/// let pending = correlator.pending();
/// router.register(&correlator.response_filter(), move |topic, payload| {
///     pending.handle_response(topic, payload);
///     None
/// })?;
///
/// let metadata = correlator.request("{}".to_string()).await?;
/// ```
#[derive(Debug)]
pub struct RequestCorrelator<T> {
    transport: Arc<T>,
    base_topic: String,
    next_id: AtomicU64,
    pending: Arc<PendingRequests>,
    timeout: Duration,
}

impl<T: Transport> RequestCorrelator<T> {
    /// Creates a correlator publishing requests under `base_topic`.
    #[must_use]
    pub fn new(transport: Arc<T>, base_topic: impl Into<String>) -> Self {
        Self {
            transport,
            base_topic: base_topic.into(),
            next_id: AtomicU64::new(0),
            pending: Arc::new(PendingRequests::new()),
            timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Sets how long a request waits for its response.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the pending table shared with the response handler.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingRequests> {
        Arc::clone(&self.pending)
    }

    /// Returns the filter that covers every response topic.
    #[must_use]
    pub fn response_filter(&self) -> String {
        subtree_filter(&self.base_topic)
    }

    /// Publishes a request and waits for the response carrying its id.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ResponseTimeout` if no response arrives within
    /// the timeout, or the transport error if the request cannot be published.
    pub async fn request(&self, payload: String) -> Result<String, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let topic = request_topic(&self.base_topic, id);
        let rx = self.pending.insert(id);
        // Releases the slot on every exit, including a dropped future.
        let _slot = SlotGuard {
            pending: &self.pending,
            id,
        };

        tracing::debug!(topic = %topic, id, "Publishing correlated request");
        self.transport.publish(&topic, payload).await?;

        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.timeout.as_millis() as u64;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed(format!(
                "response slot for request {id} dropped"
            ))),
            Err(_) => {
                tracing::warn!(topic = %topic, id, timeout_ms, "Timed out waiting for response");
                Err(ProtocolError::ResponseTimeout { id, timeout_ms })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::RecordingTransport;

    const BASE: &str = "kp1/app/epmx/token/get";

    #[test]
    fn parse_status_topic() {
        assert_eq!(parse_response_topic("kp1/app/epmx/t/get/42/status").unwrap(), 42);
    }

    #[test]
    fn parse_rejects_other_shapes() {
        assert!(parse_response_topic("kp1/app/epmx/t/get/42/error").is_err());
        assert!(parse_response_topic("kp1/app/epmx/t/get/42").is_err());
        assert!(parse_response_topic("kp1/app/epmx/t/get/abc/status").is_err());
        assert!(parse_response_topic("status").is_err());
    }

    #[test]
    fn response_without_pending_entry_is_ignored() {
        let pending = PendingRequests::new();
        assert!(!pending.handle_response(&format!("{BASE}/9/status"), "{}"));
        assert!(pending.is_empty());
    }

    #[test]
    fn malformed_response_does_not_fulfil_a_slot() {
        let pending = PendingRequests::new();
        let mut rx = pending.insert(3);

        assert!(!pending.handle_response(&format!("{BASE}/3"), "echo"));
        assert!(!pending.handle_response(&format!("{BASE}/3/error"), "{}"));
        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_receives_matching_response() {
        let transport = Arc::new(RecordingTransport::new());
        let mut published = transport.forward();
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE);
        let pending = correlator.pending();

        let responder = tokio::spawn(async move {
            let request = published.recv().await.unwrap();
            pending.handle_response(&format!("{}/status", request.topic), r#"{"name":"lamp"}"#)
        });

        let response = correlator.request("{}".to_string()).await.unwrap();
        assert_eq!(response, r#"{"name":"lamp"}"#);
        assert!(responder.await.unwrap());
        assert!(correlator.pending().is_empty());

        let sent = transport.published();
        assert_eq!(sent, vec![crate::protocol::Publication::new(format!("{BASE}/0"), "{}")]);
    }

    #[tokio::test]
    async fn concurrent_requests_are_not_cross_wired() {
        let transport = Arc::new(RecordingTransport::new());
        let mut published = transport.forward();
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE);
        let pending = correlator.pending();

        // Answer all requests in reverse order of arrival, echoing the id.
        let responder = tokio::spawn(async move {
            let mut topics = Vec::new();
            for _ in 0..4 {
                topics.push(published.recv().await.unwrap().topic);
            }
            for topic in topics.iter().rev() {
                let id = topic.rsplit('/').next().unwrap().to_string();
                pending.handle_response(&format!("{topic}/status"), &id);
            }
        });

        let (a, b, c, d) = tokio::join!(
            correlator.request("{}".to_string()),
            correlator.request("{}".to_string()),
            correlator.request("{}".to_string()),
            correlator.request("{}".to_string()),
        );
        responder.await.unwrap();

        let mut responses = vec![a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];
        let published_ids: Vec<String> = transport
            .published()
            .iter()
            .map(|p| p.topic.rsplit('/').next().unwrap().to_string())
            .collect();
        // join! polls in order, so request n published id n.
        assert_eq!(published_ids, vec!["0", "1", "2", "3"]);
        assert_eq!(responses, vec!["0", "1", "2", "3"]);
        responses.dedup();
        assert_eq!(responses.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_and_clears_its_slot() {
        let transport = Arc::new(RecordingTransport::new());
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE)
            .with_timeout(Duration::from_secs(5));

        let err = correlator.request("{}".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ResponseTimeout {
                id: 0,
                timeout_ms: 5000
            }
        ));
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_after_timeout_is_discarded() {
        let transport = Arc::new(RecordingTransport::new());
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE)
            .with_timeout(Duration::from_millis(100));
        let pending = correlator.pending();

        assert!(correlator.request("{}".to_string()).await.is_err());
        assert!(!pending.handle_response(&format!("{BASE}/0/status"), "late"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_block_next_request() {
        let transport = Arc::new(RecordingTransport::new());
        let mut published = transport.forward();
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE)
            .with_timeout(Duration::from_millis(100));
        let pending = correlator.pending();

        assert!(correlator.request("{}".to_string()).await.is_err());
        // Drain the first (unanswered) request.
        let first = published.recv().await.unwrap();
        assert_eq!(first.topic, format!("{BASE}/0"));

        let responder = tokio::spawn(async move {
            let request = published.recv().await.unwrap();
            // A stale answer for the spent id must not satisfy the new request.
            pending.handle_response(&format!("{BASE}/0/status"), "stale");
            pending.handle_response(&format!("{}/status", request.topic), "fresh");
        });

        let response = correlator.request("{}".to_string()).await.unwrap();
        assert_eq!(response, "fresh");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_releases_the_slot() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_fail_publish(true);
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE);

        let err = correlator.request("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
        assert!(correlator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_requests_release_their_slots() {
        let transport = Arc::new(RecordingTransport::new());
        let correlator = RequestCorrelator::new(Arc::clone(&transport), BASE);

        for _ in 0..3 {
            let outer =
                tokio::time::timeout(Duration::from_millis(10), correlator.request("{}".to_string()))
                    .await;
            assert!(outer.is_err());
        }

        assert_eq!(transport.published().len(), 3);
        assert!(correlator.pending().is_empty());
        // Answers for the abandoned ids find nothing to fulfil.
        assert!(!correlator.pending().handle_response(&format!("{BASE}/1/status"), "late"));
    }

    #[test]
    fn response_filter_covers_base() {
        let transport = Arc::new(RecordingTransport::new());
        let correlator = RequestCorrelator::new(transport, BASE);
        assert_eq!(correlator.response_filter(), format!("{BASE}/#"));
    }
}
