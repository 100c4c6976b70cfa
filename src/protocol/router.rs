// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT topic routing for inbound messages.
//!
//! # Architecture
//!
//! ```text
//! MQTT Message: kp1/<app>/cex/<token>/command/turnon/status → [...]
//!                     ↓
//!             TopicRouter.dispatch()
//!                     ↓
//!      every route whose filter matches the topic
//!                     ↓
//!        handler(topic, payload) → Option<Publication>
//!                     ↓
//!     replies returned to the delivery loop for publishing
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ValueError;
use crate::topic::TopicFilter;

use super::Publication;

/// A message handler.
///
/// Runs synchronously in the delivery context, so it must not block. It may
/// return a reply that the delivery loop publishes on its behalf.
pub type Handler = Arc<dyn Fn(&str, &str) -> Option<Publication> + Send + Sync>;

struct Route {
    filter: TopicFilter,
    /// Handlers in registration order.
    handlers: Vec<Handler>,
}

/// Routes inbound MQTT messages to handlers by topic filter.
#[derive(Default)]
pub struct TopicRouter {
    routes: RwLock<Vec<Route>>,
}

impl TopicRouter {
    /// Creates a new empty topic router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a topic filter.
    ///
    /// Registering the same filter again appends the handler after the ones
    /// already registered for it.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidTopicFilter` if the filter is not a valid
    /// MQTT subscription filter.
    pub fn register<F>(&self, filter: &str, handler: F) -> Result<(), ValueError>
    where
        F: Fn(&str, &str) -> Option<Publication> + Send + Sync + 'static,
    {
        let filter = TopicFilter::new(filter)?;
        tracing::debug!(filter = %filter, "Registering topic handler");

        let handler: Handler = Arc::new(handler);
        let mut routes = self.routes.write();
        if let Some(route) = routes.iter_mut().find(|r| r.filter == filter) {
            route.handlers.push(handler);
        } else {
            routes.push(Route {
                filter,
                handlers: vec![handler],
            });
        }
        Ok(())
    }

    /// Dispatches a message to every matching handler.
    ///
    /// Returns the replies produced by the handlers. A message no filter
    /// matches is logged and dropped.
    pub fn dispatch(&self, topic: &str, payload: &str) -> Vec<Publication> {
        // Clone the handlers out so none runs while the lock is held.
        let handlers: Vec<Handler> = {
            let routes = self.routes.read();
            routes
                .iter()
                .filter(|r| r.filter.matches(topic))
                .flat_map(|r| r.handlers.iter().cloned())
                .collect()
        };

        if handlers.is_empty() {
            tracing::info!(topic = %topic, payload = %payload, "Message received on unrouted topic");
            return Vec::new();
        }

        handlers
            .iter()
            .filter_map(|handler| handler(topic, payload))
            .collect()
    }

    /// Returns the registered filters in registration order.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.routes
            .read()
            .iter()
            .map(|r| r.filter.as_str().to_string())
            .collect()
    }

    /// Returns the number of registered filters.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("filters", &self.filters())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    #[test]
    fn dispatch_to_matching_handler() {
        let router = TopicRouter::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        router
            .register("app/get/#", move |_topic, _payload| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                None
            })
            .unwrap();

        let replies = router.dispatch("app/get/1/status", "{}");
        assert!(replies.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_message_is_dropped() {
        let router = TopicRouter::new();
        router
            .register("app/command/turnon/status", |_, _| {
                Some(Publication::new("app/result/turnon", "[]"))
            })
            .unwrap();

        assert!(router.dispatch("app/other", "x").is_empty());
    }

    #[test]
    fn handlers_for_one_filter_fire_in_registration_order() {
        let router = TopicRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            router
                .register("a/+", move |_, _| {
                    order.lock().push(n);
                    None
                })
                .unwrap();
        }

        router.dispatch("a/b", "");
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(router.route_count(), 1);
    }

    #[test]
    fn all_matching_filters_receive_the_message() {
        let router = TopicRouter::new();
        router
            .register("a/#", |topic, _| Some(Publication::new("wide", topic)))
            .unwrap();
        router
            .register("a/b", |topic, _| Some(Publication::new("exact", topic)))
            .unwrap();

        let mut replies: Vec<String> = router
            .dispatch("a/b", "")
            .into_iter()
            .map(|p| p.topic)
            .collect();
        replies.sort();
        assert_eq!(replies, vec!["exact", "wide"]);
    }

    #[test]
    fn reply_carries_handler_output() {
        let router = TopicRouter::new();
        router
            .register("in", |_, payload| {
                Some(Publication::new("out", payload.to_uppercase()))
            })
            .unwrap();

        let replies = router.dispatch("in", "ack");
        assert_eq!(replies, vec![Publication::new("out", "ACK")]);
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let router = TopicRouter::new();
        let result = router.register("a/#/b", |_, _| None);
        assert!(matches!(result, Err(ValueError::InvalidTopicFilter(_))));
        assert_eq!(router.route_count(), 0);
    }

    #[test]
    fn filters_are_listed_in_registration_order() {
        let router = TopicRouter::new();
        router.register("b/#", |_, _| None).unwrap();
        router.register("a/+", |_, _| None).unwrap();
        router.register("b/#", |_, _| None).unwrap();
        assert_eq!(router.filters(), vec!["b/#", "a/+"]);
    }
}
