//! Topic and handler registry
//!
//! Inbound messages fan out to the callbacks registered for their topic, in
//! registration order, then to every generic handler. The router only hands
//! out callback snapshots; the client invokes them with no lock held.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tether_core::Message;
use tracing::{debug, warn};

/// A message consumer
pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Token for one topic subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Token for one generic handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

struct Topic {
    name: String,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

#[derive(Default)]
pub struct Router {
    next_id: u64,
    topics: Vec<Topic>,
    handlers: Vec<(HandlerId, Callback)>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("topics", &self.topics())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Register a topic callback
    ///
    /// The flag is true when this is the topic's first callback, i.e. the
    /// server doesn't know about the topic yet.
    pub fn subscribe(&mut self, topic: &str, callback: Callback) -> (SubscriptionId, bool) {
        let id = SubscriptionId(self.next());
        match self.topics.iter_mut().find(|t| t.name == topic) {
            Some(entry) => {
                entry.callbacks.push((id, callback));
                (id, false)
            }
            None => {
                self.topics.push(Topic {
                    name: topic.to_string(),
                    callbacks: vec![(id, callback)],
                });
                debug!("New topic '{}'", topic);
                (id, true)
            }
        }
    }

    /// Remove one callback (`Some(id)`) or the whole topic (`None`)
    ///
    /// Returns true when the topic itself is gone afterwards.
    pub fn unsubscribe(&mut self, topic: &str, id: Option<SubscriptionId>) -> bool {
        let Some(index) = self.topics.iter().position(|t| t.name == topic) else {
            warn!("Unsubscribe from unknown topic '{}'", topic);
            return false;
        };

        if let Some(id) = id {
            let callbacks = &mut self.topics[index].callbacks;
            let before = callbacks.len();
            callbacks.retain(|(sub, _)| *sub != id);
            if callbacks.len() == before {
                warn!("No subscription {} on topic '{}'", id, topic);
            }
            if !callbacks.is_empty() {
                return false;
            }
        }

        self.topics.remove(index);
        true
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t.name == topic)
    }

    /// Registered topics in first-subscription order
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }

    pub fn add_handler(&mut self, callback: Callback) -> HandlerId {
        let id = HandlerId(self.next());
        self.handlers.push((id, callback));
        id
    }

    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.handlers.clear();
    }

    /// Everything that should see `message`, in invocation order
    pub fn route(&self, message: &Message) -> Vec<Callback> {
        let topic_callbacks = message
            .topic()
            .and_then(|topic| self.topics.iter().find(|t| t.name == topic))
            .into_iter()
            .flat_map(|t| t.callbacks.iter().map(|(_, cb)| cb.clone()));

        topic_callbacks
            .chain(self.handlers.iter().map(|(_, cb)| cb.clone()))
            .collect()
    }
}

/// Invoke each callback, isolating panics
///
/// Returns the panic message of every callback that panicked.
pub fn invoke(callbacks: &[Callback], message: &Message) -> Vec<String> {
    let mut failures = Vec::new();
    for callback in callbacks {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(message))) {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            failures.push(reason);
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Callback {
        let log = log.clone();
        let name = name.to_string();
        Arc::new(move |_: &Message| log.lock().push(name.clone()))
    }

    #[test]
    fn test_first_subscriber_flag() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (_, first) = router.subscribe("quotes", recorder(&log, "a"));
        assert!(first);
        let (_, first) = router.subscribe("quotes", recorder(&log, "b"));
        assert!(!first);
        assert_eq!(router.topics(), vec!["quotes"]);
    }

    #[test]
    fn test_route_order() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.add_handler(recorder(&log, "handler"));
        router.subscribe("quotes", recorder(&log, "first"));
        router.subscribe("quotes", recorder(&log, "second"));
        router.subscribe("news", recorder(&log, "news"));

        let message = Message::Json(json!({"topic": "quotes", "px": 1}));
        invoke(&router.route(&message), &message);

        assert_eq!(*log.lock(), vec!["first", "second", "handler"]);
    }

    #[test]
    fn test_route_channel_field() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.subscribe("news", recorder(&log, "news"));

        let message = Message::Json(json!({"channel": "news"}));
        assert_eq!(router.route(&message).len(), 1);

        // non-string topic only skips topic fan-out
        let message = Message::Json(json!({"topic": 7}));
        assert!(router.route(&message).is_empty());
    }

    #[test]
    fn test_unsubscribe_single_then_topic() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, _) = router.subscribe("quotes", recorder(&log, "a"));
        let (b, _) = router.subscribe("quotes", recorder(&log, "b"));

        assert!(!router.unsubscribe("quotes", Some(a)));
        assert!(router.is_subscribed("quotes"));
        assert!(router.unsubscribe("quotes", Some(b)));
        assert!(!router.is_subscribed("quotes"));
    }

    #[test]
    fn test_unsubscribe_unknown_topic() {
        let mut router = Router::new();
        assert!(!router.unsubscribe("missing", None));
    }

    #[test]
    fn test_remove_handler() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = router.add_handler(recorder(&log, "h"));

        assert!(router.remove_handler(id));
        assert!(!router.remove_handler(id));
        assert_eq!(router.handler_count(), 0);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let mut router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.subscribe("quotes", Arc::new(|_: &Message| panic!("boom")));
        router.subscribe("quotes", recorder(&log, "after"));

        let message = Message::Json(json!({"topic": "quotes"}));
        let failures = invoke(&router.route(&message), &message);

        assert_eq!(failures, vec!["boom"]);
        assert_eq!(*log.lock(), vec!["after"]);
    }
}
