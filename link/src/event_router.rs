//! Topic-based fan-out of inbound events to independent listeners.
//!
//! Any number of handlers can listen on a topic; they run in registration
//! order. A handler that returns an error or panics is logged and skipped,
//! and the remaining handlers of the same dispatch still run.
//!
//! # Example
//!
//! ```rust
//! use atlas_link::{EventRouter, topics};
//! use std::sync::Arc;
//!
//! let router = Arc::new(EventRouter::new());
//! let registration = router.on(topics::CONNECTION_STATUS, |event| {
//!     println!("status: {}", event.payload);
//!     Ok(())
//! });
//!
//! // later
//! registration.unsubscribe();
//! ```

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::AtlasLinkError;
use crate::models::EventEnvelope;

/// Type alias for a registered event handler.
pub type EventHandler = Arc<dyn Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync>;

/// Identity of one registration, used by [`EventRouter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Fan-out dispatcher: topic → ordered handler list.
#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let counts: HashMap<&str, usize> =
            handlers.iter().map(|(topic, list)| (topic.as_str(), list.len())).collect();
        f.debug_struct("EventRouter").field("handlers", &counts).finish()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `topic`.
    ///
    /// The returned [`HandlerRegistration`] removes exactly this handler when
    /// [`unsubscribe`](HandlerRegistration::unsubscribe) is called. Dropping it
    /// without calling `unsubscribe` leaves the handler registered.
    pub fn on<F>(self: &Arc<Self>, topic: &str, handler: F) -> HandlerRegistration
    where
        F: Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.add(topic, Arc::new(handler));
        HandlerRegistration {
            router: Arc::downgrade(self),
            topic: topic.to_string(),
            id,
        }
    }

    /// Register a pre-built handler without a registration guard.
    pub fn add(&self, topic: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().entry(topic.to_string()).or_default().push((id, handler));
        log::debug!("[atlas-link] Registered handler {:?} on '{}'", id, topic);
        id
    }

    /// Remove one handler, or every handler on `topic` when `id` is `None`.
    ///
    /// Returns the number of handlers removed.
    pub fn off(&self, topic: &str, id: Option<HandlerId>) -> usize {
        let mut handlers = self.handlers.write();
        let removed = match (handlers.get_mut(topic), id) {
            (None, _) => 0,
            (Some(list), Some(id)) => {
                let before = list.len();
                list.retain(|(hid, _)| *hid != id);
                before - list.len()
            },
            (Some(list), None) => {
                let n = list.len();
                list.clear();
                n
            },
        };
        if handlers.get(topic).is_some_and(|list| list.is_empty()) {
            handlers.remove(topic);
        }
        removed
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one handler.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Dispatch a payload on `topic`.
    pub(crate) fn dispatch(&self, topic: &str, payload: JsonValue) -> DispatchReport {
        self.dispatch_envelope(&EventEnvelope::new(topic, payload))
    }

    /// Invoke every handler registered on the envelope's topic.
    ///
    /// Iterates a snapshot taken before the first handler runs, so handlers
    /// may register or unregister (themselves included) without affecting
    /// this dispatch.
    pub(crate) fn dispatch_envelope(&self, envelope: &EventEnvelope) -> DispatchReport {
        let snapshot: Vec<(HandlerId, EventHandler)> = match self.handlers.read().get(&envelope.topic) {
            Some(list) => list.clone(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(envelope)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(panic) => Some(panic_message(&panic)),
            };
            match failure {
                None => report.delivered += 1,
                Some(message) => {
                    report.failed += 1;
                    let err = AtlasLinkError::HandlerError {
                        topic: envelope.topic.clone(),
                        message,
                    };
                    log::error!("[atlas-link] Handler {:?} failed: {}", id, err);
                },
            }
        }
        report
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Handle returned by [`EventRouter::on`].
#[derive(Debug)]
pub struct HandlerRegistration {
    router: Weak<EventRouter>,
    topic: String,
    id: HandlerId,
}

impl HandlerRegistration {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the handler. Returns `false` if it was already removed or the
    /// router is gone.
    pub fn unsubscribe(self) -> bool {
        match self.router.upgrade() {
            Some(router) => router.off(&self.topic, Some(self.id)) > 0,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| -> EventHandler {
            let log = log_clone.clone();
            let name = name.to_string();
            Arc::new(move |_event: &EventEnvelope| {
                log.lock().push(name.clone());
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_fire_once_in_registration_order() {
        let router = Arc::new(EventRouter::new());
        let (log, make) = recorder();
        router.add("data-update", make("first"));
        router.add("data-update", make("second"));

        let report = router.dispatch("data-update", json!({}));

        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
    }

    #[test]
    fn test_failing_handler_does_not_suppress_next() {
        let router = Arc::new(EventRouter::new());
        let (log, make) = recorder();
        router.on("data-update", |_| Err(anyhow::anyhow!("boom")));
        router.add("data-update", make("after-error"));
        router.on("data-update", |_| panic!("handler panic"));
        router.add("data-update", make("after-panic"));

        let report = router.dispatch("data-update", json!({"x": 1}));

        assert_eq!(*log.lock(), vec!["after-error", "after-panic"]);
        assert_eq!(report, DispatchReport { delivered: 2, failed: 2 });
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch_keeps_iteration_intact() {
        let router = Arc::new(EventRouter::new());
        let (log, make) = recorder();

        let slot: Arc<Mutex<Option<HandlerRegistration>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let log_clone = log.clone();
        let registration = router.on("t", move |_| {
            log_clone.lock().push("once".to_string());
            if let Some(reg) = slot_clone.lock().take() {
                reg.unsubscribe();
            }
            Ok(())
        });
        *slot.lock() = Some(registration);
        router.add("t", make("stable"));

        router.dispatch("t", json!(null));
        router.dispatch("t", json!(null));

        assert_eq!(*log.lock(), vec!["once", "stable", "stable"]);
        assert_eq!(router.handler_count("t"), 1);
    }

    #[test]
    fn test_handler_removing_later_handler_still_sees_snapshot() {
        let router = Arc::new(EventRouter::new());
        let (log, make) = recorder();
        let router_clone = Arc::downgrade(&router);
        router.on("t", move |_| {
            if let Some(r) = router_clone.upgrade() {
                r.off("t", None);
            }
            Ok(())
        });
        router.add("t", make("victim"));

        let report = router.dispatch("t", json!(null));
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.lock(), vec!["victim"]);

        assert_eq!(router.dispatch("t", json!(null)), DispatchReport::default());
    }

    #[test]
    fn test_off_single_and_all() {
        let router = Arc::new(EventRouter::new());
        let (log, make) = recorder();
        let a = router.add("t", make("a"));
        router.add("t", make("b"));
        router.add("other", make("c"));

        assert_eq!(router.off("t", Some(a)), 1);
        assert_eq!(router.off("t", Some(a)), 0);
        router.dispatch("t", json!(null));
        assert_eq!(*log.lock(), vec!["b"]);

        assert_eq!(router.off("t", None), 1);
        assert_eq!(router.handler_count("t"), 0);
        assert_eq!(router.topics(), vec!["other".to_string()]);
    }

    #[test]
    fn test_registration_unsubscribe_after_router_dropped() {
        let router = Arc::new(EventRouter::new());
        let reg = router.on("t", |_| Ok(()));
        assert_eq!(reg.topic(), "t");
        drop(router);
        assert!(!reg.unsubscribe());
    }

    #[test]
    fn test_dispatch_without_handlers_is_noop() {
        let router = EventRouter::new();
        assert_eq!(router.dispatch("nobody", json!(1)), DispatchReport::default());
    }
}
