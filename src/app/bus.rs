// LogMedic - app/bus.rs
//
// Event bus: topic-keyed publish/subscribe with synchronous dispatch.
//
// Components publish events, consumers (the healer, the CLI printer)
// subscribe. Handlers run on the publisher's thread, in registration order,
// before `publish` returns. A panicking handler is caught and logged so it
// cannot take down the publisher or starve the handlers after it.
//
// Locking: subscriptions live behind an `RwLock`. `publish` clones the
// handler list under the read lock and releases it before dispatch, so a
// handler may subscribe or publish without deadlocking.

use crate::core::model::{Event, Topic};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Central event bus shared by watcher, healer and outer consumers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<Topic, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        debug!("EventBus::new: creating event bus");
        Self::default()
    }

    /// Register `handler` for every future event on `topic`.
    ///
    /// Handlers are never removed; registering the same closure twice means
    /// it runs twice per event.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = topic.into();
        debug!(topic = %topic, "EventBus::subscribe: new subscriber");
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        handlers.entry(topic).or_default().push(Arc::new(handler));
    }

    /// Deliver `event` to every handler registered for its topic.
    ///
    /// No handlers is a no-op.
    pub fn publish(&self, event: Event) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
            match handlers.get(&event.topic) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        debug!(
            topic = %event.topic,
            handlers = snapshot.len(),
            "EventBus::publish"
        );

        for (index, handler) in snapshot.iter().enumerate() {
            // Needs panic = "unwind", the default kept by every profile.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if let Err(panic) = outcome {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(
                    topic = %event.topic,
                    handler = index,
                    panic = %message,
                    "EventBus: handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    /// Number of handlers registered for `topic`.
    pub fn subscriber_count(&self, topic: impl Into<Topic>) -> usize {
        let topic = topic.into();
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        handlers.get(&topic).map_or(0, Vec::len)
    }
}

/// Create a new event bus wrapped in Arc for sharing
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Payload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn custom(topic: &str, n: i64) -> Event {
        Event::custom(topic, serde_json::json!(n))
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(Event::issue_resolved("x"));
        assert_eq!(bus.subscriber_count(Topic::IssueResolved), 0);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe("Ping", move |_| seen.lock().unwrap().push(tag));
        }
        bus.publish(custom("Ping", 1));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_topic_is_delivered() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(Topic::IssueResolved, move |event| {
            assert!(matches!(event.payload, Payload::IssueId(ref id) if id == "a"));
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(custom("Other", 1));
        bus.publish(Event::issue_resolved("a"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe("Boom", |_| panic!("handler failure"));
        let c = Arc::clone(&count);
        bus.subscribe("Boom", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(custom("Boom", 1));
        bus.publish(custom("Boom", 2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_subscribe_and_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::clone(&bus);
        let c = Arc::clone(&count);
        bus.subscribe("Outer", move |_| {
            let c = Arc::clone(&c);
            inner_bus.subscribe("Inner", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
            inner_bus.publish(custom("Inner", 0));
        });

        bus.publish(custom("Outer", 0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("Inner"), 1);
    }

    #[test]
    fn test_subscription_made_during_dispatch_misses_current_event() {
        let bus = Arc::new(EventBus::new());
        let late = Arc::new(AtomicUsize::new(0));
        let inner_bus = Arc::clone(&bus);
        let l = Arc::clone(&late);
        bus.subscribe("Tick", move |_| {
            let l = Arc::clone(&l);
            inner_bus.subscribe("Tick", move |_| {
                l.fetch_add(1, Ordering::SeqCst);
            });
        });
        bus.publish(custom("Tick", 0));
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("Tick"), 2);
    }

    #[test]
    fn test_concurrent_publishers() {
        let bus = create_event_bus();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe("Hit", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        bus.publish(custom("Hit", i));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 400);
    }
}
