//! Event bus
//!
//! Fans one event out to several subscribers. Delivery to a single
//! subscriber is serialized by that subscriber's own lock, so a slow
//! subscriber never blocks the others.

use parking_lot::Mutex;
use std::sync::Arc;

use super::{Event, EventContext, EventHandler};

struct Subscriber {
    name: String,
    gate: Mutex<()>,
    handler: EventHandler,
}

/// Multi-subscriber broadcast
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, name: impl Into<String>, handler: EventHandler) -> Self {
        self.subscribers.push(Subscriber {
            name: name.into(),
            gate: Mutex::new(()),
            handler,
        });
        self
    }

    pub fn deliver(&self, event: &Event, context: &EventContext<'_>) {
        for subscriber in &self.subscribers {
            let _gate = subscriber.gate.lock();
            (subscriber.handler)(event, context);
        }
    }

    pub fn subscriber_names(&self) -> Vec<&str> {
        self.subscribers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Compose the bus into the single handler a configuration carries
    pub fn into_handler(self) -> EventHandler {
        let bus = Arc::new(self);
        Arc::new(move |event, context| bus.deliver(event, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::Collector;
    use crate::events::{handler, EventKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_subscriber_receives_events() {
        let first = Collector::default();
        let second = Collector::default();
        let bus = EventBus::new()
            .subscribe("first", first.handler())
            .subscribe("second", second.handler());
        assert_eq!(bus.subscriber_names(), vec!["first", "second"]);

        let handler = bus.into_handler();
        handler(&Event::global(EventKind::RunStarted), &EventContext::default());
        handler(&Event::global(EventKind::RunEnded), &EventContext::default());

        assert_eq!(first.names(), vec!["runStarted", "runEnded"]);
        assert_eq!(second.names(), first.names());
    }

    #[test]
    fn test_delivery_is_serialized_per_subscriber() {
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (i, o) = (inside.clone(), overlaps.clone());
        let handler = EventBus::new()
            .subscribe(
                "slow",
                handler(move |_, _| {
                    if i.fetch_add(1, Ordering::SeqCst) > 0 {
                        o.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    i.fetch_sub(1, Ordering::SeqCst);
                }),
            )
            .into_handler();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        handler(
                            &Event::global(EventKind::MessageLogged("x".into())),
                            &EventContext::default(),
                        );
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
