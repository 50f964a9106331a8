//! Worker-to-panel log routing.
//!
//! A control panel runs the pipeline on a background worker and mirrors its
//! log output in a visible panel. The transport is a bounded queue drained on
//! a fixed schedule; when the panel falls behind, the oldest entries are
//! dropped rather than blocking the worker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One leveled, timestamped log line destined for the panel.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Bounded queue between the pipeline worker and a presentation layer.
#[derive(Clone)]
pub struct EventBus {
    queue: Arc<Mutex<VecDeque<LogEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    /// Enqueue an event, evicting the oldest entry at capacity.
    pub fn push(&self, event: LogEvent) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Take everything currently queued. Called by the panel on its timer.
    pub fn drain(&self) -> Vec<LogEvent> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

/// Tracing layer mirroring events into an [`EventBus`].
pub struct EventBusLayer {
    bus: EventBus,
}

impl EventBusLayer {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl<S> Layer<S> for EventBusLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.bus.push(LogEvent {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> LogEvent {
        LogEvent {
            timestamp: Utc::now(),
            level: "INFO".to_string(),
            target: "test".to_string(),
            message: format!("event {n}"),
        }
    }

    #[test]
    fn drain_empties_the_queue_in_order() {
        let bus = EventBus::new(8);
        bus.push(event(1));
        bus.push(event(2));

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "event 1");
        assert_eq!(drained[1].message, "event 2");
        assert!(bus.is_empty());
    }

    #[test]
    fn capacity_overflow_drops_oldest_without_blocking() {
        let bus = EventBus::new(3);
        for n in 1..=5 {
            bus.push(event(n));
        }
        assert_eq!(bus.len(), 3);
        let drained = bus.drain();
        assert_eq!(drained[0].message, "event 3");
        assert_eq!(drained[2].message, "event 5");
    }

    #[test]
    fn layer_mirrors_tracing_events() {
        use tracing_subscriber::prelude::*;

        let bus = EventBus::new(16);
        let subscriber = tracing_subscriber::registry().with(EventBusLayer::new(bus.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("worker started");
            tracing::warn!("something odd");
        });

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "worker started");
        assert_eq!(drained[0].level, "INFO");
        assert_eq!(drained[1].level, "WARN");
    }
}
