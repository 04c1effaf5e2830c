//! Recording event publisher.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::PaymentError;
use crate::ports::EventPublisher;

/// A published event captured for assertions.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub routing_key: Option<String>,
}

/// `EventPublisher` that records events in memory.
///
/// Doubles as the default publisher for deployments without a broker; every
/// publish is also traced.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far.
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events of one type, in publish order.
    pub fn events_of_type(&self, event_type: &str) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish_event(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        routing_key: Option<&str>,
    ) -> Result<(), PaymentError> {
        tracing::debug!(event_type, routing_key, "Publishing event");
        self.events.lock().unwrap().push(PublishedEvent {
            event_type: event_type.to_string(),
            payload,
            routing_key: routing_key.map(str::to_string),
        });
        Ok(())
    }
}
