//! EventPublisher port.

use async_trait::async_trait;

use crate::domain::foundation::PaymentError;

/// Port for emitting domain events to interested consumers.
///
/// Publishing is fire-and-forget from the caller's point of view: a failed
/// publish is logged by the implementation and must not fail the operation
/// that produced the event.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event under the given dotted type name.
    ///
    /// `routing_key` lets callers override the default routing derived from
    /// the event type.
    async fn publish_event(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        routing_key: Option<&str>,
    ) -> Result<(), PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventPublisher) {}
}
