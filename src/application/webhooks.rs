//! Webhook processing pipeline.
//!
//! Verify, normalize, deduplicate, publish. Verification and normalization
//! are adapter concerns; this service owns the at-most-once side effect:
//! a replayed delivery is acknowledged without a second publish.

use std::sync::Arc;

use serde_json::json;

use crate::domain::foundation::PaymentError;
use crate::domain::webhook::CanonicalEvent;
use crate::ports::{EventPublisher, ProcessedEventStore, ProviderAdapter};

/// Result of handling one webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub event: CanonicalEvent,
    /// True when this delivery was a replay; nothing was published.
    pub duplicate: bool,
}

/// Drives webhook deliveries from raw bytes to published canonical events.
pub struct WebhookProcessor {
    publisher: Arc<dyn EventPublisher>,
    processed: Arc<dyn ProcessedEventStore>,
}

impl WebhookProcessor {
    pub fn new(publisher: Arc<dyn EventPublisher>, processed: Arc<dyn ProcessedEventStore>) -> Self {
        Self {
            publisher,
            processed,
        }
    }

    /// Handles one delivery for the given provider adapter.
    ///
    /// A verification failure surfaces as a `Webhook` error and leaves no
    /// trace in the dedupe store, so a later correctly-signed delivery of the
    /// same event still goes through.
    pub async fn process(
        &self,
        adapter: &dyn ProviderAdapter,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let event = adapter.parse_webhook(payload, signature)?;
        let dedupe_key = event.dedupe_key();

        let first_delivery = self.processed.check_and_record(&dedupe_key).await?;
        if !first_delivery {
            tracing::info!(
                provider = %event.provider,
                dedupe_key = %dedupe_key,
                "Ignoring replayed webhook delivery"
            );
            return Ok(WebhookOutcome {
                event,
                duplicate: true,
            });
        }

        let payload = json!({
            "provider": event.provider,
            "vendor_event_type": event.vendor_event_type,
            "vendor_event_id": event.vendor_event_id,
            "data": event.data,
        });
        self.publisher
            .publish_event(
                event.event_type.as_str(),
                payload,
                Some(event.event_type.as_str()),
            )
            .await?;

        tracing::info!(
            provider = %event.provider,
            event_type = %event.event_type,
            dedupe_key = %dedupe_key,
            "Published webhook event"
        );
        Ok(WebhookOutcome {
            event,
            duplicate: false,
        })
    }
}
