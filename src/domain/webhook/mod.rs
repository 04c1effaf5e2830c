//! Canonical webhook events.
//!
//! Every provider adapter verifies a vendor delivery and maps it into one
//! `CanonicalEvent`, so downstream processing never sees vendor taxonomies.
//! Events are never mutated after creation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Provider-agnostic classification of a webhook notification.
///
/// Vendor event types with no mapping become `Unhandled` rather than an
/// error: unknown deliveries are recorded and acknowledged, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEventType {
    PaymentSucceeded,
    PaymentFailed,
    PaymentPending,
    PaymentAuthorized,
    PaymentRequiresAction,
    PaymentRefunded,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    InvoicePaid,
    Unhandled,
}

impl CanonicalEventType {
    /// Dotted event name used for publishing and routing keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEventType::PaymentSucceeded => "payment.succeeded",
            CanonicalEventType::PaymentFailed => "payment.failed",
            CanonicalEventType::PaymentPending => "payment.pending",
            CanonicalEventType::PaymentAuthorized => "payment.authorized",
            CanonicalEventType::PaymentRequiresAction => "payment.requires_action",
            CanonicalEventType::PaymentRefunded => "payment.refunded",
            CanonicalEventType::SubscriptionCreated => "subscription.created",
            CanonicalEventType::SubscriptionUpdated => "subscription.updated",
            CanonicalEventType::SubscriptionCanceled => "subscription.canceled",
            CanonicalEventType::InvoicePaid => "invoice.paid",
            CanonicalEventType::Unhandled => "webhook.unhandled",
        }
    }
}

impl std::fmt::Display for CanonicalEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized webhook event produced after signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_type: CanonicalEventType,
    pub provider: String,
    /// Vendor's own event-type string, kept for audit.
    pub vendor_event_type: String,
    /// Vendor's event id when the payload carries one.
    pub vendor_event_id: Option<String>,
    /// Derived fields (payment id, amounts, status) extracted by the adapter.
    pub data: serde_json::Value,
    /// Original payload, untouched, for audit.
    pub raw_payload: serde_json::Value,
}

impl CanonicalEvent {
    pub fn new(
        event_type: CanonicalEventType,
        provider: impl Into<String>,
        vendor_event_type: impl Into<String>,
        vendor_event_id: Option<String>,
        data: serde_json::Value,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            provider: provider.into(),
            vendor_event_type: vendor_event_type.into(),
            vendor_event_id,
            data,
            raw_payload,
        }
    }

    /// Deduplication key: provider plus vendor event id, falling back to a
    /// payload digest for vendors that do not send event ids.
    pub fn dedupe_key(&self) -> String {
        match &self.vendor_event_id {
            Some(id) => format!("{}:{}", self.provider, id),
            None => {
                let payload = self.raw_payload.to_string();
                let digest = Sha256::digest(payload.as_bytes());
                format!("{}:{}", self.provider, hex::encode(digest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_names_are_dotted() {
        assert_eq!(CanonicalEventType::PaymentSucceeded.as_str(), "payment.succeeded");
        assert_eq!(
            CanonicalEventType::PaymentRequiresAction.as_str(),
            "payment.requires_action"
        );
        assert_eq!(CanonicalEventType::Unhandled.as_str(), "webhook.unhandled");
    }

    #[test]
    fn dedupe_key_uses_vendor_event_id() {
        let event = CanonicalEvent::new(
            CanonicalEventType::PaymentSucceeded,
            "paypal",
            "PAYMENT.CAPTURE.COMPLETED",
            Some("WH-1234".to_string()),
            json!({}),
            json!({"id": "WH-1234"}),
        );
        assert_eq!(event.dedupe_key(), "paypal:WH-1234");
    }

    #[test]
    fn dedupe_key_falls_back_to_payload_digest() {
        let a = CanonicalEvent::new(
            CanonicalEventType::PaymentSucceeded,
            "payu",
            "success",
            None,
            json!({}),
            json!({"txnid": "abc", "status": "success"}),
        );
        let b = CanonicalEvent::new(
            CanonicalEventType::PaymentSucceeded,
            "payu",
            "success",
            None,
            json!({}),
            json!({"txnid": "abc", "status": "success"}),
        );
        let c = CanonicalEvent::new(
            CanonicalEventType::PaymentSucceeded,
            "payu",
            "success",
            None,
            json!({}),
            json!({"txnid": "other", "status": "success"}),
        );

        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_ne!(a.dedupe_key(), c.dedupe_key());
        assert!(a.dedupe_key().starts_with("payu:"));
    }
}
