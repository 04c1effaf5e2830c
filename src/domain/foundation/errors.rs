//! Error taxonomy for the payment domain.
//!
//! Every error exposes a stable `code()` for machine consumption and a human
//! readable message. Provider errors additionally carry the provider name and
//! the raw vendor message for diagnostics; they are never leaked raw.

use thiserror::Error;

/// Domain error taxonomy for payment orchestration.
///
/// Retry policy is encoded per variant: configuration, validation and
/// authentication failures are never retried; provider transport failures
/// may be retried by the caller with backoff (this engine does not retry
/// internally).
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// Missing or invalid credentials/settings. Fatal at startup.
    #[error("{message}")]
    Configuration { message: String },

    /// Malformed caller input. Surfaced immediately, never retried.
    #[error("{message}")]
    Validation { message: String },

    /// Unknown customer, payment method, or provider link.
    #[error("{resource} not found")]
    ResourceNotFound { resource: String },

    /// Vendor rejected our credentials. Retrying will not fix this.
    #[error("{message}")]
    Authentication { message: String },

    /// Webhook signature or verification failure. The delivery is dropped.
    #[error("{message}")]
    Webhook { message: String },

    /// Vendor transport or logic failure, wrapped with provider context.
    #[error("{provider}: {message}")]
    Provider {
        provider: String,
        message: String,
        /// Raw vendor error text, when the vendor supplied one.
        vendor_error: Option<String>,
        retryable: bool,
    },

    /// Not a failure: the payment needs a step-up action from the payer.
    #[error("{message}")]
    RequiresAction {
        message: String,
        action_url: Option<String>,
        action_type: String,
    },

    /// Operation attempted without required state (e.g. no persistence
    /// session attached to the orchestrator).
    #[error("{message}")]
    State { message: String },
}

impl PaymentError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        PaymentError::Configuration {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-found error for the named resource.
    pub fn not_found(resource: impl Into<String>) -> Self {
        PaymentError::ResourceNotFound {
            resource: resource.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        PaymentError::Authentication {
            message: message.into(),
        }
    }

    /// Creates a webhook verification error.
    pub fn webhook(message: impl Into<String>) -> Self {
        PaymentError::Webhook {
            message: message.into(),
        }
    }

    /// Creates a non-retryable provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            provider: provider.into(),
            message: message.into(),
            vendor_error: None,
            retryable: false,
        }
    }

    /// Creates a retryable provider error (transport failure, timeout).
    pub fn provider_transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            provider: provider.into(),
            message: message.into(),
            vendor_error: None,
            retryable: true,
        }
    }

    /// Attaches the raw vendor error text.
    pub fn with_vendor_error(mut self, vendor: impl Into<String>) -> Self {
        if let PaymentError::Provider { vendor_error, .. } = &mut self {
            *vendor_error = Some(vendor.into());
        }
        self
    }

    /// Creates a step-up required condition.
    pub fn requires_action(
        message: impl Into<String>,
        action_url: Option<String>,
        action_type: impl Into<String>,
    ) -> Self {
        PaymentError::RequiresAction {
            message: message.into(),
            action_url,
            action_type: action_type.into(),
        }
    }

    /// Creates a state error.
    pub fn state(message: impl Into<String>) -> Self {
        PaymentError::State {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Configuration { .. } => "configuration_error",
            PaymentError::Validation { .. } => "validation_error",
            PaymentError::ResourceNotFound { .. } => "resource_not_found",
            PaymentError::Authentication { .. } => "authentication_error",
            PaymentError::Webhook { .. } => "webhook_error",
            PaymentError::Provider { .. } => "provider_error",
            PaymentError::RequiresAction { .. } => "payment_requires_action",
            PaymentError::State { .. } => "state_error",
        }
    }

    /// Whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Provider { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PaymentError::configuration("x").code(), "configuration_error");
        assert_eq!(PaymentError::validation("x").code(), "validation_error");
        assert_eq!(PaymentError::not_found("Customer").code(), "resource_not_found");
        assert_eq!(PaymentError::authentication("x").code(), "authentication_error");
        assert_eq!(PaymentError::webhook("x").code(), "webhook_error");
        assert_eq!(PaymentError::provider("stripe", "x").code(), "provider_error");
        assert_eq!(
            PaymentError::requires_action("x", None, "3ds_authentication").code(),
            "payment_requires_action"
        );
        assert_eq!(PaymentError::state("x").code(), "state_error");
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = PaymentError::not_found("Customer");
        assert_eq!(err.to_string(), "Customer not found");
    }

    #[test]
    fn provider_error_carries_vendor_context() {
        let err = PaymentError::provider("stripe", "Provider API error")
            .with_vendor_error("Invalid API key provided");

        match &err {
            PaymentError::Provider {
                provider,
                vendor_error,
                retryable,
                ..
            } => {
                assert_eq!(provider, "stripe");
                assert_eq!(vendor_error.as_deref(), Some("Invalid API key provided"));
                assert!(!retryable);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert!(err.to_string().contains("stripe"));
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(PaymentError::provider_transport("adyen", "timeout").is_retryable());
        assert!(!PaymentError::provider("adyen", "refused").is_retryable());
        assert!(!PaymentError::validation("bad input").is_retryable());
    }

    #[test]
    fn requires_action_carries_step_up_payload() {
        let err = PaymentError::requires_action(
            "Payment requires authentication",
            Some("https://example.com/authenticate".to_string()),
            "3ds_authentication",
        );

        match err {
            PaymentError::RequiresAction {
                action_url,
                action_type,
                ..
            } => {
                assert_eq!(
                    action_url.as_deref(),
                    Some("https://example.com/authenticate")
                );
                assert_eq!(action_type, "3ds_authentication");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
