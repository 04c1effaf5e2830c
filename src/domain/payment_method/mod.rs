//! Stored payment methods and the single-default invariant.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, PaymentMethodId, Timestamp};

/// Card display metadata returned by providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub brand: String,
    pub last4: String,
    pub exp_month: Option<u8>,
    pub exp_year: Option<u16>,
}

/// A payment method stored for a customer.
///
/// Invariant: for a given customer, at most one payment method has
/// `is_default = true` at any time. The repository enforces the atomic
/// clear-and-set; deleting the default never auto-promotes another method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub customer_id: CustomerId,
    pub provider: String,
    pub provider_payment_method_id: String,
    pub method_type: String,
    pub card: Option<CardSummary>,
    pub is_default: bool,
    /// Mandate or reference id when the vendor set one up (e.g. SEPA/UPI).
    pub mandate_id: Option<String>,
    pub created_at: Timestamp,
}

impl PaymentMethod {
    /// Creates a new stored payment method, not default by construction.
    pub fn new(
        customer_id: CustomerId,
        provider: impl Into<String>,
        provider_payment_method_id: impl Into<String>,
        method_type: impl Into<String>,
    ) -> Self {
        Self {
            id: PaymentMethodId::new(),
            customer_id,
            provider: provider.into(),
            provider_payment_method_id: provider_payment_method_id.into(),
            method_type: method_type.into(),
            card: None,
            is_default: false,
            mandate_id: None,
            created_at: Timestamp::now(),
        }
    }

    /// Attaches card display metadata.
    pub fn with_card(mut self, card: CardSummary) -> Self {
        self.card = Some(card);
        self
    }

    /// Attaches a vendor mandate/reference id.
    pub fn with_mandate(mut self, mandate_id: impl Into<String>) -> Self {
        self.mandate_id = Some(mandate_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_payment_method_is_not_default() {
        let pm = PaymentMethod::new(CustomerId::new(), "stripe", "pm_a", "card");
        assert!(!pm.is_default);
        assert!(pm.card.is_none());
        assert!(pm.mandate_id.is_none());
    }

    #[test]
    fn builder_attaches_card_and_mandate() {
        let pm = PaymentMethod::new(CustomerId::new(), "stripe", "pm_a", "card")
            .with_card(CardSummary {
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                exp_month: Some(12),
                exp_year: Some(2030),
            })
            .with_mandate("mandate_test_abc");

        assert_eq!(pm.card.as_ref().unwrap().last4, "4242");
        assert_eq!(pm.mandate_id.as_deref(), Some("mandate_test_abc"));
    }
}
