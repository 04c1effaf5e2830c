//! Payment method lifecycle.
//!
//! Creation filters caller-supplied details through an allow-list before any
//! vendor call: unknown fields fail closed with a validation error. The
//! single-default invariant itself lives in the repository; this service
//! sequences the vendor call, persistence, and default promotion.

use std::sync::Arc;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::foundation::{CustomerId, PaymentError, PaymentMethodId};
use crate::domain::payment_method::PaymentMethod;
use crate::ports::{CustomerRepository, PaymentMethodDetails, PaymentMethodRepository};

/// Manages stored payment methods for registered customers.
pub struct PaymentMethodLifecycle {
    registry: Arc<ProviderRegistry>,
    customers: Arc<dyn CustomerRepository>,
    methods: Arc<dyn PaymentMethodRepository>,
}

impl PaymentMethodLifecycle {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        customers: Arc<dyn CustomerRepository>,
        methods: Arc<dyn PaymentMethodRepository>,
    ) -> Self {
        Self {
            registry,
            customers,
            methods,
        }
    }

    /// Creates a payment method with the vendor and stores it.
    ///
    /// `details` is raw caller input; anything outside the recognized fields
    /// (`type`, `card`, `token`, `payment_method_id`, `set_default`,
    /// `billing_details`) is rejected before the vendor sees it. The customer
    /// must already hold a registration with the provider.
    pub async fn add(
        &self,
        customer_id: CustomerId,
        provider: &str,
        details: serde_json::Value,
    ) -> Result<PaymentMethod, PaymentError> {
        let details = PaymentMethodDetails::from_value(details)?;
        let set_default = details.set_default;

        self.customers
            .get(customer_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;
        let link = self
            .customers
            .get_provider_link(customer_id, provider)
            .await?
            .ok_or_else(|| {
                PaymentError::validation(format!(
                    "customer is not registered with provider '{provider}'"
                ))
            })?;

        let adapter = self.registry.get(provider)?;
        let vendor_method = adapter
            .create_payment_method(&link.provider_customer_id, details)
            .await?;

        let mut stored = PaymentMethod::new(
            customer_id,
            provider,
            vendor_method.payment_method_id,
            vendor_method.method_type,
        );
        if let Some(card) = vendor_method.card {
            stored = stored.with_card(card);
        }
        if let Some(mandate_id) = vendor_method.mandate_id {
            stored = stored.with_mandate(mandate_id);
        }
        self.methods.create(&stored).await?;

        tracing::info!(
            provider,
            customer_id = %customer_id,
            payment_method_id = %stored.id,
            set_default,
            "Stored payment method"
        );

        if set_default {
            return self.methods.set_default(customer_id, stored.id).await;
        }
        Ok(stored)
    }

    /// Promotes one stored method to the customer's default.
    pub async fn set_default(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError> {
        let method = self.methods.set_default(customer_id, id).await?;
        tracing::info!(customer_id = %customer_id, payment_method_id = %id, "Set default payment method");
        Ok(method)
    }

    /// Deletes a stored method. Deleting the default leaves the customer with
    /// no default.
    pub async fn remove(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<(), PaymentError> {
        self.methods.delete(customer_id, id).await?;
        tracing::info!(customer_id = %customer_id, payment_method_id = %id, "Deleted payment method");
        Ok(())
    }

    /// Lists stored methods, optionally scoped to one provider. Scoping to a
    /// provider the customer never registered with is a validation error.
    pub async fn list(
        &self,
        customer_id: CustomerId,
        provider: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        self.customers
            .get(customer_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        if let Some(provider) = provider {
            let link = self
                .customers
                .get_provider_link(customer_id, provider)
                .await?;
            if link.is_none() {
                return Err(PaymentError::validation(format!(
                    "customer is not registered with provider '{provider}'"
                )));
            }
        }

        self.methods.list_for_customer(customer_id, provider).await
    }
}
