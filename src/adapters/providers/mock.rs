//! Mock provider adapter for testing.
//!
//! Provides a configurable in-memory implementation of `ProviderAdapter` for
//! unit and integration tests. Supports:
//! - Deterministic test card instruments (decline, step-up)
//! - Error injection
//! - Call tracking
//! - Webhook simulation without signatures

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::{PaymentError, Timestamp};
use crate::domain::payment_method::CardSummary;
use crate::domain::webhook::{CanonicalEvent, CanonicalEventType};
use crate::ports::{
    ChargeOutcome, ChargeRequest, ChargeStatus, CustomerUpdate, NewCustomer, NewPrice,
    NewSubscription, NextAction, PaymentMethodDetails, ProviderAdapter, ProviderCustomer,
    ProviderPaymentMethod, ProviderPrice, ProviderProduct, ProviderSubscription, RefundOutcome,
};

/// Card number that always declines.
pub const DECLINE_CARD: &str = "4000000000000002";

/// Card number that always requires a step-up action.
pub const STEP_UP_CARD: &str = "4000000000003220";

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How the mock treats webhook deliveries.
#[derive(Default, Clone)]
pub enum MockBehavior {
    /// Accept any payload and canonicalize it from its JSON fields.
    #[default]
    AcceptAll,

    /// Always fail verification.
    RejectWebhooks,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, ProviderCustomer>,
    /// Stored payment methods with the card number behind each, so charges
    /// can resolve test instruments.
    payment_methods: HashMap<String, (ProviderPaymentMethod, String)>,
    subscriptions: HashMap<String, ProviderSubscription>,
    next_error: Option<PaymentError>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<RecordedCall>,
    behavior: MockBehavior,
    counter: u64,
}

/// Mock provider adapter for testing.
pub struct MockProviderAdapter {
    name: String,
    inner: Arc<Mutex<MockState>>,
}

impl MockProviderAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock that fails all webhook verifications.
    pub fn rejecting_webhooks(name: impl Into<String>) -> Self {
        let mock = Self::new(name);
        mock.inner.lock().unwrap().behavior = MockBehavior::RejectWebhooks;
        mock
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.next_error = None;
        state.method_errors.clear();
    }

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .any(|call| call.method == method)
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().call_log.clear();
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.inner.lock().unwrap().call_log.push(RecordedCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.inner.lock().unwrap();
        state.counter += 1;
        format!("{}_{}_{}", prefix, self.name, state.counter)
    }

    /// Resolves well-known vendor tokens to card numbers.
    fn resolve_token(token: &str) -> Option<&'static str> {
        match token {
            "tok_visa" | "pm_card_visa" => Some("4242424242424242"),
            "tok_mastercard" => Some("5555555555554444"),
            "tok_chargeDeclined" => Some(DECLINE_CARD),
            "tok_threeDSecure" => Some(STEP_UP_CARD),
            _ => None,
        }
    }

    fn brand_for(number: &str) -> &'static str {
        match number.chars().next() {
            Some('4') => "visa",
            Some('5') => "mastercard",
            _ => "unknown",
        }
    }
}

impl Clone for MockProviderAdapter {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_customer(
        &self,
        customer: NewCustomer,
    ) -> Result<ProviderCustomer, PaymentError> {
        self.record_call("create_customer", vec![customer.email.clone()]);
        self.check_error("create_customer")?;

        let provider_customer = ProviderCustomer {
            provider_customer_id: self.next_id("cus_mock"),
            email: customer.email,
            name: customer.name,
            created_at: Timestamp::now(),
            metadata: customer.metadata,
        };

        self.inner.lock().unwrap().customers.insert(
            provider_customer.provider_customer_id.clone(),
            provider_customer.clone(),
        );
        Ok(provider_customer)
    }

    async fn retrieve_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<ProviderCustomer, PaymentError> {
        self.record_call("retrieve_customer", vec![provider_customer_id.to_string()]);
        self.check_error("retrieve_customer")?;

        self.inner
            .lock()
            .unwrap()
            .customers
            .get(provider_customer_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found("Customer"))
    }

    async fn update_customer(
        &self,
        provider_customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<ProviderCustomer, PaymentError> {
        self.record_call("update_customer", vec![provider_customer_id.to_string()]);
        self.check_error("update_customer")?;

        let mut state = self.inner.lock().unwrap();
        let customer = state
            .customers
            .get_mut(provider_customer_id)
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        if let Some(email) = update.email {
            customer.email = email;
        }
        if let Some(name) = update.name {
            customer.name = Some(name);
        }
        if let Some(metadata) = update.metadata {
            customer.metadata.extend(metadata);
        }
        Ok(customer.clone())
    }

    async fn create_payment_method(
        &self,
        provider_customer_id: &str,
        details: PaymentMethodDetails,
    ) -> Result<ProviderPaymentMethod, PaymentError> {
        self.record_call(
            "create_payment_method",
            vec![provider_customer_id.to_string()],
        );
        self.check_error("create_payment_method")?;

        let number = if let Some(card) = &details.card {
            card.number.clone()
        } else if let Some(token) = &details.token {
            Self::resolve_token(token)
                .ok_or_else(|| PaymentError::validation(format!("unknown card token '{token}'")))?
                .to_string()
        } else {
            return Err(PaymentError::validation(
                "payment method requires card or token",
            ));
        };

        let (exp_month, exp_year) = details
            .card
            .as_ref()
            .map(|card| (card.exp_month, card.exp_year))
            .unwrap_or((12, 2030));

        let last4 = number[number.len().saturating_sub(4)..].to_string();
        let payment_method = ProviderPaymentMethod {
            payment_method_id: self.next_id("pm_mock"),
            method_type: "card".to_string(),
            card: Some(CardSummary {
                brand: Self::brand_for(&number).to_string(),
                last4,
                exp_month: Some(exp_month),
                exp_year: Some(exp_year),
            }),
            mandate_id: None,
        };

        self.inner.lock().unwrap().payment_methods.insert(
            payment_method.payment_method_id.clone(),
            (payment_method.clone(), number),
        );
        Ok(payment_method)
    }

    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError> {
        self.record_call("create_product", vec![name.to_string()]);
        self.check_error("create_product")?;

        Ok(ProviderProduct {
            provider_product_id: self.next_id("prod_mock"),
            name: name.to_string(),
            description: description.map(str::to_string),
            active: true,
        })
    }

    async fn create_price(&self, price: NewPrice) -> Result<ProviderPrice, PaymentError> {
        self.record_call("create_price", vec![price.product_id.clone()]);
        self.check_error("create_price")?;

        Ok(ProviderPrice {
            provider_price_id: self.next_id("price_mock"),
            product_id: price.product_id,
            amount: price.amount,
            currency: price.currency,
            interval: price.interval,
        })
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.record_call(
            "create_subscription",
            vec![
                subscription.provider_customer_id.clone(),
                subscription.price_id.clone(),
            ],
        );
        self.check_error("create_subscription")?;

        let now = Timestamp::now();
        let sub = ProviderSubscription {
            provider_subscription_id: self.next_id("sub_mock"),
            customer_id: subscription.provider_customer_id,
            price_id: Some(subscription.price_id),
            quantity: subscription.quantity,
            status: "active".to_string(),
            current_period_start: now.unix_seconds(),
            current_period_end: now.add_days(30).unix_seconds(),
            cancel_at_period_end: false,
        };

        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(sub.provider_subscription_id.clone(), sub.clone());
        Ok(sub)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.record_call(
            "cancel_subscription",
            vec![
                provider_subscription_id.to_string(),
                at_period_end.to_string(),
            ],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.inner.lock().unwrap();
        let sub = state
            .subscriptions
            .get_mut(provider_subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        sub.cancel_at_period_end = at_period_end;
        if !at_period_end {
            sub.status = "canceled".to_string();
        }
        Ok(sub.clone())
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        self.record_call(
            "process_payment",
            vec![
                format!("{:.2}", request.amount),
                request.currency.clone(),
                request.payment_method_id.clone().unwrap_or_default(),
            ],
        );
        self.check_error("process_payment")?;

        if request.amount <= 0.0 {
            return Err(PaymentError::validation("amount must be positive"));
        }

        let card_number = request
            .payment_method_id
            .as_ref()
            .and_then(|id| {
                let state = self.inner.lock().unwrap();
                state
                    .payment_methods
                    .get(id)
                    .map(|(_, number)| number.clone())
                    .or_else(|| Self::resolve_token(id).map(str::to_string))
            })
            .unwrap_or_else(|| "4242424242424242".to_string());

        let payment_id = self.next_id("pay_mock");

        match card_number.as_str() {
            DECLINE_CARD => Err(PaymentError::provider(&self.name, "Your card was declined")
                .with_vendor_error("card_declined")),
            STEP_UP_CARD => Ok(ChargeOutcome {
                provider_payment_id: payment_id.clone(),
                amount: request.amount,
                currency: request.currency,
                status: ChargeStatus::RequiresAction,
                action: Some(NextAction {
                    action_url: Some(format!("https://mock.test/3ds/{payment_id}")),
                    action_type: "3ds_authentication".to_string(),
                }),
                hosted_checkout: None,
            }),
            _ => Ok(ChargeOutcome {
                provider_payment_id: payment_id,
                amount: request.amount,
                currency: request.currency,
                status: ChargeStatus::Succeeded,
                action: None,
                hosted_checkout: None,
            }),
        }
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        self.record_call(
            "refund_payment",
            vec![
                provider_payment_id.to_string(),
                amount.map(|a| format!("{a:.2}")).unwrap_or_default(),
            ],
        );
        self.check_error("refund_payment")?;

        Ok(RefundOutcome {
            provider_refund_id: self.next_id("re_mock"),
            provider_payment_id: provider_payment_id.to_string(),
            amount,
            status: "succeeded".to_string(),
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError> {
        self.record_call(
            "parse_webhook",
            vec![String::from_utf8_lossy(payload).chars().take(50).collect()],
        );
        self.check_error("parse_webhook")?;

        if let MockBehavior::RejectWebhooks = self.inner.lock().unwrap().behavior {
            return Err(PaymentError::webhook("Verification disabled"));
        }

        let parsed: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::webhook(format!("Invalid JSON: {e}")))?;

        let vendor_event_type = parsed["type"].as_str().unwrap_or("unknown").to_string();
        let event_type = match vendor_event_type.as_str() {
            "payment.succeeded" => CanonicalEventType::PaymentSucceeded,
            "payment.failed" => CanonicalEventType::PaymentFailed,
            "payment.refunded" => CanonicalEventType::PaymentRefunded,
            "subscription.created" => CanonicalEventType::SubscriptionCreated,
            "subscription.canceled" => CanonicalEventType::SubscriptionCanceled,
            _ => CanonicalEventType::Unhandled,
        };

        let vendor_event_id = parsed["id"].as_str().map(str::to_string);
        let data = parsed.get("data").cloned().unwrap_or_default();

        Ok(CanonicalEvent::new(
            event_type,
            self.name.clone(),
            vendor_event_type,
            vendor_event_id,
            data,
            parsed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card_details(number: &str) -> PaymentMethodDetails {
        PaymentMethodDetails::from_value(json!({
            "type": "card",
            "card": {"number": number, "exp_month": 12, "exp_year": 2030, "cvc": "123"}
        }))
        .unwrap()
    }

    fn charge(payment_method_id: &str, amount: f64) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "USD".to_string(),
            provider_customer_id: None,
            payment_method_id: Some(payment_method_id.to_string()),
            description: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn customer_round_trip() {
        let mock = MockProviderAdapter::new("stripe");

        let created = mock
            .create_customer(NewCustomer {
                email: "test@example.com".to_string(),
                name: Some("Test".to_string()),
                metadata: Default::default(),
            })
            .await
            .unwrap();
        assert!(created.provider_customer_id.starts_with("cus_mock_stripe_"));

        let fetched = mock
            .retrieve_customer(&created.provider_customer_id)
            .await
            .unwrap();
        assert_eq!(fetched.email, "test@example.com");

        let missing = mock.retrieve_customer("cus_nonexistent").await;
        assert_eq!(missing.unwrap_err().code(), "resource_not_found");
    }

    #[tokio::test]
    async fn normal_card_charge_succeeds() {
        let mock = MockProviderAdapter::new("stripe");
        let pm = mock
            .create_payment_method("cus_1", card_details("4242424242424242"))
            .await
            .unwrap();

        let outcome = mock
            .process_payment(charge(&pm.payment_method_id, 25.0))
            .await
            .unwrap();

        assert_eq!(outcome.status, ChargeStatus::Succeeded);
        assert_eq!(outcome.amount, 25.0);
    }

    #[tokio::test]
    async fn decline_card_fails_with_provider_error() {
        let mock = MockProviderAdapter::new("stripe");
        let pm = mock
            .create_payment_method("cus_1", card_details(DECLINE_CARD))
            .await
            .unwrap();

        let err = mock
            .process_payment(charge(&pm.payment_method_id, 25.0))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "provider_error");
        match err {
            PaymentError::Provider { vendor_error, .. } => {
                assert_eq!(vendor_error.as_deref(), Some("card_declined"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn step_up_card_requires_action() {
        let mock = MockProviderAdapter::new("stripe");
        let pm = mock
            .create_payment_method("cus_1", card_details(STEP_UP_CARD))
            .await
            .unwrap();

        let outcome = mock
            .process_payment(charge(&pm.payment_method_id, 25.0))
            .await
            .unwrap();

        assert_eq!(outcome.status, ChargeStatus::RequiresAction);
        let action = outcome.action.expect("step-up action");
        assert_eq!(action.action_type, "3ds_authentication");
        assert!(action.action_url.unwrap().contains("/3ds/"));
    }

    #[tokio::test]
    async fn tokens_resolve_to_cards() {
        let mock = MockProviderAdapter::new("stripe");
        let details = PaymentMethodDetails::from_value(json!({"token": "tok_visa"})).unwrap();

        let pm = mock.create_payment_method("cus_1", details).await.unwrap();
        let card = pm.card.unwrap();
        assert_eq!(card.brand, "visa");
        assert_eq!(card.last4, "4242");

        let unknown = PaymentMethodDetails::from_value(json!({"token": "tok_bogus"})).unwrap();
        let err = mock.create_payment_method("cus_1", unknown).await;
        assert_eq!(err.unwrap_err().code(), "validation_error");
    }

    #[tokio::test]
    async fn zero_amount_charge_is_rejected() {
        let mock = MockProviderAdapter::new("stripe");
        let err = mock
            .process_payment(charge("pm_any", 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn error_injection_and_call_tracking() {
        let mock = MockProviderAdapter::new("stripe");
        mock.set_method_error(
            "process_payment",
            PaymentError::provider_transport("stripe", "timeout"),
        );

        let customer = mock
            .create_customer(NewCustomer {
                email: "a@b.c".to_string(),
                name: None,
                metadata: Default::default(),
            })
            .await;
        assert!(customer.is_ok());

        let err = mock.process_payment(charge("pm_1", 5.0)).await.unwrap_err();
        assert!(err.is_retryable());

        assert!(mock.was_called("create_customer"));
        assert_eq!(mock.call_count("process_payment"), 1);

        mock.clear_errors();
        mock.clear_calls();
        assert_eq!(mock.call_count("process_payment"), 0);
        assert!(mock.process_payment(charge("pm_1", 5.0)).await.is_ok());
    }

    #[test]
    fn parse_webhook_canonicalizes_payload() {
        let mock = MockProviderAdapter::new("stripe");
        let payload = json!({
            "id": "evt_mock_1",
            "type": "payment.succeeded",
            "data": {"payment_id": "pay_1", "amount": 10.0}
        });

        let event = mock
            .parse_webhook(payload.to_string().as_bytes(), None)
            .unwrap();

        assert_eq!(event.event_type, CanonicalEventType::PaymentSucceeded);
        assert_eq!(event.dedupe_key(), "stripe:evt_mock_1");
        assert_eq!(event.data["payment_id"], "pay_1");
    }

    #[test]
    fn rejecting_mock_fails_webhooks() {
        let mock = MockProviderAdapter::rejecting_webhooks("stripe");
        let result = mock.parse_webhook(b"{}", None);
        assert_eq!(result.unwrap_err().code(), "webhook_error");
    }

    #[tokio::test]
    async fn subscription_cancel_at_period_end_stays_active() {
        let mock = MockProviderAdapter::new("stripe");
        let sub = mock
            .create_subscription(NewSubscription {
                provider_customer_id: "cus_1".to_string(),
                price_id: "price_1".to_string(),
                quantity: 1,
                metadata: Default::default(),
            })
            .await
            .unwrap();

        let deferred = mock
            .cancel_subscription(&sub.provider_subscription_id, true)
            .await
            .unwrap();
        assert!(deferred.cancel_at_period_end);
        assert_eq!(deferred.status, "active");

        let immediate = mock
            .cancel_subscription(&sub.provider_subscription_id, false)
            .await
            .unwrap();
        assert_eq!(immediate.status, "canceled");
    }
}
