//! Payment orchestrator.
//!
//! The single entry point callers hold. It resolves provider adapters from
//! the registry, manages customers and their lazily-created provider links,
//! delegates payment-method work to the lifecycle service, and runs charges,
//! refunds, and webhook deliveries.
//!
//! State-touching operations need a storage session; without one they fail
//! with a `State` error rather than silently running unpersisted.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::adapters::providers::ProviderRegistry;
use crate::application::{PaymentMethodLifecycle, WebhookOutcome, WebhookProcessor};
use crate::domain::customer::{Customer, ProviderLink};
use crate::domain::foundation::{CustomerId, PaymentError, PaymentMethodId};
use crate::domain::payment_method::PaymentMethod;
use crate::domain::pricing::{PricingInput, PricingSpec, PricingStrategy};
use crate::ports::{
    ChargeOutcome, ChargeRequest, ChargeStatus, CustomerRepository, CustomerUpdate, EventPublisher,
    NewCustomer, NewPrice, NewSubscription, PaymentMethodRepository, ProcessedEventStore,
    ProviderPrice, ProviderProduct, ProviderSubscription, RefundOutcome,
};

/// Repositories the orchestrator persists through.
#[derive(Clone)]
pub struct StorageSession {
    pub customers: Arc<dyn CustomerRepository>,
    pub payment_methods: Arc<dyn PaymentMethodRepository>,
}

impl StorageSession {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        payment_methods: Arc<dyn PaymentMethodRepository>,
    ) -> Self {
        Self {
            customers,
            payment_methods,
        }
    }
}

/// Amount derivation from a pricing strategy instead of an explicit figure.
#[derive(Debug, Clone)]
pub struct PricingCharge {
    pub spec: PricingSpec,
    pub input: PricingInput,
}

/// One charge request against a named provider.
///
/// The amount comes from `amount` or is derived from `pricing`; exactly one
/// source must yield a positive figure. Customer and payment method are
/// optional because hosted-redirect rails can charge anonymously.
#[derive(Clone)]
pub struct ChargeCommand {
    pub provider: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub pricing: Option<PricingCharge>,
    pub customer_id: Option<CustomerId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ChargeCommand {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            amount: None,
            currency: None,
            pricing: None,
            customer_id: None,
            payment_method_id: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_pricing(mut self, spec: PricingSpec, input: PricingInput) -> Self {
        self.pricing = Some(PricingCharge { spec, input });
        self
    }

    pub fn for_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_payment_method(mut self, id: PaymentMethodId) -> Self {
        self.payment_method_id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Provider-agnostic payment orchestration facade.
pub struct PaymentOrchestrator {
    registry: Arc<ProviderRegistry>,
    publisher: Arc<dyn EventPublisher>,
    webhooks: WebhookProcessor,
    session: Option<StorageSession>,
    default_currency: String,
}

impl PaymentOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        publisher: Arc<dyn EventPublisher>,
        processed_events: Arc<dyn ProcessedEventStore>,
    ) -> Self {
        Self {
            webhooks: WebhookProcessor::new(publisher.clone(), processed_events),
            registry,
            publisher,
            session: None,
            default_currency: "USD".to_string(),
        }
    }

    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub fn with_session(mut self, session: StorageSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Attaches (or replaces) the storage session.
    pub fn set_session(&mut self, session: StorageSession) {
        self.session = Some(session);
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    fn session(&self) -> Result<&StorageSession, PaymentError> {
        self.session
            .as_ref()
            .ok_or_else(|| PaymentError::state("no storage session attached"))
    }

    fn lifecycle(&self) -> Result<PaymentMethodLifecycle, PaymentError> {
        let session = self.session()?;
        Ok(PaymentMethodLifecycle::new(
            self.registry.clone(),
            session.customers.clone(),
            session.payment_methods.clone(),
        ))
    }

    // Customers ----------------------------------------------------------

    /// Creates a customer locally. Provider registration happens lazily on
    /// first use of each provider.
    pub async fn create_customer(
        &self,
        email: impl Into<String>,
        name: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Customer, PaymentError> {
        let session = self.session()?;
        let customer = Customer::new(email, name).with_metadata(metadata);
        session.customers.create(&customer).await?;
        tracing::info!(customer_id = %customer.id, "Created customer");
        Ok(customer)
    }

    pub async fn get_customer(&self, id: CustomerId) -> Result<Customer, PaymentError> {
        self.session()?
            .customers
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))
    }

    /// Updates the local customer record and propagates the change to every
    /// provider the customer is linked with.
    pub async fn update_customer(
        &self,
        id: CustomerId,
        update: CustomerUpdate,
    ) -> Result<Customer, PaymentError> {
        let session = self.session()?;
        let mut customer = session
            .customers
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        if let Some(email) = &update.email {
            customer.email = email.clone();
        }
        if let Some(name) = &update.name {
            customer.name = Some(name.clone());
        }
        if let Some(metadata) = &update.metadata {
            customer.merge_metadata(metadata.clone());
        }
        session.customers.update(&customer).await?;

        for link in session.customers.list_provider_links(id).await? {
            let adapter = self.registry.get(&link.provider)?;
            adapter
                .update_customer(&link.provider_customer_id, update.clone())
                .await?;
        }

        tracing::info!(customer_id = %id, "Updated customer");
        Ok(customer)
    }

    /// Returns the provider-side customer id, registering the customer with
    /// the provider on first use.
    pub async fn ensure_provider_customer(
        &self,
        customer_id: CustomerId,
        provider: &str,
    ) -> Result<String, PaymentError> {
        let session = self.session()?;
        if let Some(link) = session
            .customers
            .get_provider_link(customer_id, provider)
            .await?
        {
            return Ok(link.provider_customer_id);
        }

        let customer = session
            .customers
            .get(customer_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        let adapter = self.registry.get(provider)?;
        let registered = adapter
            .create_customer(NewCustomer {
                email: customer.email,
                name: customer.name,
                metadata: customer.metadata,
            })
            .await?;

        let link = ProviderLink::new(customer_id, provider, &registered.provider_customer_id);
        session.customers.add_provider_link(&link).await?;
        tracing::info!(
            customer_id = %customer_id,
            provider,
            provider_customer_id = %registered.provider_customer_id,
            "Registered customer with provider"
        );
        Ok(registered.provider_customer_id)
    }

    // Payment methods ----------------------------------------------------

    /// Adds a payment method, registering the customer with the provider
    /// first if needed.
    pub async fn add_payment_method(
        &self,
        customer_id: CustomerId,
        provider: &str,
        details: serde_json::Value,
    ) -> Result<PaymentMethod, PaymentError> {
        self.ensure_provider_customer(customer_id, provider).await?;
        self.lifecycle()?.add(customer_id, provider, details).await
    }

    pub async fn set_default_payment_method(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError> {
        self.lifecycle()?.set_default(customer_id, id).await
    }

    pub async fn delete_payment_method(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<(), PaymentError> {
        self.lifecycle()?.remove(customer_id, id).await
    }

    pub async fn list_payment_methods(
        &self,
        customer_id: CustomerId,
        provider: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        self.lifecycle()?.list(customer_id, provider).await
    }

    // Catalog and subscriptions ------------------------------------------

    pub async fn create_product(
        &self,
        provider: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError> {
        self.registry
            .get(provider)?
            .create_product(name, description)
            .await
    }

    pub async fn create_price(
        &self,
        provider: &str,
        price: NewPrice,
    ) -> Result<ProviderPrice, PaymentError> {
        if price.amount <= 0.0 {
            return Err(PaymentError::validation("price amount must be positive"));
        }
        self.registry.get(provider)?.create_price(price).await
    }

    /// Creates a subscription, registering the customer with the provider on
    /// first use.
    pub async fn create_subscription(
        &self,
        provider: &str,
        customer_id: CustomerId,
        price_id: &str,
        quantity: u32,
    ) -> Result<ProviderSubscription, PaymentError> {
        let provider_customer_id = self.ensure_provider_customer(customer_id, provider).await?;
        let subscription = self
            .registry
            .get(provider)?
            .create_subscription(NewSubscription {
                provider_customer_id,
                price_id: price_id.to_string(),
                quantity,
                metadata: HashMap::new(),
            })
            .await?;

        self.publisher
            .publish_event(
                "subscription.created",
                json!({
                    "provider": provider,
                    "subscription_id": subscription.provider_subscription_id,
                    "customer_id": customer_id.to_string(),
                    "status": subscription.status,
                }),
                Some("subscription.created"),
            )
            .await?;
        Ok(subscription)
    }

    /// Cancels a subscription. The published event reflects the status the
    /// vendor actually returned, never an assumed rollback.
    pub async fn cancel_subscription(
        &self,
        provider: &str,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        let subscription = self
            .registry
            .get(provider)?
            .cancel_subscription(provider_subscription_id, at_period_end)
            .await?;

        let event_type = if subscription.status == "canceled" {
            "subscription.canceled"
        } else {
            "subscription.updated"
        };
        self.publisher
            .publish_event(
                event_type,
                json!({
                    "provider": provider,
                    "subscription_id": subscription.provider_subscription_id,
                    "status": subscription.status,
                    "cancel_at_period_end": subscription.cancel_at_period_end,
                }),
                Some(event_type),
            )
            .await?;
        Ok(subscription)
    }

    // Charges and refunds ------------------------------------------------

    /// Executes a charge.
    ///
    /// A vendor decline surfaces as a `Provider` error; a step-up comes back
    /// as an `Ok` outcome with `requires_action` status and the action
    /// payload, so the caller can forward it to the payer.
    pub async fn charge(&self, command: ChargeCommand) -> Result<ChargeOutcome, PaymentError> {
        let mut metadata = command.metadata.clone();
        let amount = match (&command.amount, &command.pricing) {
            (Some(amount), _) => *amount,
            (None, Some(pricing)) => {
                metadata.insert("pricing_strategy".to_string(), pricing.spec.kind().to_string());
                pricing.spec.calculate_price(&pricing.input)
            }
            (None, None) => {
                return Err(PaymentError::validation(
                    "charge requires an amount or a pricing spec",
                ))
            }
        };
        if amount <= 0.0 {
            return Err(PaymentError::validation("charge amount must be positive"));
        }

        let provider = command.provider.as_str();
        let adapter = self.registry.get(provider)?;

        let provider_customer_id = match command.customer_id {
            Some(customer_id) => Some(self.ensure_provider_customer(customer_id, provider).await?),
            None => None,
        };
        let payment_method_id = self
            .resolve_payment_method(&command, provider)
            .await?
            .map(|pm| pm.provider_payment_method_id);

        let currency = command
            .currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());
        let outcome = adapter
            .process_payment(ChargeRequest {
                amount,
                currency,
                provider_customer_id,
                payment_method_id,
                description: command.description.clone(),
                metadata,
            })
            .await?;

        tracing::info!(
            provider,
            payment_id = %outcome.provider_payment_id,
            amount = outcome.amount,
            status = outcome.status.as_str(),
            "Processed charge"
        );
        self.publish_charge_event(provider, &outcome).await?;
        Ok(outcome)
    }

    /// Resolves the vendor payment method for a charge: the explicitly named
    /// stored method, else the customer's default with this provider, else
    /// none (redirect rails carry no stored method).
    async fn resolve_payment_method(
        &self,
        command: &ChargeCommand,
        provider: &str,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        if let Some(id) = command.payment_method_id {
            let session = self.session()?;
            let method = session
                .payment_methods
                .get(id)
                .await?
                .filter(|pm| Some(pm.customer_id) == command.customer_id)
                .ok_or_else(|| PaymentError::not_found("Payment method"))?;
            if method.provider != provider {
                return Err(PaymentError::validation(format!(
                    "payment method belongs to provider '{}', not '{provider}'",
                    method.provider
                )));
            }
            return Ok(Some(method));
        }

        if let Some(customer_id) = command.customer_id {
            let session = self.session()?;
            let methods = session
                .payment_methods
                .list_for_customer(customer_id, Some(provider))
                .await?;
            return Ok(methods.into_iter().find(|pm| pm.is_default));
        }

        Ok(None)
    }

    async fn publish_charge_event(
        &self,
        provider: &str,
        outcome: &ChargeOutcome,
    ) -> Result<(), PaymentError> {
        let event_type = match outcome.status {
            ChargeStatus::Succeeded => "payment.succeeded",
            ChargeStatus::Pending => "payment.pending",
            ChargeStatus::RequiresAction => "payment.requires_action",
            ChargeStatus::Failed => "payment.failed",
        };
        self.publisher
            .publish_event(
                event_type,
                json!({
                    "provider": provider,
                    "payment_id": outcome.provider_payment_id,
                    "amount": outcome.amount,
                    "currency": outcome.currency,
                    "status": outcome.status.as_str(),
                }),
                Some(event_type),
            )
            .await
    }

    /// Refunds a prior payment, fully (no amount) or partially.
    pub async fn refund(
        &self,
        provider: &str,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        if let Some(amount) = amount {
            if amount <= 0.0 {
                return Err(PaymentError::validation("refund amount must be positive"));
            }
        }

        let refund = self
            .registry
            .get(provider)?
            .refund_payment(provider_payment_id, amount)
            .await?;

        self.publisher
            .publish_event(
                "payment.refunded",
                json!({
                    "provider": provider,
                    "refund_id": refund.provider_refund_id,
                    "payment_id": refund.provider_payment_id,
                    "amount": refund.amount,
                    "status": refund.status,
                }),
                Some("payment.refunded"),
            )
            .await?;
        Ok(refund)
    }

    // Webhooks -----------------------------------------------------------

    /// Handles one webhook delivery: verify, normalize, dedupe, publish.
    pub async fn receive_webhook(
        &self,
        provider: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let adapter = self.registry.get(provider)?;
        self.webhooks
            .process(adapter.as_ref(), payload, signature)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCustomerRepository, InMemoryPaymentMethodRepository, InMemoryProcessedEventStore,
        RecordingEventPublisher,
    };
    use crate::adapters::providers::{MockProviderAdapter, DECLINE_CARD, STEP_UP_CARD};
    use crate::domain::pricing::FlatPricing;
    use serde_json::json;

    struct Fixture {
        orchestrator: PaymentOrchestrator,
        mock: MockProviderAdapter,
        publisher: Arc<RecordingEventPublisher>,
    }

    fn fixture() -> Fixture {
        let mock = MockProviderAdapter::new("stripe");
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(mock.clone()));

        let publisher = Arc::new(RecordingEventPublisher::new());
        let orchestrator = PaymentOrchestrator::new(
            Arc::new(registry),
            publisher.clone(),
            Arc::new(InMemoryProcessedEventStore::new()),
        )
        .with_session(StorageSession::new(
            Arc::new(InMemoryCustomerRepository::new()),
            Arc::new(InMemoryPaymentMethodRepository::new()),
        ));

        Fixture {
            orchestrator,
            mock,
            publisher,
        }
    }

    fn card_payload(number: &str) -> serde_json::Value {
        json!({
            "type": "card",
            "card": {"number": number, "exp_month": 12, "exp_year": 2030, "cvc": "123"}
        })
    }

    #[tokio::test]
    async fn state_error_without_session() {
        let registry = Arc::new(ProviderRegistry::new());
        let orchestrator = PaymentOrchestrator::new(
            registry,
            Arc::new(RecordingEventPublisher::new()),
            Arc::new(InMemoryProcessedEventStore::new()),
        );

        let err = orchestrator
            .create_customer("a@b.c", None, HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "state_error");

        let err = orchestrator
            .charge(ChargeCommand::new("stripe").with_amount(10.0).for_customer(CustomerId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "state_error");
    }

    #[tokio::test]
    async fn provider_link_is_created_lazily_once() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", Some("Buyer".to_string()), HashMap::new())
            .await
            .unwrap();

        let first = fixture
            .orchestrator
            .ensure_provider_customer(customer.id, "stripe")
            .await
            .unwrap();
        let second = fixture
            .orchestrator
            .ensure_provider_customer(customer.id, "stripe")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.mock.call_count("create_customer"), 1);
    }

    #[tokio::test]
    async fn charge_with_stored_method_succeeds_and_publishes() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", None, HashMap::new())
            .await
            .unwrap();
        let method = fixture
            .orchestrator
            .add_payment_method(customer.id, "stripe", card_payload("4242424242424242"))
            .await
            .unwrap();

        let outcome = fixture
            .orchestrator
            .charge(
                ChargeCommand::new("stripe")
                    .with_amount(25.0)
                    .for_customer(customer.id)
                    .with_payment_method(method.id),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, ChargeStatus::Succeeded);
        assert_eq!(outcome.currency, "USD");
        assert_eq!(fixture.publisher.events_of_type("payment.succeeded").len(), 1);
    }

    #[tokio::test]
    async fn charge_falls_back_to_default_method() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", None, HashMap::new())
            .await
            .unwrap();
        let method = fixture
            .orchestrator
            .add_payment_method(
                customer.id,
                "stripe",
                json!({"token": "tok_visa", "set_default": true}),
            )
            .await
            .unwrap();

        fixture
            .orchestrator
            .charge(
                ChargeCommand::new("stripe")
                    .with_amount(12.0)
                    .for_customer(customer.id),
            )
            .await
            .unwrap();

        let calls = fixture.mock.calls();
        let charge_call = calls
            .iter()
            .find(|call| call.method == "process_payment")
            .expect("charge recorded");
        assert_eq!(charge_call.args[2], method.provider_payment_method_id);
    }

    #[tokio::test]
    async fn declined_card_surfaces_provider_error() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", None, HashMap::new())
            .await
            .unwrap();
        let method = fixture
            .orchestrator
            .add_payment_method(customer.id, "stripe", card_payload(DECLINE_CARD))
            .await
            .unwrap();

        let err = fixture
            .orchestrator
            .charge(
                ChargeCommand::new("stripe")
                    .with_amount(25.0)
                    .for_customer(customer.id)
                    .with_payment_method(method.id),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "provider_error");
        assert!(fixture
            .publisher
            .events_of_type("payment.succeeded")
            .is_empty());
    }

    #[tokio::test]
    async fn step_up_card_returns_requires_action_outcome() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", None, HashMap::new())
            .await
            .unwrap();
        let method = fixture
            .orchestrator
            .add_payment_method(customer.id, "stripe", card_payload(STEP_UP_CARD))
            .await
            .unwrap();

        let outcome = fixture
            .orchestrator
            .charge(
                ChargeCommand::new("stripe")
                    .with_amount(25.0)
                    .for_customer(customer.id)
                    .with_payment_method(method.id),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, ChargeStatus::RequiresAction);
        let action = outcome.action.expect("step-up action");
        assert_eq!(action.action_type, "3ds_authentication");
        assert!(action.action_url.is_some());
        assert_eq!(
            fixture.publisher.events_of_type("payment.requires_action").len(),
            1
        );
    }

    #[tokio::test]
    async fn pricing_spec_derives_the_amount() {
        let fixture = fixture();

        let outcome = fixture
            .orchestrator
            .charge(
                ChargeCommand::new("stripe")
                    .with_pricing(
                        PricingSpec::Flat(FlatPricing::new(66.0, 0.2)),
                        PricingInput::new(),
                    ),
            )
            .await
            .unwrap();

        assert!((outcome.amount - 79.2).abs() < 1e-9);
        let calls = fixture.mock.calls();
        let charge_call = calls
            .iter()
            .find(|call| call.method == "process_payment")
            .unwrap();
        assert_eq!(charge_call.args[0], "79.20");
    }

    #[tokio::test]
    async fn charge_requires_an_amount_source() {
        let fixture = fixture();

        let err = fixture
            .orchestrator
            .charge(ChargeCommand::new("stripe"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let err = fixture
            .orchestrator
            .charge(ChargeCommand::new("stripe").with_amount(-5.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn refund_publishes_refund_event() {
        let fixture = fixture();

        let refund = fixture
            .orchestrator
            .refund("stripe", "pay_mock_stripe_1", Some(10.0))
            .await
            .unwrap();
        assert_eq!(refund.status, "succeeded");
        assert_eq!(fixture.publisher.events_of_type("payment.refunded").len(), 1);

        let err = fixture
            .orchestrator
            .refund("stripe", "pay_mock_stripe_1", Some(0.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn webhook_replay_produces_no_second_publish() {
        let fixture = fixture();
        let payload = br#"{"id": "evt_1", "type": "payment.succeeded", "data": {}}"#;

        let first = fixture
            .orchestrator
            .receive_webhook("stripe", payload, None)
            .await
            .unwrap();
        assert!(!first.duplicate);

        let replay = fixture
            .orchestrator
            .receive_webhook("stripe", payload, None)
            .await
            .unwrap();
        assert!(replay.duplicate);

        assert_eq!(fixture.publisher.events_of_type("payment.succeeded").len(), 1);
    }

    #[tokio::test]
    async fn cancel_subscription_reflects_vendor_status() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("buyer@test.com", None, HashMap::new())
            .await
            .unwrap();

        let subscription = fixture
            .orchestrator
            .create_subscription("stripe", customer.id, "price_1", 1)
            .await
            .unwrap();
        assert_eq!(subscription.status, "active");
        assert_eq!(
            fixture.publisher.events_of_type("subscription.created").len(),
            1
        );

        let deferred = fixture
            .orchestrator
            .cancel_subscription("stripe", &subscription.provider_subscription_id, true)
            .await
            .unwrap();
        assert!(deferred.cancel_at_period_end);
        assert_eq!(
            fixture.publisher.events_of_type("subscription.updated").len(),
            1
        );

        let immediate = fixture
            .orchestrator
            .cancel_subscription("stripe", &subscription.provider_subscription_id, false)
            .await
            .unwrap();
        assert_eq!(immediate.status, "canceled");
        assert_eq!(
            fixture.publisher.events_of_type("subscription.canceled").len(),
            1
        );
    }

    #[tokio::test]
    async fn update_customer_propagates_to_linked_providers() {
        let fixture = fixture();
        let customer = fixture
            .orchestrator
            .create_customer("old@test.com", None, HashMap::new())
            .await
            .unwrap();
        fixture
            .orchestrator
            .ensure_provider_customer(customer.id, "stripe")
            .await
            .unwrap();

        let updated = fixture
            .orchestrator
            .update_customer(
                customer.id,
                CustomerUpdate {
                    email: Some("new@test.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "new@test.com");
        assert!(fixture.mock.was_called("update_customer"));
    }
}
