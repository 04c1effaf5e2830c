//! Provider adapter port.
//!
//! One implementation exists per payment vendor. The adapter's job is to
//! absorb vendor heterogeneity - synchronous card rails vs. hosted-redirect
//! rails, divergent webhook shapes and signing schemes - so the orchestrator
//! stays provider-agnostic.
//!
//! # Design
//!
//! - **Capability contract**: customer mgmt, payment-method mgmt,
//!   product/price mgmt, subscription mgmt, charge, refund, webhook parse.
//! - **Stateless**: adapters hold only credentials and may be shared freely.
//! - **Bounded**: vendor calls respect the configured timeout and surface
//!   expiry as a retryable provider error.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentError, Timestamp};
use crate::domain::payment_method::CardSummary;
use crate::domain::webhook::CanonicalEvent;

/// Port for payment vendor integrations.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name of this provider ("stripe", "paypal", "adyen", "payu").
    fn name(&self) -> &str;

    /// Register a customer with the vendor.
    async fn create_customer(&self, customer: NewCustomer)
        -> Result<ProviderCustomer, PaymentError>;

    /// Fetch the vendor-side customer record.
    async fn retrieve_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<ProviderCustomer, PaymentError>;

    /// Apply a partial update to the vendor-side customer record.
    async fn update_customer(
        &self,
        provider_customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<ProviderCustomer, PaymentError>;

    /// Create (or attach, when `existing_payment_method_id` is set) a payment
    /// method for the vendor-side customer.
    ///
    /// Implementations must fail closed on payment details they do not
    /// recognize rather than forwarding them to the vendor.
    async fn create_payment_method(
        &self,
        provider_customer_id: &str,
        details: PaymentMethodDetails,
    ) -> Result<ProviderPaymentMethod, PaymentError>;

    /// Create a product in the vendor catalog.
    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError>;

    /// Create a price/plan for a product.
    async fn create_price(&self, price: NewPrice) -> Result<ProviderPrice, PaymentError>;

    /// Create a subscription for a customer.
    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<ProviderSubscription, PaymentError>;

    /// Cancel a subscription, immediately or at period end.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError>;

    /// Execute a charge. Redirect-based rails return `Pending` with a hosted
    /// checkout payload; card rails settle synchronously or signal a
    /// step-up via `RequiresAction`.
    async fn process_payment(&self, request: ChargeRequest)
        -> Result<ChargeOutcome, PaymentError>;

    /// Refund a prior payment, fully (no amount) or partially.
    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError>;

    /// Verify a webhook delivery and normalize it.
    ///
    /// Verification happens first (provider-specific scheme) and failure is
    /// a `Webhook` error; unrecognized vendor event types map to the
    /// `Unhandled` canonical type rather than raising.
    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError>;
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("name", &self.name())
            .finish()
    }
}

/// Request to register a customer with a vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Vendor-side customer record, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub provider_customer_id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Partial update for a vendor-side customer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    /// Free-form vendor address object; forwarded opaquely.
    pub address: Option<serde_json::Value>,
}

/// Raw card details supplied by the caller.
///
/// `deny_unknown_fields` makes deserialization fail closed: payment details
/// this engine does not recognize are rejected before any vendor call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: Option<String>,
}

impl CardDetails {
    /// Last four digits for display metadata.
    pub fn last_four(&self) -> String {
        let n = self.number.len();
        if n >= 4 {
            self.number[n - 4..].to_string()
        } else {
            self.number.clone()
        }
    }
}

/// Payment-method creation details after allow-list filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentMethodDetails {
    /// Method type ("card" unless the vendor dictates otherwise).
    #[serde(rename = "type", default)]
    pub method_type: Option<String>,
    pub card: Option<CardDetails>,
    /// Vendor card token (e.g. "tok_visa") instead of raw card details.
    pub token: Option<String>,
    /// Existing vendor-side payment method to attach rather than create.
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub set_default: bool,
    pub billing_details: Option<serde_json::Value>,
}

impl PaymentMethodDetails {
    /// Parses caller-supplied details, failing closed on unknown fields.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PaymentError> {
        serde_json::from_value(value)
            .map_err(|e| PaymentError::validation(format!("invalid payment details: {}", e)))
    }
}

/// Vendor-side payment method, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPaymentMethod {
    pub payment_method_id: String,
    pub method_type: String,
    pub card: Option<CardSummary>,
    /// Vendor mandate/reference id when one was set up.
    pub mandate_id: Option<String>,
}

/// Vendor-side product record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProduct {
    pub provider_product_id: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

/// Request to create a price/plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrice {
    pub product_id: String,
    pub amount: f64,
    pub currency: String,
    /// Billing interval for recurring prices ("month", "year"); None for
    /// one-time prices.
    pub interval: Option<String>,
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
}

fn default_interval_count() -> u32 {
    1
}

/// Vendor-side price record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPrice {
    pub provider_price_id: String,
    pub product_id: String,
    pub amount: f64,
    pub currency: String,
    pub interval: Option<String>,
}

/// Request to create a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub provider_customer_id: String,
    pub price_id: String,
    #[serde(default = "default_interval_count")]
    pub quantity: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Vendor-side subscription record, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub provider_subscription_id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub quantity: u32,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
}

/// Request to execute a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: f64,
    pub currency: String,
    pub provider_customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Normalized charge status across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
    /// Awaiting an out-of-band confirmation (redirect rails resolve via a
    /// later webhook).
    Pending,
    /// The payer must complete a step-up action (e.g. 3DS).
    RequiresAction,
    Failed,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Succeeded => "succeeded",
            ChargeStatus::Pending => "pending",
            ChargeStatus::RequiresAction => "requires_action",
            ChargeStatus::Failed => "failed",
        }
    }
}

/// Step-up action details accompanying `RequiresAction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub action_url: Option<String>,
    pub action_type: String,
}

/// Hosted-checkout redirect payload for redirect-based rails.
///
/// Field order and presence are significant: the vendor recomputes the
/// request hash over the ordered field sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedCheckout {
    pub action_url: String,
    pub method: String,
    pub fields: Vec<(String, String)>,
}

impl HostedCheckout {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of a charge attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub provider_payment_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: ChargeStatus,
    pub action: Option<NextAction>,
    pub hosted_checkout: Option<HostedCheckout>,
}

/// Result of a refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub provider_refund_id: String,
    pub provider_payment_id: String,
    pub amount: Option<f64>,
    pub status: String,
}
