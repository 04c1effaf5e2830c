//! Stripe provider adapter.
//!
//! Form-encoded REST calls against the Stripe API, webhook verification via
//! the timestamped `Stripe-Signature` header scheme.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderConfig;
use crate::domain::foundation::{PaymentError, Timestamp};
use crate::domain::payment_method::CardSummary;
use crate::domain::webhook::{CanonicalEvent, CanonicalEventType};
use crate::ports::{
    ChargeOutcome, ChargeRequest, ChargeStatus, CustomerUpdate, NewCustomer, NewPrice,
    NewSubscription, NextAction, PaymentMethodDetails, ProviderAdapter, ProviderCustomer,
    ProviderPaymentMethod, ProviderPrice, ProviderProduct, ProviderSubscription, RefundOutcome,
};

use super::signature::{self, SignatureHeader};

const PROVIDER_NAME: &str = "stripe";
const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Converts a major-unit amount to Stripe's integer minor units.
fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Stripe provider adapter.
pub struct StripeAdapter {
    config: ProviderConfig,
    base_url: String,
    http_client: reqwest::Client,
}

impl StripeAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, PaymentError> {
        config.validate(PROVIDER_NAME)?;

        let base_url = config
            .additional_settings
            .get("api_base_url")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, PaymentError> {
        self.http_client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, PaymentError> {
        self.http_client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))
    }

    /// Decodes a Stripe response, lifting API failures into provider errors.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PaymentError::authentication("Stripe rejected API key"));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, error = %error_text, "Stripe API call failed");
            return Err(
                PaymentError::provider(PROVIDER_NAME, format!("Stripe API error ({status})"))
                    .with_vendor_error(error_text),
            );
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(
                PROVIDER_NAME,
                format!("Failed to parse Stripe response: {e}"),
            )
        })
    }

    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), PaymentError> {
        signature::validate_timestamp(header.timestamp)?;

        let signed_payload = format!("{}.{}", header.timestamp, String::from_utf8_lossy(payload));
        let expected = signature::hmac_sha256(
            self.config.webhook_secret.expose_secret().as_bytes(),
            signed_payload.as_bytes(),
        );

        if !signature::signatures_match(&expected, &header.v1_signature) {
            tracing::warn!("Invalid Stripe webhook signature");
            return Err(PaymentError::webhook("Invalid signature"));
        }

        Ok(())
    }

    fn canonical_event_type(vendor_type: &str) -> CanonicalEventType {
        match vendor_type {
            "payment_intent.succeeded" => CanonicalEventType::PaymentSucceeded,
            "payment_intent.payment_failed" => CanonicalEventType::PaymentFailed,
            "payment_intent.requires_action" => CanonicalEventType::PaymentRequiresAction,
            "payment_intent.processing" => CanonicalEventType::PaymentPending,
            "charge.refunded" => CanonicalEventType::PaymentRefunded,
            "customer.subscription.created" => CanonicalEventType::SubscriptionCreated,
            "customer.subscription.updated" => CanonicalEventType::SubscriptionUpdated,
            "customer.subscription.deleted" => CanonicalEventType::SubscriptionCanceled,
            "invoice.paid" => CanonicalEventType::InvoicePaid,
            _ => CanonicalEventType::Unhandled,
        }
    }

    /// Pulls the normalized fields out of the event object.
    fn extract_event_data(object: &serde_json::Value) -> serde_json::Value {
        let amount = object
            .get("amount")
            .and_then(serde_json::Value::as_i64)
            .map(from_minor_units);

        json!({
            "payment_id": object.get("id"),
            "amount": amount,
            "currency": object.get("currency"),
            "status": object.get("status"),
            "customer": object.get("customer"),
        })
    }

    fn map_subscription(sub: StripeSubscription) -> ProviderSubscription {
        ProviderSubscription {
            provider_subscription_id: sub.id,
            customer_id: sub.customer,
            price_id: sub
                .items
                .and_then(|items| items.data.into_iter().next())
                .and_then(|item| item.price)
                .map(|price| price.id),
            quantity: sub.quantity.unwrap_or(1),
            status: sub.status,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
        }
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_customer(
        &self,
        customer: NewCustomer,
    ) -> Result<ProviderCustomer, PaymentError> {
        let mut params = vec![("email".to_string(), customer.email.clone())];
        if let Some(name) = &customer.name {
            params.push(("name".to_string(), name.clone()));
        }
        for (key, value) in &customer.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self.post_form("/v1/customers", &params).await?;
        let stripe_customer: StripeCustomer = Self::decode(response).await?;

        Ok(ProviderCustomer {
            provider_customer_id: stripe_customer.id,
            email: stripe_customer.email.unwrap_or(customer.email),
            name: stripe_customer.name.or(customer.name),
            created_at: Timestamp::from_unix_seconds(stripe_customer.created),
            metadata: stripe_customer.metadata,
        })
    }

    async fn retrieve_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<ProviderCustomer, PaymentError> {
        let response = self
            .get(&format!("/v1/customers/{provider_customer_id}"))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::not_found("Customer"));
        }

        let stripe_customer: StripeCustomer = Self::decode(response).await?;
        if stripe_customer.deleted {
            return Err(PaymentError::not_found("Customer"));
        }

        Ok(ProviderCustomer {
            provider_customer_id: stripe_customer.id,
            email: stripe_customer.email.unwrap_or_default(),
            name: stripe_customer.name,
            created_at: Timestamp::from_unix_seconds(stripe_customer.created),
            metadata: stripe_customer.metadata,
        })
    }

    async fn update_customer(
        &self,
        provider_customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<ProviderCustomer, PaymentError> {
        let mut params = Vec::new();
        if let Some(email) = &update.email {
            params.push(("email".to_string(), email.clone()));
        }
        if let Some(name) = &update.name {
            params.push(("name".to_string(), name.clone()));
        }
        if let Some(metadata) = &update.metadata {
            for (key, value) in metadata {
                params.push((format!("metadata[{key}]"), value.clone()));
            }
        }
        if let Some(address) = &update.address {
            if let Some(map) = address.as_object() {
                for (key, value) in map {
                    if let Some(value) = value.as_str() {
                        params.push((format!("address[{key}]"), value.to_string()));
                    }
                }
            }
        }

        let response = self
            .post_form(&format!("/v1/customers/{provider_customer_id}"), &params)
            .await?;
        let stripe_customer: StripeCustomer = Self::decode(response).await?;

        Ok(ProviderCustomer {
            provider_customer_id: stripe_customer.id,
            email: stripe_customer.email.unwrap_or_default(),
            name: stripe_customer.name,
            created_at: Timestamp::from_unix_seconds(stripe_customer.created),
            metadata: stripe_customer.metadata,
        })
    }

    async fn create_payment_method(
        &self,
        provider_customer_id: &str,
        details: PaymentMethodDetails,
    ) -> Result<ProviderPaymentMethod, PaymentError> {
        // Attach an existing payment method instead of creating one.
        let pm_id = if let Some(existing) = &details.payment_method_id {
            existing.clone()
        } else {
            let mut params = vec![(
                "type".to_string(),
                details.method_type.clone().unwrap_or_else(|| "card".to_string()),
            )];

            if let Some(token) = &details.token {
                params.push(("card[token]".to_string(), token.clone()));
            } else if let Some(card) = &details.card {
                params.push(("card[number]".to_string(), card.number.clone()));
                params.push(("card[exp_month]".to_string(), card.exp_month.to_string()));
                params.push(("card[exp_year]".to_string(), card.exp_year.to_string()));
                if let Some(cvc) = &card.cvc {
                    params.push(("card[cvc]".to_string(), cvc.clone()));
                }
            } else {
                return Err(PaymentError::validation(
                    "payment method requires card, token, or payment_method_id",
                ));
            }

            let response = self.post_form("/v1/payment_methods", &params).await?;
            let created: StripePaymentMethod = Self::decode(response).await?;
            created.id
        };

        let attach_params = vec![("customer".to_string(), provider_customer_id.to_string())];
        let response = self
            .post_form(&format!("/v1/payment_methods/{pm_id}/attach"), &attach_params)
            .await?;
        let attached: StripePaymentMethod = Self::decode(response).await?;

        Ok(ProviderPaymentMethod {
            payment_method_id: attached.id,
            method_type: attached.method_type,
            card: attached.card.map(|card| CardSummary {
                brand: card.brand,
                last4: card.last4,
                exp_month: Some(card.exp_month),
                exp_year: Some(card.exp_year),
            }),
            mandate_id: None,
        })
    }

    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError> {
        let mut params = vec![("name".to_string(), name.to_string())];
        if let Some(description) = description {
            params.push(("description".to_string(), description.to_string()));
        }

        let response = self.post_form("/v1/products", &params).await?;
        let product: StripeProduct = Self::decode(response).await?;

        Ok(ProviderProduct {
            provider_product_id: product.id,
            name: product.name,
            description: product.description,
            active: product.active,
        })
    }

    async fn create_price(&self, price: NewPrice) -> Result<ProviderPrice, PaymentError> {
        let mut params = vec![
            ("product".to_string(), price.product_id.clone()),
            (
                "unit_amount".to_string(),
                to_minor_units(price.amount).to_string(),
            ),
            ("currency".to_string(), price.currency.to_lowercase()),
        ];
        if let Some(interval) = &price.interval {
            params.push(("recurring[interval]".to_string(), interval.clone()));
            params.push((
                "recurring[interval_count]".to_string(),
                price.interval_count.to_string(),
            ));
        }

        let response = self.post_form("/v1/prices", &params).await?;
        let stripe_price: StripePrice = Self::decode(response).await?;

        Ok(ProviderPrice {
            provider_price_id: stripe_price.id,
            product_id: stripe_price.product,
            amount: from_minor_units(stripe_price.unit_amount),
            currency: stripe_price.currency,
            interval: stripe_price.recurring.map(|r| r.interval),
        })
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<ProviderSubscription, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), subscription.provider_customer_id),
            ("items[0][price]".to_string(), subscription.price_id),
            (
                "items[0][quantity]".to_string(),
                subscription.quantity.to_string(),
            ),
        ];
        for (key, value) in &subscription.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self.post_form("/v1/subscriptions", &params).await?;
        let sub: StripeSubscription = Self::decode(response).await?;
        Ok(Self::map_subscription(sub))
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        let path = format!("/v1/subscriptions/{provider_subscription_id}");

        let response = if at_period_end {
            self.post_form(
                &path,
                &[("cancel_at_period_end".to_string(), "true".to_string())],
            )
            .await?
        } else {
            self.http_client
                .delete(format!("{}{}", self.base_url, path))
                .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
                .send()
                .await
                .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))?
        };

        let sub: StripeSubscription = Self::decode(response).await?;
        Ok(Self::map_subscription(sub))
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let mut params = vec![
            (
                "amount".to_string(),
                to_minor_units(request.amount).to_string(),
            ),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("confirm".to_string(), "true".to_string()),
            // Never follow redirects server-side; step-ups surface as
            // requires_action instead.
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
            (
                "automatic_payment_methods[allow_redirects]".to_string(),
                "never".to_string(),
            ),
        ];
        if let Some(customer) = &request.provider_customer_id {
            params.push(("customer".to_string(), customer.clone()));
        }
        if let Some(payment_method) = &request.payment_method_id {
            params.push(("payment_method".to_string(), payment_method.clone()));
        }
        if let Some(description) = &request.description {
            params.push(("description".to_string(), description.clone()));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self.post_form("/v1/payment_intents", &params).await?;
        let intent: StripePaymentIntent = Self::decode(response).await?;

        let status = match intent.status.as_str() {
            "succeeded" => ChargeStatus::Succeeded,
            "processing" => ChargeStatus::Pending,
            "requires_action" | "requires_confirmation" => ChargeStatus::RequiresAction,
            other => {
                let vendor_message = intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| format!("payment intent status '{other}'"));
                return Err(
                    PaymentError::provider(PROVIDER_NAME, "Payment declined")
                        .with_vendor_error(vendor_message),
                );
            }
        };

        let action = if status == ChargeStatus::RequiresAction {
            let action_url = intent
                .next_action
                .as_ref()
                .and_then(|a| a.redirect_to_url.as_ref())
                .map(|r| r.url.clone());
            Some(NextAction {
                action_url,
                action_type: "3ds_authentication".to_string(),
            })
        } else {
            None
        };

        Ok(ChargeOutcome {
            provider_payment_id: intent.id,
            amount: from_minor_units(intent.amount),
            currency: intent.currency,
            status,
            action,
            hosted_checkout: None,
        })
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        let mut params = vec![(
            "payment_intent".to_string(),
            provider_payment_id.to_string(),
        )];
        if let Some(amount) = amount {
            params.push(("amount".to_string(), to_minor_units(amount).to_string()));
        }

        let response = self.post_form("/v1/refunds", &params).await?;
        let refund: StripeRefund = Self::decode(response).await?;

        Ok(RefundOutcome {
            provider_refund_id: refund.id,
            provider_payment_id: provider_payment_id.to_string(),
            amount: Some(from_minor_units(refund.amount)),
            status: refund.status,
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError> {
        let header_value = signature_header
            .ok_or_else(|| PaymentError::webhook("Missing Stripe-Signature header"))?;

        let header = SignatureHeader::parse(header_value)?;
        self.verify_signature(payload, &header)?;

        let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe webhook payload");
            PaymentError::webhook(format!("Invalid JSON: {e}"))
        })?;

        let event_type = Self::canonical_event_type(&event.event_type);
        let data = Self::extract_event_data(&event.data.object);
        let raw_payload: serde_json::Value =
            serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);

        tracing::info!(
            event_id = %event.id,
            vendor_event_type = %event.event_type,
            canonical = %event_type,
            "Stripe webhook verified"
        );

        Ok(CanonicalEvent::new(
            event_type,
            PROVIDER_NAME,
            event.event_type,
            Some(event.id),
            data,
            raw_payload,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: String,
    last4: String,
    exp_month: u8,
    exp_year: u16,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
    #[serde(rename = "type")]
    method_type: String,
    card: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
struct StripeProduct {
    id: String,
    name: String,
    description: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StripeRecurring {
    interval: String,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
    product: String,
    unit_amount: i64,
    currency: String,
    recurring: Option<StripeRecurring>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItemPrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: Option<StripeSubscriptionItemPrice>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItems {
    #[serde(default)]
    data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: String,
    status: String,
    #[serde(default)]
    current_period_start: i64,
    #[serde(default)]
    current_period_end: i64,
    #[serde(default)]
    cancel_at_period_end: bool,
    quantity: Option<u32>,
    items: Option<StripeSubscriptionItems>,
}

#[derive(Debug, Deserialize)]
struct StripeRedirectToUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeNextAction {
    redirect_to_url: Option<StripeRedirectToUrl>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    next_action: Option<StripeNextAction>,
    last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}
