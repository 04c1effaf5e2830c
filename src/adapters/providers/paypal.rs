//! PayPal provider adapter.
//!
//! JSON REST calls against the PayPal v1/v2 APIs with a cached OAuth2
//! client-credentials token. PayPal has no first-class customer object, so
//! customers are issued a local reference id and carried through order and
//! subscription `custom_id` fields.
//!
//! Webhook verification uses the same timestamped HMAC-SHA256 header scheme
//! as the other adapters, keyed on the configured webhook secret.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

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

const PROVIDER_NAME: &str = "paypal";
const LIVE_BASE_URL: &str = "https://api-m.paypal.com";
const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

/// Leeway subtracted from token lifetime so a token is refreshed before it
/// can expire mid-request.
const TOKEN_EXPIRY_LEEWAY_SECS: i64 = 60;

fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Timestamp,
}

/// PayPal provider adapter.
#[derive(Debug)]
pub struct PayPalAdapter {
    config: ProviderConfig,
    base_url: String,
    http_client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl PayPalAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, PaymentError> {
        config.validate(PROVIDER_NAME)?;
        if config.api_secret.is_none() {
            return Err(PaymentError::configuration(
                "paypal: api_secret (client secret) is required",
            ));
        }

        let base_url = config
            .additional_settings
            .get("api_base_url")
            .cloned()
            .unwrap_or_else(|| {
                if config.sandbox_mode {
                    SANDBOX_BASE_URL.to_string()
                } else {
                    LIVE_BASE_URL.to_string()
                }
            });

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            config,
            base_url,
            http_client,
            token: RwLock::new(None),
        })
    }

    /// Returns a valid access token, refreshing through the OAuth2
    /// client-credentials grant when the cached one is missing or stale.
    async fn access_token(&self) -> Result<String, PaymentError> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if Timestamp::now().is_before(&cached.expires_at) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let client_secret = self
            .config
            .api_secret
            .as_ref()
            .ok_or_else(|| PaymentError::configuration("paypal: api_secret missing"))?;

        let response = self
            .http_client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(
                self.config.api_key.expose_secret(),
                Some(client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PaymentError::authentication(
                "PayPal rejected client credentials",
            ));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(
                PaymentError::provider(PROVIDER_NAME, "OAuth token request failed")
                    .with_vendor_error(error_text),
            );
        }

        let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
            PaymentError::provider(PROVIDER_NAME, format!("Failed to parse token response: {e}"))
        })?;

        let expires_at = Timestamp::from_unix_seconds(
            Timestamp::now().unix_seconds() + token_response.expires_in
                - TOKEN_EXPIRY_LEEWAY_SECS,
        );

        let mut token = self.token.write().await;
        *token = Some(CachedToken {
            access_token: token_response.access_token.clone(),
            expires_at,
        });

        Ok(token_response.access_token)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, PaymentError> {
        let token = self.access_token().await?;
        self.http_client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PaymentError::authentication("PayPal rejected access token"));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, error = %error_text, "PayPal API call failed");
            return Err(
                PaymentError::provider(PROVIDER_NAME, format!("PayPal API error ({status})"))
                    .with_vendor_error(error_text),
            );
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(
                PROVIDER_NAME,
                format!("Failed to parse PayPal response: {e}"),
            )
        })
    }

    fn canonical_event_type(vendor_type: &str) -> CanonicalEventType {
        match vendor_type {
            "PAYMENT.CAPTURE.COMPLETED" => CanonicalEventType::PaymentSucceeded,
            "PAYMENT.CAPTURE.DENIED" => CanonicalEventType::PaymentFailed,
            "PAYMENT.CAPTURE.PENDING" => CanonicalEventType::PaymentPending,
            "PAYMENT.CAPTURE.REFUNDED" => CanonicalEventType::PaymentRefunded,
            "CHECKOUT.ORDER.APPROVED" => CanonicalEventType::PaymentAuthorized,
            "BILLING.SUBSCRIPTION.CREATED" => CanonicalEventType::SubscriptionCreated,
            "BILLING.SUBSCRIPTION.UPDATED" => CanonicalEventType::SubscriptionUpdated,
            "BILLING.SUBSCRIPTION.CANCELLED" => CanonicalEventType::SubscriptionCanceled,
            _ => CanonicalEventType::Unhandled,
        }
    }

    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), PaymentError> {
        signature::validate_timestamp(header.timestamp)?;

        let signed_payload = format!("{}.{}", header.timestamp, String::from_utf8_lossy(payload));
        let expected = signature::hmac_sha256(
            self.config.webhook_secret.expose_secret().as_bytes(),
            signed_payload.as_bytes(),
        );

        if !signature::signatures_match(&expected, &header.v1_signature) {
            tracing::warn!("Invalid PayPal webhook signature");
            return Err(PaymentError::webhook("Invalid signature"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for PayPalAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_customer(
        &self,
        customer: NewCustomer,
    ) -> Result<ProviderCustomer, PaymentError> {
        // No vendor call: PayPal identifies payers per order or vault token,
        // so the reference id is minted locally and threaded through
        // custom_id fields on later calls.
        let reference = format!("CUSTOMER-{}", uuid::Uuid::new_v4().simple());

        tracing::debug!(provider_customer_id = %reference, "Issued local PayPal customer reference");

        Ok(ProviderCustomer {
            provider_customer_id: reference,
            email: customer.email,
            name: customer.name,
            created_at: Timestamp::now(),
            metadata: customer.metadata,
        })
    }

    async fn retrieve_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<ProviderCustomer, PaymentError> {
        // Local references carry no vendor-side state to fetch.
        if !provider_customer_id.starts_with("CUSTOMER-") {
            return Err(PaymentError::not_found("Customer"));
        }
        Ok(ProviderCustomer {
            provider_customer_id: provider_customer_id.to_string(),
            email: String::new(),
            name: None,
            created_at: Timestamp::now(),
            metadata: Default::default(),
        })
    }

    async fn update_customer(
        &self,
        provider_customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<ProviderCustomer, PaymentError> {
        let mut customer = self.retrieve_customer(provider_customer_id).await?;
        if let Some(email) = update.email {
            customer.email = email;
        }
        if let Some(name) = update.name {
            customer.name = Some(name);
        }
        if let Some(metadata) = update.metadata {
            customer.metadata = metadata;
        }
        Ok(customer)
    }

    async fn create_payment_method(
        &self,
        provider_customer_id: &str,
        details: PaymentMethodDetails,
    ) -> Result<ProviderPaymentMethod, PaymentError> {
        let payment_source = if let Some(token) = &details.token {
            json!({ "token": { "id": token, "type": "SETUP_TOKEN" } })
        } else if let Some(card) = &details.card {
            json!({
                "card": {
                    "number": card.number,
                    "expiry": format!("{}-{:02}", card.exp_year, card.exp_month),
                    "security_code": card.cvc,
                }
            })
        } else if let Some(existing) = &details.payment_method_id {
            // Already vaulted; nothing to create.
            return Ok(ProviderPaymentMethod {
                payment_method_id: existing.clone(),
                method_type: details.method_type.unwrap_or_else(|| "card".to_string()),
                card: None,
                mandate_id: None,
            });
        } else {
            return Err(PaymentError::validation(
                "payment method requires card, token, or payment_method_id",
            ));
        };

        let body = json!({
            "payment_source": payment_source,
            "customer": { "merchant_customer_id": provider_customer_id },
        });

        let response = self.post_json("/v3/vault/payment-tokens", &body).await?;
        let vaulted: PayPalVaultToken = Self::decode(response).await?;

        let card = vaulted.payment_source.and_then(|source| source.card).map(|card| CardSummary {
            brand: card.brand.unwrap_or_else(|| "unknown".to_string()),
            last4: card.last_digits.unwrap_or_default(),
            exp_month: None,
            exp_year: None,
        });

        Ok(ProviderPaymentMethod {
            payment_method_id: vaulted.id,
            method_type: "card".to_string(),
            card,
            mandate_id: None,
        })
    }

    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError> {
        let body = json!({
            "name": name,
            "description": description,
            "type": "SERVICE",
        });

        let response = self.post_json("/v1/catalogs/products", &body).await?;
        let product: PayPalProduct = Self::decode(response).await?;

        Ok(ProviderProduct {
            provider_product_id: product.id,
            name: product.name,
            description: product.description,
            active: true,
        })
    }

    async fn create_price(&self, price: NewPrice) -> Result<ProviderPrice, PaymentError> {
        let interval = price.interval.clone().unwrap_or_else(|| "month".to_string());
        let body = json!({
            "product_id": price.product_id,
            "name": format!("{} {} plan", price.currency, format_amount(price.amount)),
            "billing_cycles": [{
                "frequency": {
                    "interval_unit": interval.to_uppercase(),
                    "interval_count": price.interval_count,
                },
                "tenure_type": "REGULAR",
                "sequence": 1,
                "total_cycles": 0,
                "pricing_scheme": {
                    "fixed_price": {
                        "value": format_amount(price.amount),
                        "currency_code": price.currency,
                    }
                }
            }],
            "payment_preferences": { "auto_bill_outstanding": true },
        });

        let response = self.post_json("/v1/billing/plans", &body).await?;
        let plan: PayPalPlan = Self::decode(response).await?;

        Ok(ProviderPrice {
            provider_price_id: plan.id,
            product_id: price.product_id,
            amount: price.amount,
            currency: price.currency,
            interval: Some(interval),
        })
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<ProviderSubscription, PaymentError> {
        let body = json!({
            "plan_id": subscription.price_id,
            "quantity": subscription.quantity.to_string(),
            "custom_id": subscription.provider_customer_id,
        });

        let response = self.post_json("/v1/billing/subscriptions", &body).await?;
        let sub: PayPalSubscription = Self::decode(response).await?;

        let now = Timestamp::now();
        Ok(ProviderSubscription {
            provider_subscription_id: sub.id,
            customer_id: subscription.provider_customer_id,
            price_id: Some(subscription.price_id),
            quantity: subscription.quantity,
            status: sub.status.to_lowercase(),
            current_period_start: now.unix_seconds(),
            current_period_end: now.add_days(30).unix_seconds(),
            cancel_at_period_end: false,
        })
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        // PayPal has no deferred cancel; period-end requests suspend instead
        // so the subscription can still be resumed before the period closes.
        let (path, reason) = if at_period_end {
            (
                format!("/v1/billing/subscriptions/{provider_subscription_id}/suspend"),
                "Cancellation requested at period end",
            )
        } else {
            (
                format!("/v1/billing/subscriptions/{provider_subscription_id}/cancel"),
                "Cancellation requested",
            )
        };

        let response = self.post_json(&path, &json!({ "reason": reason })).await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(
                PaymentError::provider(PROVIDER_NAME, format!("PayPal API error ({status})"))
                    .with_vendor_error(error_text),
            );
        }

        let now = Timestamp::now();
        Ok(ProviderSubscription {
            provider_subscription_id: provider_subscription_id.to_string(),
            customer_id: String::new(),
            price_id: None,
            quantity: 1,
            status: if at_period_end {
                "suspended".to_string()
            } else {
                "canceled".to_string()
            },
            current_period_start: now.unix_seconds(),
            current_period_end: now.unix_seconds(),
            cancel_at_period_end: at_period_end,
        })
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let mut purchase_unit = json!({
            "amount": {
                "currency_code": request.currency,
                "value": format_amount(request.amount),
            }
        });
        if let Some(customer) = &request.provider_customer_id {
            purchase_unit["custom_id"] = json!(customer);
        }
        if let Some(description) = &request.description {
            purchase_unit["description"] = json!(description);
        }

        let mut body = json!({
            "intent": "CAPTURE",
            "purchase_units": [purchase_unit],
        });
        if let Some(payment_method) = &request.payment_method_id {
            body["payment_source"] = json!({
                "token": { "id": payment_method, "type": "PAYMENT_METHOD_TOKEN" }
            });
        }

        let response = self.post_json("/v2/checkout/orders", &body).await?;
        let order: PayPalOrder = Self::decode(response).await?;

        match order.status.as_str() {
            "COMPLETED" => Ok(ChargeOutcome {
                provider_payment_id: order.id,
                amount: request.amount,
                currency: request.currency,
                status: ChargeStatus::Succeeded,
                action: None,
                hosted_checkout: None,
            }),
            "PAYER_ACTION_REQUIRED" | "CREATED" | "APPROVED" => {
                let approval_url = order
                    .links
                    .iter()
                    .find(|link| link.rel == "payer-action" || link.rel == "approve")
                    .map(|link| link.href.clone());
                Ok(ChargeOutcome {
                    provider_payment_id: order.id,
                    amount: request.amount,
                    currency: request.currency,
                    status: ChargeStatus::RequiresAction,
                    action: Some(NextAction {
                        action_url: approval_url,
                        action_type: "payer_approval".to_string(),
                    }),
                    hosted_checkout: None,
                })
            }
            "PENDING" => Ok(ChargeOutcome {
                provider_payment_id: order.id,
                amount: request.amount,
                currency: request.currency,
                status: ChargeStatus::Pending,
                action: None,
                hosted_checkout: None,
            }),
            other => Err(PaymentError::provider(PROVIDER_NAME, "Payment declined")
                .with_vendor_error(format!("order status '{other}'"))),
        }
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        let body = match amount {
            Some(amount) => json!({
                "amount": { "value": format_amount(amount), "currency_code": "USD" }
            }),
            None => json!({}),
        };

        let response = self
            .post_json(
                &format!("/v2/payments/captures/{provider_payment_id}/refund"),
                &body,
            )
            .await?;
        let refund: PayPalRefund = Self::decode(response).await?;

        Ok(RefundOutcome {
            provider_refund_id: refund.id,
            provider_payment_id: provider_payment_id.to_string(),
            amount,
            status: refund.status.to_lowercase(),
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError> {
        let header_value =
            signature_header.ok_or_else(|| PaymentError::webhook("Missing signature header"))?;

        let header = SignatureHeader::parse(header_value)?;
        self.verify_signature(payload, &header)?;

        let event: PayPalWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse PayPal webhook payload");
            PaymentError::webhook(format!("Invalid JSON: {e}"))
        })?;

        let event_type = Self::canonical_event_type(&event.event_type);
        let amount = event
            .resource
            .get("amount")
            .and_then(|amount| amount.get("total").or_else(|| amount.get("value")))
            .and_then(serde_json::Value::as_str)
            .and_then(|value| value.parse::<f64>().ok());

        let data = json!({
            "payment_id": event.resource.get("id"),
            "status": event.resource.get("status"),
            "amount": amount,
        });
        let raw_payload: serde_json::Value =
            serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);

        tracing::info!(
            event_id = ?event.id,
            vendor_event_type = %event.event_type,
            canonical = %event_type,
            "PayPal webhook verified"
        );

        Ok(CanonicalEvent::new(
            event_type,
            PROVIDER_NAME,
            event.event_type,
            event.id,
            data,
            raw_payload,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PayPalVaultCard {
    brand: Option<String>,
    last_digits: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayPalVaultSource {
    card: Option<PayPalVaultCard>,
}

#[derive(Debug, Deserialize)]
struct PayPalVaultToken {
    id: String,
    payment_source: Option<PayPalVaultSource>,
}

#[derive(Debug, Deserialize)]
struct PayPalProduct {
    id: String,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayPalPlan {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayPalSubscription {
    id: String,
    #[serde(default = "default_active")]
    status: String,
}

fn default_active() -> String {
    "ACTIVE".to_string()
}

#[derive(Debug, Deserialize)]
struct PayPalLink {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PayPalOrder {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<PayPalLink>,
}

#[derive(Debug, Deserialize)]
struct PayPalRefund {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PayPalWebhookEvent {
    id: Option<String>,
    event_type: String,
    #[serde(default)]
    resource: serde_json::Value,
}
