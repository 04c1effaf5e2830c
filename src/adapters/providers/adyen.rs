//! Adyen provider adapter.
//!
//! Checkout API calls authenticated with `X-API-Key`. Customers are Adyen
//! shopper references (minted locally), cards are tokenized through a
//! zero-value auth with `storePaymentMethod`, and notifications carry a
//! base64 HMAC-SHA256 over the colon-joined reference fields of each item.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
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

use super::signature;

const PROVIDER_NAME: &str = "adyen";
const LIVE_BASE_URL: &str = "https://checkout-live.adyen.com/v71";
const TEST_BASE_URL: &str = "https://checkout-test.adyen.com/v71";

fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn from_minor_units(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Adyen provider adapter.
#[derive(Debug)]
pub struct AdyenAdapter {
    config: ProviderConfig,
    base_url: String,
    merchant_account: String,
    http_client: reqwest::Client,
}

impl AdyenAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, PaymentError> {
        config.validate(PROVIDER_NAME)?;
        let merchant_account = config.setting("merchant_account")?.to_string();

        let base_url = config
            .additional_settings
            .get("api_base_url")
            .cloned()
            .unwrap_or_else(|| {
                if config.sandbox_mode {
                    TEST_BASE_URL.to_string()
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
            merchant_account,
            http_client,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, PaymentError> {
        self.http_client
            .post(format!("{}{}", self.base_url, path))
            .header("X-API-Key", self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::provider_transport(PROVIDER_NAME, e.to_string()))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(PaymentError::authentication("Adyen rejected API key"));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, error = %error_text, "Adyen API call failed");
            return Err(
                PaymentError::provider(PROVIDER_NAME, format!("Adyen API error ({status})"))
                    .with_vendor_error(error_text),
            );
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(PROVIDER_NAME, format!("Failed to parse Adyen response: {e}"))
        })
    }

    /// Computes the notification HMAC: base64(HMAC-SHA256(key, fields
    /// joined with ':')). The key is the hex-encoded HMAC key from the
    /// customer area.
    fn notification_hmac(&self, item: &AdyenNotificationItem) -> Result<String, PaymentError> {
        let key_hex = self.config.webhook_secret.expose_secret();
        let key = hex::decode(key_hex)
            .map_err(|_| PaymentError::configuration("adyen: webhook_secret must be hex"))?;

        let signed = [
            item.psp_reference.as_str(),
            item.original_reference.as_deref().unwrap_or(""),
            self.merchant_account.as_str(),
            item.merchant_reference.as_deref().unwrap_or(""),
            &item.amount.value.to_string(),
            item.amount.currency.as_str(),
            item.event_code.as_str(),
            item.success.as_str(),
        ]
        .join(":");

        let digest = signature::hmac_sha256(&key, signed.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(digest))
    }

    fn verify_notification(&self, item: &AdyenNotificationItem) -> Result<(), PaymentError> {
        let provided = item
            .additional_data
            .as_ref()
            .and_then(|data| data.hmac_signature.as_deref())
            .ok_or_else(|| PaymentError::webhook("Notification missing hmacSignature"))?;

        let expected = self.notification_hmac(item)?;
        if !signature::signatures_match(expected.as_bytes(), provided.as_bytes()) {
            tracing::warn!(psp_reference = %item.psp_reference, "Invalid Adyen notification HMAC");
            return Err(PaymentError::webhook("Invalid signature"));
        }
        Ok(())
    }

    fn canonical_event_type(event_code: &str, success: bool) -> CanonicalEventType {
        match (event_code, success) {
            ("AUTHORISATION", true) => CanonicalEventType::PaymentAuthorized,
            ("AUTHORISATION", false) => CanonicalEventType::PaymentFailed,
            ("CAPTURE", true) => CanonicalEventType::PaymentSucceeded,
            ("CAPTURE", false) => CanonicalEventType::PaymentFailed,
            ("REFUND", true) => CanonicalEventType::PaymentRefunded,
            ("PENDING", _) => CanonicalEventType::PaymentPending,
            _ => CanonicalEventType::Unhandled,
        }
    }

    fn charge_outcome_from_result(
        &self,
        result: AdyenPaymentResult,
        amount: f64,
        currency: String,
    ) -> Result<ChargeOutcome, PaymentError> {
        match result.result_code.as_str() {
            "Authorised" => Ok(ChargeOutcome {
                provider_payment_id: result.psp_reference.unwrap_or_default(),
                amount,
                currency,
                status: ChargeStatus::Succeeded,
                action: None,
                hosted_checkout: None,
            }),
            "Received" | "Pending" => Ok(ChargeOutcome {
                provider_payment_id: result.psp_reference.unwrap_or_default(),
                amount,
                currency,
                status: ChargeStatus::Pending,
                action: None,
                hosted_checkout: None,
            }),
            "RedirectShopper" | "IdentifyShopper" | "ChallengeShopper" => {
                let action_url = result.action.and_then(|action| action.url);
                Ok(ChargeOutcome {
                    provider_payment_id: result.psp_reference.unwrap_or_default(),
                    amount,
                    currency,
                    status: ChargeStatus::RequiresAction,
                    action: Some(NextAction {
                        action_url,
                        action_type: "3ds_authentication".to_string(),
                    }),
                    hosted_checkout: None,
                })
            }
            "Refused" | "Error" | "Cancelled" => {
                Err(PaymentError::provider(PROVIDER_NAME, "Payment declined")
                    .with_vendor_error(result.refusal_reason.unwrap_or_default()))
            }
            other => Err(PaymentError::provider(
                PROVIDER_NAME,
                format!("Unexpected result code '{other}'"),
            )),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AdyenAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_customer(
        &self,
        customer: NewCustomer,
    ) -> Result<ProviderCustomer, PaymentError> {
        // Adyen identifies shoppers by a merchant-chosen reference; there is
        // no shopper creation call.
        let reference = format!("shopperRef-{}", uuid::Uuid::new_v4().simple());

        tracing::debug!(shopper_reference = %reference, "Issued Adyen shopper reference");

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
        if !provider_customer_id.starts_with("shopperRef-") {
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
        let card = details.card.as_ref().ok_or_else(|| {
            PaymentError::validation("adyen payment methods require card details")
        })?;

        // Zero-value auth with storePaymentMethod tokenizes the card.
        let body = json!({
            "amount": { "currency": "USD", "value": 0 },
            "reference": format!("tokenize-{}", uuid::Uuid::new_v4().simple()),
            "merchantAccount": self.merchant_account,
            "shopperReference": provider_customer_id,
            "shopperInteraction": "Ecommerce",
            "recurringProcessingModel": "CardOnFile",
            "storePaymentMethod": true,
            "paymentMethod": {
                "type": "scheme",
                "number": card.number,
                "expiryMonth": format!("{:02}", card.exp_month),
                "expiryYear": card.exp_year.to_string(),
                "cvc": card.cvc,
            },
        });

        let response = self.post_json("/payments", &body).await?;
        let result: AdyenPaymentResult = Self::decode(response).await?;

        if result.result_code != "Authorised" {
            return Err(PaymentError::provider(PROVIDER_NAME, "Card tokenization failed")
                .with_vendor_error(result.refusal_reason.unwrap_or(result.result_code)));
        }

        let stored_id = result
            .additional_data
            .as_ref()
            .and_then(|data| data.recurring_detail_reference.clone())
            .or(result.psp_reference)
            .ok_or_else(|| {
                PaymentError::provider(PROVIDER_NAME, "Tokenization returned no reference")
            })?;

        let brand = result
            .additional_data
            .and_then(|data| data.payment_method)
            .unwrap_or_else(|| "card".to_string());

        Ok(ProviderPaymentMethod {
            payment_method_id: stored_id,
            method_type: brand.clone(),
            card: Some(CardSummary {
                brand,
                last4: card.last_four(),
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
        // No catalog API; products exist only as merchant references.
        Ok(ProviderProduct {
            provider_product_id: format!("PROD-{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            description: description.map(str::to_string),
            active: true,
        })
    }

    async fn create_price(&self, price: NewPrice) -> Result<ProviderPrice, PaymentError> {
        Ok(ProviderPrice {
            provider_price_id: format!("PRICE-{}", uuid::Uuid::new_v4().simple()),
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
        // Recurring billing on Adyen is merchant-initiated card-on-file
        // charges; the subscription schedule lives on our side.
        let now = Timestamp::now();
        Ok(ProviderSubscription {
            provider_subscription_id: format!("SUB-{}", uuid::Uuid::new_v4().simple()),
            customer_id: subscription.provider_customer_id,
            price_id: Some(subscription.price_id),
            quantity: subscription.quantity,
            status: "active".to_string(),
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
        let now = Timestamp::now();
        Ok(ProviderSubscription {
            provider_subscription_id: provider_subscription_id.to_string(),
            customer_id: String::new(),
            price_id: None,
            quantity: 1,
            status: if at_period_end {
                "active".to_string()
            } else {
                "canceled".to_string()
            },
            current_period_start: now.unix_seconds(),
            current_period_end: now.unix_seconds(),
            cancel_at_period_end: at_period_end,
        })
    }

    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let payment_method_id = request.payment_method_id.as_ref().ok_or_else(|| {
            PaymentError::validation("adyen charges require a stored payment method")
        })?;
        let shopper_reference = request.provider_customer_id.as_ref().ok_or_else(|| {
            PaymentError::validation("adyen charges require a shopper reference")
        })?;

        let body = json!({
            "amount": {
                "currency": request.currency,
                "value": to_minor_units(request.amount),
            },
            "reference": request
                .metadata
                .get("reference")
                .cloned()
                .unwrap_or_else(|| format!("payment-{}", uuid::Uuid::new_v4().simple())),
            "merchantAccount": self.merchant_account,
            "shopperReference": shopper_reference,
            "shopperInteraction": "ContAuth",
            "recurringProcessingModel": "CardOnFile",
            "paymentMethod": {
                "type": "scheme",
                "storedPaymentMethodId": payment_method_id,
            },
        });

        let response = self.post_json("/payments", &body).await?;
        let result: AdyenPaymentResult = Self::decode(response).await?;
        self.charge_outcome_from_result(result, request.amount, request.currency)
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        let mut body = json!({ "merchantAccount": self.merchant_account });
        if let Some(amount) = amount {
            body["amount"] = json!({ "currency": "USD", "value": to_minor_units(amount) });
        }

        let response = self
            .post_json(&format!("/payments/{provider_payment_id}/refunds"), &body)
            .await?;
        let refund: AdyenRefundResult = Self::decode(response).await?;

        Ok(RefundOutcome {
            provider_refund_id: refund.psp_reference,
            provider_payment_id: provider_payment_id.to_string(),
            amount,
            status: refund.status.to_lowercase(),
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError> {
        // The HMAC travels inside each notification item, not a header.
        let notification: AdyenNotification = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Adyen notification");
            PaymentError::webhook(format!("Invalid JSON: {e}"))
        })?;

        let item = notification
            .notification_items
            .into_iter()
            .next()
            .map(|wrapper| wrapper.notification_request_item)
            .ok_or_else(|| PaymentError::webhook("Notification contains no items"))?;

        self.verify_notification(&item)?;

        let success = item.success == "true";
        let event_type = Self::canonical_event_type(&item.event_code, success);

        let data = json!({
            "payment_id": item.psp_reference,
            "merchant_reference": item.merchant_reference,
            "amount": from_minor_units(item.amount.value),
            "currency": item.amount.currency,
            "status": if success { "succeeded" } else { "failed" },
        });
        let raw_payload: serde_json::Value =
            serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);

        tracing::info!(
            psp_reference = %item.psp_reference,
            event_code = %item.event_code,
            canonical = %event_type,
            "Adyen notification verified"
        );

        // pspReference repeats across event codes for one payment, so the
        // dedupe id includes the code.
        let vendor_event_id = format!("{}:{}", item.psp_reference, item.event_code);

        Ok(CanonicalEvent::new(
            event_type,
            PROVIDER_NAME,
            item.event_code,
            Some(vendor_event_id),
            data,
            raw_payload,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct AdyenAmount {
    currency: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
struct AdyenAdditionalData {
    #[serde(rename = "hmacSignature")]
    hmac_signature: Option<String>,
    #[serde(rename = "recurring.recurringDetailReference")]
    recurring_detail_reference: Option<String>,
    #[serde(rename = "paymentMethod")]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdyenAction {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdyenPaymentResult {
    #[serde(rename = "resultCode")]
    result_code: String,
    #[serde(rename = "pspReference")]
    psp_reference: Option<String>,
    #[serde(rename = "refusalReason")]
    refusal_reason: Option<String>,
    action: Option<AdyenAction>,
    #[serde(rename = "additionalData")]
    additional_data: Option<AdyenAdditionalData>,
}

#[derive(Debug, Deserialize)]
struct AdyenRefundResult {
    #[serde(rename = "pspReference")]
    psp_reference: String,
    #[serde(default = "default_received")]
    status: String,
}

fn default_received() -> String {
    "received".to_string()
}

#[derive(Debug, Deserialize)]
struct AdyenNotificationItem {
    #[serde(rename = "eventCode")]
    event_code: String,
    success: String,
    #[serde(rename = "pspReference")]
    psp_reference: String,
    #[serde(rename = "originalReference")]
    original_reference: Option<String>,
    #[serde(rename = "merchantReference")]
    merchant_reference: Option<String>,
    amount: AdyenAmount,
    #[serde(rename = "additionalData")]
    additional_data: Option<AdyenAdditionalData>,
}

#[derive(Debug, Deserialize)]
struct AdyenNotificationWrapper {
    #[serde(rename = "NotificationRequestItem")]
    notification_request_item: AdyenNotificationItem,
}

#[derive(Debug, Deserialize)]
struct AdyenNotification {
    #[serde(rename = "notificationItems", default)]
    notification_items: Vec<AdyenNotificationWrapper>,
}
