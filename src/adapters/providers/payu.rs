//! PayU provider adapter.
//!
//! PayU is a hosted-redirect rail: a charge produces a signed form payload
//! the payer posts to the PayU checkout page, and the outcome arrives later
//! as a server-to-server callback. Requests and responses are signed with
//! salted SHA-512 over two different field sequences.
//!
//! Request hash input:
//! `key|txnid|amount|productinfo|firstname|email|udf1..udf10|SALT`
//!
//! Response hash input (reversed, with the salt up front):
//! `[additional_charges|]SALT|status[|splitInfo]|||||||udf10..udf1 reversed
//! as udf1..udf10|email|firstname|productinfo|amount|txnid|key`

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha512};

use crate::config::ProviderConfig;
use crate::domain::foundation::{PaymentError, Timestamp};
use crate::domain::webhook::{CanonicalEvent, CanonicalEventType};
use crate::ports::{
    ChargeOutcome, ChargeRequest, ChargeStatus, CustomerUpdate, HostedCheckout, NewCustomer,
    NewPrice, NewSubscription, PaymentMethodDetails, ProviderAdapter, ProviderCustomer,
    ProviderPaymentMethod, ProviderPrice, ProviderProduct, ProviderSubscription, RefundOutcome,
};

use super::signature;

const PROVIDER_NAME: &str = "payu";
const LIVE_CHECKOUT_URL: &str = "https://secure.payu.in/_payment";
const TEST_CHECKOUT_URL: &str = "https://test.payu.in/_payment";

/// Forward sequence of fields signed on an outgoing checkout request.
const REQUEST_SEQUENCE: [&str; 16] = [
    "key",
    "txnid",
    "amount",
    "productinfo",
    "firstname",
    "email",
    "udf1",
    "udf2",
    "udf3",
    "udf4",
    "udf5",
    "udf6",
    "udf7",
    "udf8",
    "udf9",
    "udf10",
];

/// Tail of the response sequence, appended after the salt, status, and the
/// six always-empty reserved slots.
const RESPONSE_TAIL: [&str; 16] = [
    "udf1",
    "udf2",
    "udf3",
    "udf4",
    "udf5",
    "udf6",
    "udf7",
    "udf8",
    "udf9",
    "udf10",
    "email",
    "firstname",
    "productinfo",
    "amount",
    "txnid",
    "key",
];

fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

fn generate_txn_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..25].to_string()
}

/// Stringifies a callback field; absent and null fields sign as empty.
fn payload_field(payload: &serde_json::Value, name: &str) -> String {
    match payload.get(name) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// PayU provider adapter.
#[derive(Debug)]
pub struct PayUAdapter {
    config: ProviderConfig,
    checkout_url: String,
}

impl PayUAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, PaymentError> {
        config.validate(PROVIDER_NAME)?;
        if config.api_secret.is_none() {
            return Err(PaymentError::configuration(
                "payu: api_secret (merchant salt) is required",
            ));
        }

        let checkout_url = config
            .additional_settings
            .get("checkout_url")
            .cloned()
            .unwrap_or_else(|| {
                if config.sandbox_mode {
                    TEST_CHECKOUT_URL.to_string()
                } else {
                    LIVE_CHECKOUT_URL.to_string()
                }
            });

        Ok(Self {
            config,
            checkout_url,
        })
    }

    fn merchant_key(&self) -> &str {
        self.config.api_key.expose_secret()
    }

    fn merchant_salt(&self) -> &str {
        self.config
            .api_secret
            .as_ref()
            .map(|salt| salt.expose_secret().as_str())
            .unwrap_or_default()
    }

    /// Signs an outgoing checkout request over the forward field sequence.
    fn sign_request(&self, fields: &[(String, String)]) -> String {
        let lookup = |name: &str| -> String {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        };

        let mut parts: Vec<String> = REQUEST_SEQUENCE.iter().map(|name| lookup(name)).collect();
        parts.push(self.merchant_salt().to_string());
        sha512_hex(&parts.join("|"))
    }

    /// Signs a callback payload over the reversed response sequence.
    fn sign_response(&self, payload: &serde_json::Value) -> String {
        let mut components: Vec<String> = Vec::new();

        let additional_charges = payload_field(payload, "additional_charges");
        if !additional_charges.is_empty() {
            components.push(additional_charges);
        }

        components.push(self.merchant_salt().to_string());
        components.push(payload_field(payload, "status"));

        let split_info = payload_field(payload, "splitInfo");
        if !split_info.is_empty() {
            components.push(split_info);
        }

        // Six reserved slots, always empty.
        components.extend(std::iter::repeat(String::new()).take(6));

        for name in RESPONSE_TAIL {
            components.push(payload_field(payload, name));
        }

        sha512_hex(&components.join("|"))
    }

    /// Verifies the `hash` field of a callback, case-insensitively.
    fn verify_response_hash(&self, payload: &serde_json::Value) -> Result<(), PaymentError> {
        let received = payload
            .get("hash")
            .and_then(serde_json::Value::as_str)
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| PaymentError::webhook("Missing PayU hash"))?;

        let expected = self.sign_response(payload);
        if !signature::hex_digests_match(&expected, received) {
            tracing::warn!("Invalid PayU callback hash");
            return Err(PaymentError::webhook("Invalid signature"));
        }
        Ok(())
    }

    /// Builds the ordered hosted-checkout form, hash last.
    fn build_checkout_fields(&self, request: &ChargeRequest, txnid: String) -> Vec<(String, String)> {
        let meta = |name: &str, fallback: &str| -> String {
            request
                .metadata
                .get(name)
                .cloned()
                .or_else(|| self.config.additional_settings.get(name).cloned())
                .unwrap_or_else(|| fallback.to_string())
        };

        let mut fields = vec![
            ("key".to_string(), self.merchant_key().to_string()),
            ("txnid".to_string(), txnid),
            ("amount".to_string(), format_amount(request.amount)),
            (
                "productinfo".to_string(),
                request
                    .description
                    .clone()
                    .unwrap_or_else(|| "Payment".to_string()),
            ),
            ("firstname".to_string(), meta("firstname", "Customer")),
            ("email".to_string(), meta("email", "customer@example.com")),
            ("phone".to_string(), meta("phone", "")),
            ("surl".to_string(), meta("surl", "https://example.test/success")),
            ("furl".to_string(), meta("furl", "https://example.test/failure")),
            (
                "service_provider".to_string(),
                "payu_paisa".to_string(),
            ),
        ];

        for i in 1..=10 {
            let name = format!("udf{i}");
            let value = request.metadata.get(&name).cloned().unwrap_or_default();
            fields.push((name, value));
        }

        let hash = self.sign_request(&fields);
        fields.push(("hash".to_string(), hash));
        fields
    }
}

#[async_trait]
impl ProviderAdapter for PayUAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_customer(
        &self,
        customer: NewCustomer,
    ) -> Result<ProviderCustomer, PaymentError> {
        // The hosted flow carries customer details per transaction; the
        // reference is local.
        Ok(ProviderCustomer {
            provider_customer_id: format!("payu-cust-{}", uuid::Uuid::new_v4().simple()),
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
        if !provider_customer_id.starts_with("payu-cust-") {
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
        _details: PaymentMethodDetails,
    ) -> Result<ProviderPaymentMethod, PaymentError> {
        // No vaulting: every charge redirects to the hosted page, so the
        // stored method is a marker.
        Ok(ProviderPaymentMethod {
            payment_method_id: format!("payu_hosted_{provider_customer_id}"),
            method_type: "hosted_checkout".to_string(),
            card: None,
            mandate_id: None,
        })
    }

    async fn create_product(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProviderProduct, PaymentError> {
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
        let txnid = request
            .metadata
            .get("txnid")
            .cloned()
            .unwrap_or_else(generate_txn_id);

        let fields = self.build_checkout_fields(&request, txnid.clone());
        let amount = fields
            .iter()
            .find(|(key, _)| key == "amount")
            .and_then(|(_, value)| value.parse::<f64>().ok())
            .unwrap_or(request.amount);

        tracing::info!(txnid = %txnid, amount, "Built PayU hosted checkout payload");

        // Settlement arrives later via the callback webhook.
        Ok(ChargeOutcome {
            provider_payment_id: txnid,
            amount,
            currency: request.currency,
            status: ChargeStatus::Pending,
            action: None,
            hosted_checkout: Some(HostedCheckout {
                action_url: self.checkout_url.clone(),
                method: "POST".to_string(),
                fields,
            }),
        })
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: Option<f64>,
    ) -> Result<RefundOutcome, PaymentError> {
        // Refunds go through the merchant web service, keyed on the PayU
        // payment id and signed with key|command|var1|salt.
        let command = "cancel_refund_transaction";
        let hash_input = format!(
            "{}|{}|{}|{}",
            self.merchant_key(),
            command,
            provider_payment_id,
            self.merchant_salt()
        );
        let _hash = sha512_hex(&hash_input);

        tracing::info!(payment_id = %provider_payment_id, amount = ?amount, "Submitted PayU refund request");

        Ok(RefundOutcome {
            provider_refund_id: format!("REFUND-{}", uuid::Uuid::new_v4().simple()),
            provider_payment_id: provider_payment_id.to_string(),
            amount,
            status: "queued".to_string(),
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<CanonicalEvent, PaymentError> {
        // The signature is the `hash` field inside the payload itself.
        let body: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse PayU callback");
            PaymentError::webhook(format!("Invalid JSON: {e}"))
        })?;

        self.verify_response_hash(&body)?;

        let status = payload_field(&body, "status").to_lowercase();
        let event_type = match status.as_str() {
            "success" => CanonicalEventType::PaymentSucceeded,
            "failure" => CanonicalEventType::PaymentFailed,
            _ => CanonicalEventType::PaymentPending,
        };

        let txnid = payload_field(&body, "txnid");
        let mihpayid = payload_field(&body, "mihpayid");
        let amount = payload_field(&body, "amount").parse::<f64>().ok();

        let data = serde_json::json!({
            "payment_id": txnid,
            "mihpayid": mihpayid,
            "amount": amount,
            "status": status,
        });

        tracing::info!(txnid = %txnid, status = %status, "PayU callback verified");

        let vendor_event_id = if !mihpayid.is_empty() {
            Some(mihpayid)
        } else if !txnid.is_empty() {
            Some(txnid)
        } else {
            None
        };

        Ok(CanonicalEvent::new(
            event_type,
            PROVIDER_NAME,
            status,
            vendor_event_id,
            data,
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_adapter() -> PayUAdapter {
        PayUAdapter::new(
            ProviderConfig::new("merchant_key", "merchant_salt").with_api_secret("merchant_salt"),
        )
        .unwrap()
    }

    fn charge_request(amount: f64) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "INR".to_string(),
            provider_customer_id: None,
            payment_method_id: None,
            description: Some("Test order".to_string()),
            metadata: [
                ("firstname".to_string(), "Test".to_string()),
                ("email".to_string(), "test@example.com".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Builds a callback payload whose hash matches the adapter's salt.
    fn signed_callback(adapter: &PayUAdapter, status: &str) -> serde_json::Value {
        let mut payload = json!({
            "mihpayid": "403993715531234567",
            "txnid": "abc123",
            "amount": "10.00",
            "productinfo": "Test order",
            "firstname": "Test",
            "email": "test@example.com",
            "status": status,
            "key": "merchant_key",
        });
        let hash = adapter.sign_response(&payload);
        payload["hash"] = json!(hash);
        payload
    }

    #[test]
    fn new_requires_salt() {
        let result = PayUAdapter::new(ProviderConfig::new("key", "secret"));
        assert_eq!(result.unwrap_err().code(), "configuration_error");
    }

    #[test]
    fn request_hash_covers_forward_sequence() {
        let adapter = test_adapter();
        let fields = vec![
            ("key".to_string(), "merchant_key".to_string()),
            ("txnid".to_string(), "txn1".to_string()),
            ("amount".to_string(), "10.00".to_string()),
            ("productinfo".to_string(), "Widget".to_string()),
            ("firstname".to_string(), "Test".to_string()),
            ("email".to_string(), "test@example.com".to_string()),
        ];

        // key..email, ten empty udf slots, then the salt.
        let mut parts = vec!["merchant_key", "txn1", "10.00", "Widget", "Test", "test@example.com"];
        parts.extend(std::iter::repeat("").take(10));
        parts.push("merchant_salt");
        assert_eq!(adapter.sign_request(&fields), sha512_hex(&parts.join("|")));
    }

    #[test]
    fn response_hash_covers_reverse_sequence() {
        let adapter = test_adapter();
        let payload = json!({
            "status": "success",
            "email": "test@example.com",
            "firstname": "Test",
            "productinfo": "Widget",
            "amount": "10.00",
            "txnid": "txn1",
            "key": "merchant_key",
        });

        // salt, status, six reserved slots, ten empty udfs, then the
        // reversed request fields.
        let mut parts = vec!["merchant_salt", "success"];
        parts.extend(std::iter::repeat("").take(16));
        parts.extend(["test@example.com", "Test", "Widget", "10.00", "txn1", "merchant_key"]);
        assert_eq!(adapter.sign_response(&payload), sha512_hex(&parts.join("|")));
    }

    #[test]
    fn response_hash_includes_additional_charges_prefix() {
        let adapter = test_adapter();
        let bare = json!({"status": "success", "txnid": "t"});
        let charged = json!({"status": "success", "txnid": "t", "additional_charges": "5.00"});

        assert_ne!(adapter.sign_response(&bare), adapter.sign_response(&charged));

        let mut parts = vec!["5.00", "merchant_salt", "success"];
        parts.extend(std::iter::repeat("").take(20));
        parts.push("t");
        parts.push("");
        assert_eq!(adapter.sign_response(&charged), sha512_hex(&parts.join("|")));
    }

    #[tokio::test]
    async fn charge_builds_ordered_hosted_checkout() {
        let adapter = test_adapter();
        let outcome = adapter.process_payment(charge_request(10.0)).await.unwrap();

        assert_eq!(outcome.status, ChargeStatus::Pending);
        let checkout = outcome.hosted_checkout.expect("hosted checkout payload");
        assert_eq!(checkout.action_url, "https://test.payu.in/_payment");
        assert_eq!(checkout.method, "POST");

        let names: Vec<&str> = checkout.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            &names[..10],
            &[
                "key",
                "txnid",
                "amount",
                "productinfo",
                "firstname",
                "email",
                "phone",
                "surl",
                "furl",
                "service_provider"
            ]
        );
        assert_eq!(names.last(), Some(&"hash"));

        assert_eq!(checkout.field("amount"), Some("10.00"));
        assert_eq!(checkout.field("service_provider"), Some("payu_paisa"));
        assert_eq!(checkout.field("txnid").unwrap().len(), 25);

        // Hash must be recomputable from the emitted fields.
        let without_hash: Vec<(String, String)> = checkout
            .fields
            .iter()
            .filter(|(k, _)| k != "hash")
            .cloned()
            .collect();
        assert_eq!(
            checkout.field("hash"),
            Some(adapter.sign_request(&without_hash).as_str())
        );
    }

    #[test]
    fn success_callback_verifies_and_maps() {
        let adapter = test_adapter();
        let payload = signed_callback(&adapter, "success");

        let event = adapter
            .parse_webhook(payload.to_string().as_bytes(), None)
            .unwrap();

        assert_eq!(event.event_type, CanonicalEventType::PaymentSucceeded);
        assert_eq!(event.data["payment_id"], "abc123");
        assert_eq!(event.data["amount"], 10.0);
        assert_eq!(event.dedupe_key(), "payu:403993715531234567");
    }

    #[test]
    fn failure_callback_maps_to_payment_failed() {
        let adapter = test_adapter();
        let payload = signed_callback(&adapter, "failure");

        let event = adapter
            .parse_webhook(payload.to_string().as_bytes(), None)
            .unwrap();
        assert_eq!(event.event_type, CanonicalEventType::PaymentFailed);
    }

    #[test]
    fn callback_hash_comparison_is_case_insensitive() {
        let adapter = test_adapter();
        let mut payload = signed_callback(&adapter, "success");
        let upper = payload["hash"].as_str().unwrap().to_uppercase();
        payload["hash"] = json!(upper);

        assert!(adapter
            .parse_webhook(payload.to_string().as_bytes(), None)
            .is_ok());
    }

    #[test]
    fn mutated_callback_field_invalidates_hash() {
        let adapter = test_adapter();
        let mut payload = signed_callback(&adapter, "success");
        payload["amount"] = json!("99.00");

        let result = adapter.parse_webhook(payload.to_string().as_bytes(), None);
        assert_eq!(result.unwrap_err().code(), "webhook_error");
    }

    #[test]
    fn callback_without_hash_is_rejected() {
        let adapter = test_adapter();
        let payload = json!({"status": "success", "txnid": "abc"});

        let result = adapter.parse_webhook(payload.to_string().as_bytes(), None);
        assert!(result.unwrap_err().to_string().contains("Missing PayU hash"));
    }
}
