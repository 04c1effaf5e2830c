//! Provider configuration

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::PaymentError;

fn default_timeout_secs() -> u64 {
    30
}

/// Credentials and connection settings for one payment provider.
///
/// Secrets are wrapped so they never appear in debug output or logs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// API key (Stripe secret key, PayPal client id, Adyen X-API-Key,
    /// PayU merchant key).
    pub api_key: SecretString,

    /// Secondary credential where the provider needs one (PayPal client
    /// secret, PayU salt).
    pub api_secret: Option<SecretString>,

    /// Webhook signing secret.
    pub webhook_secret: SecretString,

    /// Route calls to the provider's sandbox environment.
    #[serde(default)]
    pub sandbox_mode: bool,

    /// HTTP timeout for provider calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Provider-specific extras (Adyen merchant account, PayU surl/furl).
    #[serde(default)]
    pub additional_settings: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_secret: None,
            webhook_secret: SecretString::new(webhook_secret.into()),
            sandbox_mode: true,
            timeout_secs: default_timeout_secs(),
            additional_settings: HashMap::new(),
        }
    }

    pub fn with_api_secret(mut self, api_secret: impl Into<String>) -> Self {
        self.api_secret = Some(SecretString::new(api_secret.into()));
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_settings.insert(key.into(), value.into());
        self
    }

    /// Fetches a required entry from `additional_settings`.
    pub fn setting(&self, key: &str) -> Result<&str, PaymentError> {
        self.additional_settings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| {
                PaymentError::configuration(format!("missing provider setting '{key}'"))
            })
    }

    /// Validate the configuration for the named provider.
    pub fn validate(&self, provider: &str) -> Result<(), PaymentError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(PaymentError::configuration(format!(
                "{provider}: api_key must not be empty"
            )));
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(PaymentError::configuration(format!(
                "{provider}: webhook_secret must not be empty"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PaymentError::configuration(format!(
                "{provider}: timeout_secs must be positive"
            )));
        }
        Ok(())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Top-level payments configuration: one entry per enabled provider.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Currency used when a charge request does not name one.
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_currency: default_currency(),
        }
    }
}

impl PaymentsConfig {
    /// Fetches the configuration for a provider by name.
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig, PaymentError> {
        self.providers.get(name).ok_or_else(|| {
            PaymentError::configuration(format!("provider '{name}' is not configured"))
        })
    }

    /// Validate all configured providers.
    pub fn validate(&self) -> Result<(), PaymentError> {
        for (name, config) in &self.providers {
            config.validate(name)?;
        }
        Ok(())
    }
}
