//! Payment provider adapters.
//!
//! One module per vendor, plus a mock for tests. All adapters are registered
//! in a `ProviderRegistry` and resolved by name at call time.

mod adyen;
mod mock;
mod paypal;
mod payu;
mod signature;
mod stripe;

pub use adyen::AdyenAdapter;
pub use mock::{MockBehavior, MockProviderAdapter, RecordedCall, DECLINE_CARD, STEP_UP_CARD};
pub use paypal::PayPalAdapter;
pub use payu::PayUAdapter;
pub use stripe::StripeAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::PaymentError;
use crate::ports::ProviderAdapter;

/// Registry of configured provider adapters, keyed by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name. Re-registering a name
    /// replaces the previous adapter.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Resolves an adapter by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>, PaymentError> {
        self.adapters.get(name).cloned().ok_or_else(|| {
            PaymentError::configuration(format!("provider '{name}' is not registered"))
        })
    }

    /// Names of all registered providers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_configuration_error() {
        let registry = ProviderRegistry::new();
        let err = registry.get("stripe").unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderAdapter::new("stripe")));
        registry.register(Arc::new(MockProviderAdapter::new("payu")));

        assert!(registry.get("stripe").is_ok());
        assert_eq!(registry.names(), vec!["payu", "stripe"]);
    }
}
