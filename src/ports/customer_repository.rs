//! CustomerRepository port - persistence contract for customers and their
//! provider links.

use async_trait::async_trait;

use crate::domain::customer::{Customer, ProviderLink};
use crate::domain::foundation::{CustomerId, PaymentError};

/// Listing parameters: pagination plus substring search over email and name.
/// Results are ordered by creation time, newest first.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    pub limit: Option<usize>,
    pub offset: usize,
    pub search: Option<String>,
}

impl CustomerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// Port for customer persistence.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Persists a new customer.
    async fn create(&self, customer: &Customer) -> Result<(), PaymentError>;

    /// Fetches a customer by id. `Ok(None)` when absent.
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, PaymentError>;

    /// Updates an existing customer (email, name, metadata).
    async fn update(&self, customer: &Customer) -> Result<(), PaymentError>;

    /// Lists customers per the query, newest first.
    async fn list(&self, query: CustomerQuery) -> Result<Vec<Customer>, PaymentError>;

    /// Records a provider link.
    ///
    /// At most one link may exist per (customer, provider) pair; a duplicate
    /// is a state error.
    async fn add_provider_link(&self, link: &ProviderLink) -> Result<(), PaymentError>;

    /// Fetches the link for a (customer, provider) pair, if any.
    async fn get_provider_link(
        &self,
        customer_id: CustomerId,
        provider: &str,
    ) -> Result<Option<ProviderLink>, PaymentError>;

    /// All provider links for a customer.
    async fn list_provider_links(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<ProviderLink>, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that the trait is object-safe.
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CustomerRepository) {}

    #[test]
    fn query_builder_composes() {
        let query = CustomerQuery::new()
            .with_limit(20)
            .with_offset(40)
            .with_search("alice");
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, 40);
        assert_eq!(query.search.as_deref(), Some("alice"));
    }
}
