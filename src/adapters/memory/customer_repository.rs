//! In-memory customer repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::customer::{Customer, ProviderLink};
use crate::domain::foundation::{CustomerId, PaymentError};
use crate::ports::{CustomerQuery, CustomerRepository};

#[derive(Default)]
struct Store {
    customers: HashMap<CustomerId, Customer>,
    links: Vec<ProviderLink>,
}

/// In-memory `CustomerRepository`.
#[derive(Default)]
pub struct InMemoryCustomerRepository {
    store: Mutex<Store>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn create(&self, customer: &Customer) -> Result<(), PaymentError> {
        let mut store = self.store.lock().unwrap();
        if store.customers.contains_key(&customer.id) {
            return Err(PaymentError::state(format!(
                "customer {} already exists",
                customer.id
            )));
        }
        store.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, PaymentError> {
        Ok(self.store.lock().unwrap().customers.get(&id).cloned())
    }

    async fn update(&self, customer: &Customer) -> Result<(), PaymentError> {
        let mut store = self.store.lock().unwrap();
        if !store.customers.contains_key(&customer.id) {
            return Err(PaymentError::not_found("Customer"));
        }
        store.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn list(&self, query: CustomerQuery) -> Result<Vec<Customer>, PaymentError> {
        let store = self.store.lock().unwrap();

        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut customers: Vec<Customer> = store
            .customers
            .values()
            .filter(|customer| match &needle {
                Some(needle) => {
                    customer.email.to_lowercase().contains(needle)
                        || customer
                            .name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle))
                }
                None => true,
            })
            .cloned()
            .collect();

        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let customers = customers
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(customers)
    }

    async fn add_provider_link(&self, link: &ProviderLink) -> Result<(), PaymentError> {
        let mut store = self.store.lock().unwrap();
        let duplicate = store
            .links
            .iter()
            .any(|existing| existing.customer_id == link.customer_id && existing.provider == link.provider);
        if duplicate {
            return Err(PaymentError::state(format!(
                "customer {} is already linked to {}",
                link.customer_id, link.provider
            )));
        }
        store.links.push(link.clone());
        Ok(())
    }

    async fn get_provider_link(
        &self,
        customer_id: CustomerId,
        provider: &str,
    ) -> Result<Option<ProviderLink>, PaymentError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .links
            .iter()
            .find(|link| link.customer_id == customer_id && link.provider == provider)
            .cloned())
    }

    async fn list_provider_links(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<ProviderLink>, PaymentError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|link| link.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    fn customer(email: &str) -> Customer {
        Customer::new(email, Some("Test User".to_string()))
    }

    #[tokio::test]
    async fn create_and_get() {
        let repo = InMemoryCustomerRepository::new();
        let c = customer("a@example.com");
        repo.create(&c).await.unwrap();

        let fetched = repo.get(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@example.com");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let repo = InMemoryCustomerRepository::new();
        let c = customer("a@example.com");
        repo.create(&c).await.unwrap();
        assert_eq!(repo.create(&c).await.unwrap_err().code(), "state_error");
    }

    #[tokio::test]
    async fn update_missing_customer_is_not_found() {
        let repo = InMemoryCustomerRepository::new();
        let c = customer("a@example.com");
        assert_eq!(
            repo.update(&c).await.unwrap_err().code(),
            "resource_not_found"
        );
    }

    #[tokio::test]
    async fn list_searches_and_paginates_newest_first() {
        let repo = InMemoryCustomerRepository::new();

        let mut first = customer("alice@example.com");
        first.created_at = Timestamp::now().add_days(-2);
        let mut second = customer("bob@example.com");
        second.created_at = Timestamp::now().add_days(-1);
        let third = customer("alice.b@example.com");

        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();
        repo.create(&third).await.unwrap();

        let all = repo.list(CustomerQuery::new()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].email, "alice.b@example.com");
        assert_eq!(all[2].email, "alice@example.com");

        let alices = repo
            .list(CustomerQuery::new().with_search("alice"))
            .await
            .unwrap();
        assert_eq!(alices.len(), 2);

        let page = repo
            .list(CustomerQuery::new().with_limit(1).with_offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].email, "bob@example.com");
    }

    #[tokio::test]
    async fn provider_link_uniqueness_per_provider() {
        let repo = InMemoryCustomerRepository::new();
        let c = customer("a@example.com");
        repo.create(&c).await.unwrap();

        let link = ProviderLink::new(c.id, "stripe", "cus_123");
        repo.add_provider_link(&link).await.unwrap();

        let duplicate = ProviderLink::new(c.id, "stripe", "cus_456");
        assert_eq!(
            repo.add_provider_link(&duplicate).await.unwrap_err().code(),
            "state_error"
        );

        // A different provider is fine.
        let paypal = ProviderLink::new(c.id, "paypal", "CUSTOMER-1");
        repo.add_provider_link(&paypal).await.unwrap();

        let found = repo.get_provider_link(c.id, "stripe").await.unwrap();
        assert_eq!(found.unwrap().provider_customer_id, "cus_123");
        assert_eq!(repo.list_provider_links(c.id).await.unwrap().len(), 2);
    }
}
