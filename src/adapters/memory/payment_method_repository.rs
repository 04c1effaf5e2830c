//! In-memory payment method repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, PaymentError, PaymentMethodId};
use crate::domain::payment_method::PaymentMethod;
use crate::ports::PaymentMethodRepository;

/// In-memory `PaymentMethodRepository`.
///
/// A single mutex guards the whole map, so clear-and-set runs as one
/// critical section.
#[derive(Default)]
pub struct InMemoryPaymentMethodRepository {
    methods: Mutex<HashMap<PaymentMethodId, PaymentMethod>>,
}

impl InMemoryPaymentMethodRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentMethodRepository for InMemoryPaymentMethodRepository {
    async fn create(&self, pm: &PaymentMethod) -> Result<(), PaymentError> {
        let mut methods = self.methods.lock().unwrap();
        if methods.contains_key(&pm.id) {
            return Err(PaymentError::state(format!(
                "payment method {} already exists",
                pm.id
            )));
        }
        if pm.is_default {
            for other in methods.values_mut() {
                if other.customer_id == pm.customer_id {
                    other.is_default = false;
                }
            }
        }
        methods.insert(pm.id, pm.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>, PaymentError> {
        Ok(self.methods.lock().unwrap().get(&id).cloned())
    }

    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        provider: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        let methods = self.methods.lock().unwrap();
        let mut result: Vec<PaymentMethod> = methods
            .values()
            .filter(|pm| pm.customer_id == customer_id)
            .filter(|pm| provider.map_or(true, |provider| pm.provider == provider))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn set_default(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError> {
        let mut methods = self.methods.lock().unwrap();

        let owned = methods
            .get(&id)
            .is_some_and(|pm| pm.customer_id == customer_id);
        if !owned {
            return Err(PaymentError::not_found("Payment method"));
        }

        for pm in methods.values_mut() {
            if pm.customer_id == customer_id {
                pm.is_default = pm.id == id;
            }
        }

        Ok(methods.get(&id).cloned().expect("checked above"))
    }

    async fn delete(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<(), PaymentError> {
        let mut methods = self.methods.lock().unwrap();
        let owned = methods
            .get(&id)
            .is_some_and(|pm| pm.customer_id == customer_id);
        if !owned {
            return Err(PaymentError::not_found("Payment method"));
        }
        methods.remove(&id);
        Ok(())
    }
}
