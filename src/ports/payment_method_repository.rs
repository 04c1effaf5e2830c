//! PaymentMethodRepository port.
//!
//! The single-default invariant lives at this seam: `set_default` performs
//! the read-check and both writes within one transactional unit so that
//! concurrent `set_default`/`delete` calls for the same customer are
//! linearized and can never leave two defaults or a dangling default.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, PaymentError, PaymentMethodId};
use crate::domain::payment_method::PaymentMethod;

/// Port for stored payment method persistence.
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    /// Persists a new payment method.
    ///
    /// When `pm.is_default` is set, every other method of the same customer
    /// is cleared within the same unit of work.
    async fn create(&self, pm: &PaymentMethod) -> Result<(), PaymentError>;

    /// Fetches a payment method by id. `Ok(None)` when absent.
    async fn get(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>, PaymentError>;

    /// Lists a customer's payment methods, optionally scoped to a provider.
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        provider: Option<&str>,
    ) -> Result<Vec<PaymentMethod>, PaymentError>;

    /// Atomically clears `is_default` on every other method owned by the
    /// customer and sets it on the target.
    ///
    /// Fails with `ResourceNotFound` when the target does not exist or does
    /// not belong to the customer.
    async fn set_default(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, PaymentError>;

    /// Removes a stored payment method.
    ///
    /// Deleting the current default leaves the customer with no default;
    /// no other method is promoted.
    async fn delete(
        &self,
        customer_id: CustomerId,
        id: PaymentMethodId,
    ) -> Result<(), PaymentError>;
}
