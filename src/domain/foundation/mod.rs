//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, and the error taxonomy that form the
//! vocabulary of the payment orchestration domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::PaymentError;
pub use ids::{CustomerId, PaymentId, PaymentMethodId, SubscriptionId};
pub use timestamp::Timestamp;
