//! Application services.
//!
//! The orchestrator and its collaborators wire the domain to the ports:
//! provider adapters for vendor calls, repositories for state, the event
//! publisher for downstream notification, and the processed-event store for
//! webhook deduplication.

mod orchestrator;
mod payment_methods;
mod webhooks;

pub use orchestrator::{ChargeCommand, PaymentOrchestrator, PricingCharge, StorageSession};
pub use payment_methods::PaymentMethodLifecycle;
pub use webhooks::{WebhookOutcome, WebhookProcessor};
