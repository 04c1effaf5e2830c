//! Ports - async trait seams between the domain and its collaborators.

mod customer_repository;
mod event_publisher;
mod payment_method_repository;
mod processed_event_store;
mod provider;

pub use customer_repository::{CustomerQuery, CustomerRepository};
pub use event_publisher::EventPublisher;
pub use payment_method_repository::PaymentMethodRepository;
pub use processed_event_store::ProcessedEventStore;
pub use provider::{
    CardDetails, ChargeOutcome, ChargeRequest, ChargeStatus, CustomerUpdate, HostedCheckout,
    NewCustomer, NewPrice, NewSubscription, NextAction, PaymentMethodDetails, ProviderAdapter,
    ProviderCustomer, ProviderPaymentMethod, ProviderPrice, ProviderProduct, ProviderSubscription,
    RefundOutcome,
};
