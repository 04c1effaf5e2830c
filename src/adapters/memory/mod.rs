//! In-memory adapter implementations.
//!
//! Mutex-guarded maps behind the repository ports. The payment method
//! repository linearizes default changes under one lock, which is what the
//! single-default invariant requires of any real backend.

mod customer_repository;
mod event_publisher;
mod payment_method_repository;
mod processed_events;

pub use customer_repository::InMemoryCustomerRepository;
pub use event_publisher::{PublishedEvent, RecordingEventPublisher};
pub use payment_method_repository::InMemoryPaymentMethodRepository;
pub use processed_events::InMemoryProcessedEventStore;
