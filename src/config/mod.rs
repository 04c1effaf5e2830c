//! Configuration

mod provider;

pub use provider::{PaymentsConfig, ProviderConfig};
