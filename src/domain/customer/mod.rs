//! Customer aggregate and per-provider registration links.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerId, Timestamp};

/// A customer known to the orchestration engine.
///
/// Customers are created on first registration and are never hard-deleted by
/// this engine (deletion is a collaborator concern). Metadata is mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    pub name: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: Timestamp,
}

impl Customer {
    /// Creates a new customer record.
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: CustomerId::new(),
            email: email.into(),
            name,
            metadata: HashMap::new(),
            created_at: Timestamp::now(),
        }
    }

    /// Replaces the metadata map wholesale.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Merges new metadata entries over existing ones.
    pub fn merge_metadata(&mut self, entries: HashMap<String, String>) {
        self.metadata.extend(entries);
    }
}

/// Link between a customer and their identity at one payment provider.
///
/// At most one link exists per (customer, provider) pair. Links are created
/// lazily the first time a customer transacts with a given provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLink {
    pub customer_id: CustomerId,
    pub provider: String,
    pub provider_customer_id: String,
    pub created_at: Timestamp,
}

impl ProviderLink {
    /// Creates a new link for the given provider-side customer id.
    pub fn new(
        customer_id: CustomerId,
        provider: impl Into<String>,
        provider_customer_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            provider: provider.into(),
            provider_customer_id: provider_customer_id.into(),
            created_at: Timestamp::now(),
        }
    }
}
