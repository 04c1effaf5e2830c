//! ProcessedEventStore port - webhook delivery deduplication.

use async_trait::async_trait;

use crate::domain::foundation::PaymentError;

/// Port for recording which webhook deliveries have already been handled.
///
/// `check_and_record` must be atomic: when two replicas race on the same
/// key, exactly one sees `true`.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Records the key and reports whether this is its first occurrence.
    ///
    /// Returns `true` when the key was not seen before (process the event),
    /// `false` when it was (acknowledge and skip).
    async fn check_and_record(&self, dedupe_key: &str) -> Result<bool, PaymentError>;
}
