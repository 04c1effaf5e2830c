//! In-memory processed event store.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::PaymentError;
use crate::ports::ProcessedEventStore;

/// In-memory `ProcessedEventStore`. Insertion under the mutex gives the
/// atomic check-and-record the port requires.
#[derive(Default)]
pub struct InMemoryProcessedEventStore {
    seen: Mutex<HashSet<String>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys recorded so far.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn check_and_record(&self, dedupe_key: &str) -> Result<bool, PaymentError> {
        Ok(self.seen.lock().unwrap().insert(dedupe_key.to_string()))
    }
}
