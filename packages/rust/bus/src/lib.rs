//! Event bus publishing for oppsync.
//!
//! The change publisher hands a batch of [`CreationEvent`]s to an
//! [`EventBus`] and gets one [`EntryOutcome`] back per event, so a failure on
//! one entry never hides the others.

mod http;
mod memory;

use async_trait::async_trait;
use oppsync_shared::{CreationEvent, Result};

pub use http::HttpEventBus;
pub use memory::MemoryEventBus;

/// Delivery result for one event of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    /// Store key referenced by the event.
    pub file_key: String,
    /// `None` when the bus accepted the event.
    pub error: Option<String>,
}

impl EntryOutcome {
    pub fn accepted(file_key: &str) -> Self {
        Self {
            file_key: file_key.to_string(),
            error: None,
        }
    }

    pub fn rejected(file_key: &str, error: impl Into<String>) -> Self {
        Self {
            file_key: file_key.to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Destination for creation events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `events` as one batch.
    ///
    /// Returns one outcome per event, in input order. An `Err` means the batch
    /// could not be attempted at all (`OppSyncError::Publish`).
    async fn publish(&self, events: &[CreationEvent]) -> Result<Vec<EntryOutcome>>;
}
