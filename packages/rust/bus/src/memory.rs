//! In-process bus recording published events, used by tests and dry runs.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use oppsync_shared::{CreationEvent, Result};

use crate::{EntryOutcome, EventBus};

/// [`EventBus`] that keeps every accepted event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventBus {
    published: Mutex<Vec<CreationEvent>>,
    batches: Mutex<usize>,
    reject_keys: HashSet<String>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that rejects events referencing any of `keys`.
    pub fn rejecting<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reject_keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Accepted events, in publish order.
    pub fn published(&self) -> Vec<CreationEvent> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of `publish` calls received.
    pub fn batch_count(&self) -> usize {
        *self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, events: &[CreationEvent]) -> Result<Vec<EntryOutcome>> {
        *self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;

        let mut published = self
            .published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(events
            .iter()
            .map(|event| {
                if self.reject_keys.contains(event.file_key()) {
                    EntryOutcome::rejected(event.file_key(), "rejected by test bus")
                } else {
                    published.push(event.clone());
                    EntryOutcome::accepted(event.file_key())
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_accepted_events_only() {
        let bus = MemoryEventBus::rejecting(["in/b.json"]);
        let events = vec![
            CreationEvent::new("oppsync", "opportunityCreated", "in/a.json"),
            CreationEvent::new("oppsync", "opportunityCreated", "in/b.json"),
        ];

        let outcomes = bus.publish(&events).await.unwrap();
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.batch_count(), 1);
    }
}
