//! Change publisher: announce newly stored records on the event bus.
//!
//! Each cycle lists the record prefix, drops keys already marked as
//! published, sends one creation event per remaining key in a single batch
//! and marks the accepted keys. Rejected keys stay unmarked and are retried
//! on the next cycle. Overlapping cycles may both announce a key.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use oppsync_bus::EventBus;
use oppsync_shared::{AppConfig, CreationEvent, Result};
use oppsync_storage::{MarkerStore, ObjectStore};

/// Outcome of one publisher cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Keys found under the prefix, excluding the prefix marker.
    pub listed: usize,
    /// Listed keys skipped because they were announced before.
    pub already_published: usize,
    /// Keys announced and marked during this cycle.
    pub published: Vec<String>,
    /// Keys the bus rejected, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Publishes one creation event per new record under a store prefix.
pub struct ChangePublisher {
    store: Arc<dyn ObjectStore>,
    markers: Arc<dyn MarkerStore>,
    bus: Arc<dyn EventBus>,
    prefix: String,
    source: String,
    detail_type: String,
}

impl ChangePublisher {
    /// Build a publisher watching the configured publisher prefix, falling
    /// back to the pipeline's output prefix.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        markers: Arc<dyn MarkerStore>,
        bus: Arc<dyn EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            markers,
            bus,
            prefix: config.publisher_prefix().to_string(),
            source: config.bus.source.clone(),
            detail_type: config.bus.detail_type.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run one publish cycle.
    #[instrument(skip_all, fields(prefix = %self.prefix))]
    pub async fn publish_new_records(&self) -> Result<PublishSummary> {
        let listed: Vec<String> = self
            .store
            .list_all(&self.prefix)
            .await?
            .into_iter()
            .filter(|key| *key != self.prefix)
            .collect();

        let announced: HashSet<String> = self.markers.published_keys(&self.prefix).await?;
        let fresh: Vec<&String> = listed.iter().filter(|key| !announced.contains(*key)).collect();

        let mut summary = PublishSummary {
            listed: listed.len(),
            already_published: listed.len() - fresh.len(),
            ..PublishSummary::default()
        };

        if fresh.is_empty() {
            info!(listed = summary.listed, "nothing new to publish");
            return Ok(summary);
        }

        let events: Vec<CreationEvent> = fresh
            .iter()
            .map(|key| CreationEvent::new(&self.source, &self.detail_type, key))
            .collect();

        let outcomes = self.bus.publish(&events).await?;

        let mut accepted: HashSet<String> = HashSet::new();
        for outcome in outcomes {
            match outcome.error {
                None => {
                    accepted.insert(outcome.file_key);
                }
                Some(reason) => {
                    warn!(key = %outcome.file_key, %reason, "publish failed, will retry next cycle");
                    summary.failed.push((outcome.file_key, reason));
                }
            }
        }

        for key in &fresh {
            if accepted.contains(*key) {
                summary.published.push((*key).clone());
            } else if !summary.failed.iter().any(|(failed, _)| failed == *key) {
                warn!(key = %key, "bus returned no outcome, will retry next cycle");
                summary
                    .failed
                    .push(((*key).clone(), "no outcome returned".to_string()));
            }
        }

        self.markers.mark_published(&summary.published).await?;

        info!(
            published = summary.published.len(),
            failed = summary.failed.len(),
            skipped = summary.already_published,
            "publish cycle complete"
        );
        Ok(summary)
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    ///
    /// A failed cycle is logged and the loop keeps going. Returns the number
    /// of cycles run.
    pub async fn run_loop(&self, interval: Duration, shutdown: impl Future<Output = ()>) -> usize {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0usize;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles, "publisher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    if let Err(e) = self.publish_new_records().await {
                        error!(cycle = cycles, kind = e.kind(), error = %e, "publish cycle failed");
                    }
                }
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oppsync_bus::{EntryOutcome, MemoryEventBus};
    use oppsync_shared::OppSyncError;
    use oppsync_storage::{MemoryMarkerStore, MemoryObjectStore};

    struct Harness {
        store: Arc<MemoryObjectStore>,
        markers: Arc<MemoryMarkerStore>,
        bus: Arc<MemoryEventBus>,
        publisher: ChangePublisher,
    }

    fn harness_with(store: MemoryObjectStore, bus: MemoryEventBus) -> Harness {
        let store = Arc::new(store);
        let markers = Arc::new(MemoryMarkerStore::new());
        let bus = Arc::new(bus);
        let publisher = ChangePublisher::new(
            store.clone(),
            markers.clone(),
            bus.clone(),
            &AppConfig::default(),
        );
        Harness {
            store,
            markers,
            bus,
            publisher,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryObjectStore::new(), MemoryEventBus::new())
    }

    async fn seed(store: &MemoryObjectStore, keys: &[&str]) {
        for key in keys {
            store.put(key, b"{}").await.unwrap();
        }
    }

    #[tokio::test]
    async fn three_new_keys_go_out_in_one_batch() {
        let h = harness();
        seed(
            &h.store,
            &[
                "opportunity-inbound/1.json",
                "opportunity-inbound/2.json",
                "opportunity-inbound/3.json",
            ],
        )
        .await;

        let summary = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(summary.published.len(), 3);
        assert!(summary.failed.is_empty());
        assert_eq!(h.bus.batch_count(), 1);

        let events = h.bus.published();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.detail_type == "opportunityCreated"));
        assert_eq!(events[0].file_key(), "opportunity-inbound/1.json");

        let marked = h.markers.published_keys("opportunity-inbound/").await.unwrap();
        assert_eq!(marked.len(), 3);
    }

    #[tokio::test]
    async fn second_run_publishes_nothing() {
        let h = harness();
        seed(&h.store, &["opportunity-inbound/1.json", "opportunity-inbound/2.json"]).await;

        h.publisher.publish_new_records().await.unwrap();
        let second = h.publisher.publish_new_records().await.unwrap();

        assert!(second.published.is_empty());
        assert_eq!(second.already_published, 2);
        assert_eq!(h.bus.batch_count(), 1);
        assert_eq!(h.bus.published().len(), 2);
    }

    #[tokio::test]
    async fn prefix_marker_and_other_prefixes_are_ignored() {
        let h = harness();
        seed(
            &h.store,
            &["opportunity-inbound/", "opportunity-inbound/1.json", "archive/9.json"],
        )
        .await;

        let summary = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(summary.listed, 1);
        assert_eq!(summary.published, vec!["opportunity-inbound/1.json"]);
    }

    #[tokio::test]
    async fn empty_prefix_has_no_side_effects() {
        let h = harness();
        let summary = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(summary, PublishSummary::default());
        assert_eq!(h.bus.batch_count(), 0);
    }

    #[tokio::test]
    async fn listing_spanning_pages_is_drained() {
        let h = harness_with(MemoryObjectStore::with_page_size(2), MemoryEventBus::new());
        let keys: Vec<String> = (0..5).map(|i| format!("opportunity-inbound/{i}.json")).collect();
        for key in &keys {
            h.store.put(key, b"{}").await.unwrap();
        }

        let summary = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(summary.published, keys);
    }

    #[tokio::test]
    async fn rejected_key_is_retried_next_cycle() {
        let h = harness_with(
            MemoryObjectStore::new(),
            MemoryEventBus::rejecting(["opportunity-inbound/2.json"]),
        );
        seed(
            &h.store,
            &[
                "opportunity-inbound/1.json",
                "opportunity-inbound/2.json",
                "opportunity-inbound/3.json",
            ],
        )
        .await;

        let first = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(first.published.len(), 2);
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.failed[0].0, "opportunity-inbound/2.json");

        let second = h.publisher.publish_new_records().await.unwrap();
        assert_eq!(second.already_published, 2);
        assert_eq!(second.failed.len(), 1);
        assert_eq!(h.bus.batch_count(), 2);
    }

    struct DownBus;

    #[async_trait]
    impl EventBus for DownBus {
        async fn publish(&self, _events: &[CreationEvent]) -> Result<Vec<EntryOutcome>> {
            Err(OppSyncError::Publish("bus unreachable".into()))
        }
    }

    #[tokio::test]
    async fn failed_batch_marks_nothing() {
        let store = Arc::new(MemoryObjectStore::new());
        let markers = Arc::new(MemoryMarkerStore::new());
        seed(&store, &["opportunity-inbound/1.json"]).await;

        let publisher = ChangePublisher::new(
            store,
            markers.clone(),
            Arc::new(DownBus),
            &AppConfig::default(),
        );

        let err = publisher.publish_new_records().await.unwrap_err();
        assert!(matches!(err, OppSyncError::Publish(_)));
        assert!(markers.published_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn configured_prefix_overrides_inbound_prefix() {
        let mut config = AppConfig::default();
        config.publisher.prefix = "processed/".into();
        let publisher = ChangePublisher::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMarkerStore::new()),
            Arc::new(MemoryEventBus::new()),
            &config,
        );
        assert_eq!(publisher.prefix(), "processed/");
    }

    #[tokio::test]
    async fn publishes_under_configured_inbound_prefix() {
        let config: AppConfig = toml::from_str(
            r#"
[store]
inbound_prefix = "deals/"
"#,
        )
        .unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        seed(&store, &["deals/42-a.json", "opportunity-inbound/7-b.json"]).await;

        let publisher = ChangePublisher::new(
            store,
            Arc::new(MemoryMarkerStore::new()),
            bus.clone(),
            &config,
        );
        assert_eq!(publisher.prefix(), "deals/");

        let summary = publisher.publish_new_records().await.unwrap();
        assert_eq!(summary.listed, 1);
        assert_eq!(summary.published, vec!["deals/42-a.json"]);
        assert_eq!(bus.published()[0].file_key(), "deals/42-a.json");
    }

    #[tokio::test]
    async fn run_loop_announces_once_and_stops_on_shutdown() {
        let h = harness();
        seed(&h.store, &["opportunity-inbound/1.json"]).await;

        let cycles = h
            .publisher
            .run_loop(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(80)),
            )
            .await;

        assert!(cycles >= 2);
        assert_eq!(h.bus.batch_count(), 1);
        assert_eq!(h.bus.published().len(), 1);
    }
}
