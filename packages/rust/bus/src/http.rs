//! Event bus over HTTP: every event is POSTed as JSON to one endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use tracing::{error, info, instrument};

use oppsync_shared::{BusConfig, CreationEvent, OppSyncError, Result};

use crate::{EntryOutcome, EventBus};

/// User-Agent string for bus requests.
const USER_AGENT: &str = concat!("oppsync/", env!("CARGO_PKG_VERSION"));

/// [`EventBus`] delivering events to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventBus {
    client: Client,
    endpoint: String,
}

impl HttpEventBus {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| OppSyncError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Build a bus from the `[bus]` config section.
    pub fn from_config(config: &BusConfig) -> Result<Self> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))
    }

    async fn send_event(&self, event: &CreationEvent) -> EntryOutcome {
        let response = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => EntryOutcome::accepted(event.file_key()),
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(key = event.file_key(), %status, "bus rejected event");
                EntryOutcome::rejected(event.file_key(), format!("HTTP {status} - {body}"))
            }
            Err(e) => {
                error!(key = event.file_key(), error = %e, "bus request failed");
                EntryOutcome::rejected(event.file_key(), format!("HTTP request failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, count = events.len()))]
    async fn publish(&self, events: &[CreationEvent]) -> Result<Vec<EntryOutcome>> {
        let outcomes = join_all(events.iter().map(|event| self.send_event(event))).await;

        let accepted = outcomes.iter().filter(|o| o.is_success()).count();
        info!(accepted, rejected = outcomes.len() - accepted, "batch delivered");

        Ok(outcomes)
    }
}
