//! Enrichment pipeline: webhook event → CRM lookups → stored opportunity.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use oppsync_crm::{AssociationKind, CrmClient};
use oppsync_shared::{
    AppConfig, Company, DealId, OppSyncError, OpportunityConfig, OpportunityRecord, Owner,
    Result, WebhookEvent,
};
use oppsync_storage::ObjectStore;

use crate::mapping::{EnrichedDeal, build_record, resolve_company};
use crate::sanitize::join_notes;

/// Result of processing one webhook event.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Store key the record was written under.
    pub key: String,
    pub deal_id: DealId,
    pub record: OpportunityRecord,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the record has been persisted.
    fn done(&self, outcome: &ProcessOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &ProcessOutcome) {}
}

/// Turns one [`WebhookEvent`] into one persisted [`OpportunityRecord`].
///
/// Collaborators are injected so tests can substitute in-memory fakes.
pub struct EnrichmentPipeline {
    crm: Arc<dyn CrmClient>,
    store: Arc<dyn ObjectStore>,
    constants: OpportunityConfig,
    default_company: Company,
    inbound_prefix: String,
    lookup_timeout: Duration,
}

impl EnrichmentPipeline {
    /// Build a pipeline using the record constants, default company, output
    /// prefix and lookup timeout from `config`.
    pub fn new(crm: Arc<dyn CrmClient>, store: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        Self {
            crm,
            store,
            constants: config.opportunity.clone(),
            default_company: Company::from(&config.default_company),
            inbound_prefix: config.store.inbound_prefix.clone(),
            lookup_timeout: Duration::from_secs(config.pipeline.lookup_timeout_secs),
        }
    }

    /// Override the per-lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Prefix every record key starts with.
    pub fn inbound_prefix(&self) -> &str {
        &self.inbound_prefix
    }

    /// Run the lookups and assemble the record without persisting it.
    #[instrument(skip_all, fields(deal_id = tracing::field::Empty))]
    pub async fn build_opportunity(&self, event: &WebhookEvent) -> Result<OpportunityRecord> {
        let deal_id = deal_id_of(event)?;
        tracing::Span::current().record("deal_id", deal_id.as_str());

        self.enrich_and_build(&deal_id, event, &SilentProgress)
            .await
            .inspect_err(|e| log_failure(&deal_id, e))
    }

    /// Run the full pipeline for one event and write the record to the store.
    ///
    /// Nothing is written unless every lookup and the date validation
    /// succeeded.
    #[instrument(skip_all, fields(deal_id = tracing::field::Empty))]
    pub async fn process_event(
        &self,
        event: &WebhookEvent,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessOutcome> {
        let deal_id = match deal_id_of(event) {
            Ok(id) => id,
            Err(e) => {
                error!(step = failure_step(&e), error = %e, "event rejected");
                return Err(e);
            }
        };
        tracing::Span::current().record("deal_id", deal_id.as_str());

        let result = async {
            let record = self.enrich_and_build(&deal_id, event, progress).await?;

            progress.phase("Writing record");
            let key = self.record_key(&deal_id);
            let body = serde_json::to_vec(&record)
                .map_err(|e| OppSyncError::Persistence(format!("failed to encode record: {e}")))?;
            self.store.put(&key, &body).await?;

            Ok::<_, OppSyncError>(ProcessOutcome {
                key,
                deal_id: deal_id.clone(),
                record,
            })
        }
        .await;

        match result {
            Ok(outcome) => {
                info!(key = %outcome.key, "opportunity stored");
                progress.done(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                log_failure(&deal_id, &e);
                Err(e)
            }
        }
    }

    async fn enrich_and_build(
        &self,
        deal_id: &DealId,
        event: &WebhookEvent,
        progress: &dyn ProgressReporter,
    ) -> Result<OpportunityRecord> {
        let properties = event.flatten();
        debug!(properties = properties.len(), "properties flattened");

        progress.phase("Fetching notes, company and owner");
        let (notes, company, owner) = tokio::try_join!(
            self.timed("notes", self.fetch_notes(deal_id)),
            self.timed("company", self.fetch_company(deal_id)),
            self.timed("owner", self.fetch_owner(properties.owner_id())),
        )?;

        progress.phase("Assembling record");
        let deal = EnrichedDeal {
            properties,
            company,
            owner,
            notes,
        };
        build_record(&deal, &self.constants)
    }

    /// Bound one lookup step by the configured timeout.
    async fn timed<T>(&self, step: &str, lookup: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| {
                OppSyncError::lookup(step, format!("timed out after {:?}", self.lookup_timeout))
            })?
    }

    async fn fetch_notes(&self, deal_id: &DealId) -> Result<String> {
        let note_ids = self
            .crm
            .get_associations(deal_id.as_str(), AssociationKind::Notes)
            .await?;

        let bodies = try_join_all(note_ids.iter().map(|id| self.crm.get_note(id))).await?;
        debug!(notes = bodies.len(), "note bodies fetched");
        Ok(join_notes(bodies.as_slice()))
    }

    async fn fetch_company(&self, deal_id: &DealId) -> Result<Company> {
        let company_ids = self
            .crm
            .get_associations(deal_id.as_str(), AssociationKind::Companies)
            .await?;

        let fetched = match company_ids.first() {
            Some(company_id) => Some(self.crm.get_company(company_id, &Company::FIELDS).await?),
            None => {
                debug!("no associated company, using default");
                None
            }
        };
        Ok(resolve_company(fetched, &self.default_company))
    }

    async fn fetch_owner(&self, owner_id: &str) -> Result<Owner> {
        if owner_id.trim().is_empty() {
            debug!("deal has no owner");
            return Ok(Owner::default());
        }
        self.crm.get_owner(owner_id).await
    }

    fn record_key(&self, deal_id: &DealId) -> String {
        format!("{}{}-{}.json", self.inbound_prefix, deal_id, Uuid::now_v7())
    }
}

/// The event's deal id, which must be a plain token (ASCII letters, digits,
/// `-` or `_`) since it is spliced into CRM paths and store keys.
fn deal_id_of(event: &WebhookEvent) -> Result<DealId> {
    let id = match &event.object_id {
        Some(id) if !id.as_str().trim().is_empty() => id,
        _ => return Err(OppSyncError::validation("deal id (objectId) is missing")),
    };

    let is_token = id
        .as_str()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !is_token {
        return Err(OppSyncError::validation(format!(
            "deal id (objectId) '{id}' is not a plain identifier"
        )));
    }
    Ok(id.clone())
}

/// Name of the pipeline step an error came from, for replay logs.
fn failure_step(err: &OppSyncError) -> &str {
    match err {
        OppSyncError::Lookup { step, .. } => step.as_str(),
        OppSyncError::Validation { .. } | OppSyncError::Parse { .. } => "validate",
        OppSyncError::Persistence(_) | OppSyncError::Io { .. } => "store",
        OppSyncError::Publish(_) => "publish",
        OppSyncError::Config { .. } => "config",
    }
}

fn log_failure(deal_id: &DealId, err: &OppSyncError) {
    error!(
        deal_id = %deal_id,
        step = failure_step(err),
        kind = err.kind(),
        error = %err,
        "event processing failed"
    );
}
