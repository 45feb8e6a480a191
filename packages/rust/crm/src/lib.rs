//! CRM lookups used to enrich deal webhooks.
//!
//! The pipeline only sees the [`CrmClient`] capability trait; the REST
//! transport lives in [`hubspot`].

mod hubspot;

use async_trait::async_trait;
use oppsync_shared::{Company, Owner, Result};

pub use hubspot::HubSpotClient;

/// Object type on the far side of a deal association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    Notes,
    Companies,
}

impl AssociationKind {
    /// Path segment used by the CRM associations endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Companies => "companies",
        }
    }
}

impl std::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only CRM capabilities needed by the enrichment pipeline.
///
/// Every failure (transport, HTTP status, unexpected body) is reported as
/// `OppSyncError::Lookup`.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Ids of the records of `kind` associated with the deal, in CRM order.
    async fn get_associations(&self, deal_id: &str, kind: AssociationKind) -> Result<Vec<String>>;

    /// Company record restricted to `fields`.
    async fn get_company(&self, company_id: &str, fields: &[&str]) -> Result<Company>;

    async fn get_owner(&self, owner_id: &str) -> Result<Owner>;

    /// Raw (markup-bearing) note body. A note without a body yields `""`.
    async fn get_note(&self, note_id: &str) -> Result<String>;
}
