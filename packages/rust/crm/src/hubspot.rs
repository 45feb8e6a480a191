//! REST client for the HubSpot CRM v3 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use oppsync_shared::{Company, CrmConfig, OppSyncError, Owner, Result};

use crate::{AssociationKind, CrmClient};

/// User-Agent string for CRM requests.
const USER_AGENT: &str = concat!("oppsync/", env!("CARGO_PKG_VERSION"));

/// Page size requested from the associations endpoint.
const ASSOCIATIONS_PAGE_LIMIT: &str = "500";

/// Property holding the note body.
const NOTE_BODY_PROPERTY: &str = "hs_note_body";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AssociationsPage {
    #[serde(default)]
    results: Vec<AssociatedObject>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct AssociatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse<P> {
    properties: P,
}

#[derive(Debug, Default, Deserialize)]
struct NoteProperties {
    #[serde(default)]
    hs_note_body: Option<String>,
}

// ---------------------------------------------------------------------------
// HubSpotClient
// ---------------------------------------------------------------------------

/// [`CrmClient`] backed by the HubSpot REST API with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HubSpotClient {
    client: Client,
    base_url: Url,
}

impl HubSpotClient {
    /// Build a client against `base_url` authenticating with `access_token`.
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OppSyncError::config(format!("invalid CRM base URL '{base_url}': {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| OppSyncError::config(format!("invalid CRM access token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| OppSyncError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Build a client from the `[crm]` config section.
    pub fn from_config(config: &CrmConfig, access_token: &str) -> Result<Self> {
        Self::new(
            &config.base_url,
            access_token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// GET `url` and decode a JSON body, mapping every failure to a lookup error.
    async fn get_json<T: DeserializeOwned>(
        &self,
        step: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| OppSyncError::lookup(step, format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OppSyncError::lookup(step, format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OppSyncError::lookup(step, format!("{url}: unexpected response shape: {e}")))
    }
}

#[async_trait]
impl CrmClient for HubSpotClient {
    #[instrument(skip(self))]
    async fn get_associations(&self, deal_id: &str, kind: AssociationKind) -> Result<Vec<String>> {
        let url = self.endpoint(&format!(
            "/crm/v3/objects/deals/{deal_id}/associations/{}",
            kind.as_str()
        ));

        let mut ids = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page: AssociationsPage = match after.as_deref() {
                Some(cursor) => {
                    self.get_json(
                        "associations",
                        &url,
                        &[("limit", ASSOCIATIONS_PAGE_LIMIT), ("after", cursor)],
                    )
                    .await?
                }
                None => {
                    self.get_json("associations", &url, &[("limit", ASSOCIATIONS_PAGE_LIMIT)])
                        .await?
                }
            };
            ids.extend(page.results.into_iter().map(|r| r.id));

            match page.paging.and_then(|p| p.next) {
                Some(next) if after.as_deref() == Some(next.after.as_str()) => {
                    return Err(OppSyncError::lookup(
                        "associations",
                        format!("{url}: paging cursor '{}' repeated", next.after),
                    ));
                }
                Some(next) => after = Some(next.after),
                None => break,
            }
        }

        debug!(count = ids.len(), "associations fetched");
        Ok(ids)
    }

    #[instrument(skip(self, fields))]
    async fn get_company(&self, company_id: &str, fields: &[&str]) -> Result<Company> {
        let url = self.endpoint(&format!("/crm/v3/objects/companies/{company_id}"));
        let properties = fields.join(",");

        let response: ObjectResponse<Company> = self
            .get_json("company", &url, &[("properties", properties.as_str())])
            .await?;
        Ok(response.properties)
    }

    #[instrument(skip(self))]
    async fn get_owner(&self, owner_id: &str) -> Result<Owner> {
        let url = self.endpoint(&format!("/crm/v3/owners/{owner_id}"));
        self.get_json("owner", &url, &[]).await
    }

    #[instrument(skip(self))]
    async fn get_note(&self, note_id: &str) -> Result<String> {
        let url = self.endpoint(&format!("/crm/v3/objects/notes/{note_id}"));

        let response: ObjectResponse<NoteProperties> = self
            .get_json(
                "note",
                &url,
                &[("properties", NOTE_BODY_PROPERTY), ("archived", "false")],
            )
            .await?;
        Ok(response.properties.hs_note_body.unwrap_or_default())
    }
}
