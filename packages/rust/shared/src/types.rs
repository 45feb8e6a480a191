//! Core domain types for oppsync: inbound webhooks, CRM records, and the
//! opportunity document written to the object store.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// DealId
// ---------------------------------------------------------------------------

/// Identifier of a CRM deal. Webhooks send it as a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DealId(pub String);

impl DealId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DealId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for DealId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "objectId must be a string or number, got {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookEvent
// ---------------------------------------------------------------------------

/// A property value as delivered by the CRM webhook, with its metadata
/// (timestamp, source, versions, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyEnvelope {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PropertyEnvelope {
    /// Bare value as text. `null` and a missing value both yield `None`.
    pub fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Change notification for one CRM deal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "objectId", default)]
    pub object_id: Option<DealId>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyEnvelope>,
}

impl WebhookEvent {
    /// Strip metadata from every property. See [`FlatProperties`].
    pub fn flatten(&self) -> FlatProperties {
        FlatProperties::from_envelopes(&self.properties)
    }
}

/// A webhook as delivered by a trigger: either bare or wrapped in a bus
/// envelope whose `detail` carries the event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Wrapped { detail: WebhookEvent },
    Bare(WebhookEvent),
}

impl WebhookPayload {
    pub fn into_event(self) -> WebhookEvent {
        match self {
            Self::Wrapped { detail } => detail,
            Self::Bare(event) => event,
        }
    }
}

// ---------------------------------------------------------------------------
// FlatProperties
// ---------------------------------------------------------------------------

/// Deal properties reduced to `name -> value`.
///
/// `dealname`, `closedate` and `hubspot_owner_id` are always present; when
/// the webhook omits them (or sends `null`) they default to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatProperties(BTreeMap<String, String>);

impl FlatProperties {
    pub const DEAL_NAME: &'static str = "dealname";
    pub const CLOSE_DATE: &'static str = "closedate";
    pub const OWNER_ID: &'static str = "hubspot_owner_id";

    const REQUIRED: [&'static str; 3] = [Self::DEAL_NAME, Self::CLOSE_DATE, Self::OWNER_ID];

    pub fn from_envelopes(envelopes: &HashMap<String, PropertyEnvelope>) -> Self {
        let mut map: BTreeMap<String, String> = Self::REQUIRED
            .iter()
            .map(|key| (key.to_string(), String::new()))
            .collect();

        for (name, envelope) in envelopes {
            if let Some(value) = envelope.text() {
                map.insert(name.clone(), value);
            }
        }

        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn deal_name(&self) -> &str {
        self.get(Self::DEAL_NAME).unwrap_or_default()
    }

    pub fn close_date(&self) -> &str {
        self.get(Self::CLOSE_DATE).unwrap_or_default()
    }

    pub fn owner_id(&self) -> &str {
        self.get(Self::OWNER_ID).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CRM records
// ---------------------------------------------------------------------------

/// CRM company associated with a deal. `None` means the CRM did not return
/// the field (absent or `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    /// GICS sector code as stored on the CRM company.
    #[serde(default, rename = "secteur_gics")]
    pub industry_sector: Option<String>,
}

impl Company {
    /// Property names requested from the CRM for a company lookup.
    pub const FIELDS: [&'static str; 5] = ["name", "domain", "country", "zip", "secteur_gics"];
}

/// CRM user owning a deal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// OpportunityRecord
// ---------------------------------------------------------------------------

/// The document persisted for each processed webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityRecord {
    pub version: String,
    pub spms_id: String,
    pub opportunities: Vec<OpportunityDetail>,
}

/// One opportunity inside an [`OpportunityRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityDetail {
    pub status: String,
    pub customer_company_name: String,
    pub country: String,
    pub postal_code: String,
    pub customer_title: String,
    pub customer_phone: String,
    pub customer_last_name: String,
    pub customer_first_name: String,
    pub customer_email: String,
    pub customer_website: String,
    pub partner_project_title: String,
    pub delivery_model: String,
    pub expected_monthly_aws_revenue: f64,
    pub partner_primary_need_from_aws: String,
    pub target_close_date: String,
    pub primary_contact_last_name: String,
    pub primary_contact_first_name: String,
    pub primary_contact_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    pub project_description: String,
    #[serde(rename = "aWSAccountOwnerName")]
    pub aws_account_owner_name: String,
    #[serde(rename = "aWSAccountOwnerEmail")]
    pub aws_account_owner_email: String,
    pub aws_account_id: String,
}

// ---------------------------------------------------------------------------
// CreationEvent
// ---------------------------------------------------------------------------

/// Bus event announcing that a record landed in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationEvent {
    pub id: Uuid,
    pub source: String,
    pub detail_type: String,
    pub time: DateTime<Utc>,
    pub detail: CreationDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationDetail {
    pub file_key: String,
}

impl CreationEvent {
    pub fn new(source: &str, detail_type: &str, file_key: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.to_string(),
            detail_type: detail_type.to_string(),
            time: Utc::now(),
            detail: CreationDetail {
                file_key: file_key.to_string(),
            },
        }
    }

    pub fn file_key(&self) -> &str {
        &self.detail.file_key
    }
}
