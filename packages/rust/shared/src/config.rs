//! Application configuration for oppsync.
//!
//! User config lives at `~/.oppsync/oppsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OppSyncError, Result};
use crate::types::Company;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "oppsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".oppsync";

// ---------------------------------------------------------------------------
// Config structs (matching oppsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CRM API settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Object store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Change publisher settings.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Enrichment pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Placeholder business fields written into every record.
    #[serde(default)]
    pub opportunity: OpportunityConfig,

    /// Company used to fill gaps when the deal's company is missing fields.
    #[serde(default)]
    pub default_company: DefaultCompanyConfig,
}

/// `[crm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Base URL of the CRM REST API.
    #[serde(default = "default_crm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the access token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_base_url(),
            access_token_env: default_access_token_env(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_crm_base_url() -> String {
    "https://api.hubapi.com".into()
}
fn default_access_token_env() -> String {
    "HUBSPOT_ACCESS_TOKEN".into()
}
fn default_http_timeout() -> u64 {
    30
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the filesystem object store.
    #[serde(default = "default_store_root")]
    pub root: String,

    /// Key prefix under which enriched records are written.
    #[serde(default = "default_inbound_prefix")]
    pub inbound_prefix: String,

    /// Maximum keys returned by a single listing page.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            inbound_prefix: default_inbound_prefix(),
            list_page_size: default_list_page_size(),
        }
    }
}

fn default_store_root() -> String {
    "~/oppsync-store".into()
}
fn default_inbound_prefix() -> String {
    "opportunity-inbound/".into()
}
fn default_list_page_size() -> usize {
    1000
}

/// `[bus]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// HTTP endpoint receiving creation events.
    #[serde(default = "default_bus_endpoint")]
    pub endpoint: String,

    /// `source` attribute stamped on every event.
    #[serde(default = "default_bus_source")]
    pub source: String,

    /// `detailType` attribute stamped on creation events.
    #[serde(default = "default_detail_type")]
    pub detail_type: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bus_endpoint(),
            source: default_bus_source(),
            detail_type: default_detail_type(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_bus_endpoint() -> String {
    "http://localhost:8080/events".into()
}
fn default_bus_source() -> String {
    "oppsync".into()
}
fn default_detail_type() -> String {
    "opportunityCreated".into()
}

/// `[publisher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Key prefix watched for new records. Empty means `store.inbound_prefix`.
    #[serde(default)]
    pub prefix: String,

    /// libSQL database holding the published-key markers.
    #[serde(default = "default_markers_db")]
    pub markers_db: String,

    /// Seconds between publisher cycles in watch mode.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            markers_db: default_markers_db(),
            interval_secs: default_interval(),
        }
    }
}

fn default_markers_db() -> String {
    "~/.oppsync/markers.db".into()
}
fn default_interval() -> u64 {
    60
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on each enrichment lookup (notes, company, owner).
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

fn default_lookup_timeout() -> u64 {
    20
}

/// `[opportunity]` section: constants copied verbatim into each record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityConfig {
    #[serde(default = "default_record_version")]
    pub version: String,
    #[serde(default = "default_spms_id")]
    pub spms_id: String,
    #[serde(default = "default_delivery_model")]
    pub delivery_model: String,
    #[serde(default = "default_expected_revenue")]
    pub expected_monthly_revenue: f64,
    #[serde(default = "default_primary_need")]
    pub partner_primary_need: String,
    #[serde(default = "default_account_owner_name")]
    pub account_owner_name: String,
    #[serde(default = "default_account_owner_email")]
    pub account_owner_email: String,
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            version: default_record_version(),
            spms_id: default_spms_id(),
            delivery_model: default_delivery_model(),
            expected_monthly_revenue: default_expected_revenue(),
            partner_primary_need: default_primary_need(),
            account_owner_name: default_account_owner_name(),
            account_owner_email: default_account_owner_email(),
            account_id: default_account_id(),
        }
    }
}

fn default_record_version() -> String {
    "1".into()
}
fn default_spms_id() -> String {
    "spmsId".into()
}
fn default_delivery_model() -> String {
    "Managed Services".into()
}
fn default_expected_revenue() -> f64 {
    100.0
}
fn default_primary_need() -> String {
    "For Visibility - No assistance needed".into()
}
fn default_account_owner_name() -> String {
    "TEST owner name".into()
}
fn default_account_owner_email() -> String {
    "test@test.com".into()
}
fn default_account_id() -> String {
    "111111111111".into()
}

/// `[default_company]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultCompanyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_company_domain")]
    pub domain: String,
    #[serde(default = "default_company_country")]
    pub country: String,
    #[serde(default = "default_company_zip")]
    pub zip: String,
    #[serde(default)]
    pub industry_sector: String,
}

impl Default for DefaultCompanyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            domain: default_company_domain(),
            country: default_company_country(),
            zip: default_company_zip(),
            industry_sector: String::new(),
        }
    }
}

impl From<&DefaultCompanyConfig> for Company {
    fn from(config: &DefaultCompanyConfig) -> Self {
        Self {
            name: Some(config.name.clone()),
            domain: Some(config.domain.clone()),
            country: Some(config.country.clone()),
            zip: Some(config.zip.clone()),
            industry_sector: Some(config.industry_sector.clone()),
        }
    }
}

fn default_company_domain() -> String {
    "theodo.fr".into()
}
fn default_company_country() -> String {
    "France".into()
}
fn default_company_zip() -> String {
    "75017".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.oppsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| OppSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.oppsync/oppsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OppSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| OppSyncError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Prefix the change publisher lists: `publisher.prefix`, or the
    /// pipeline output prefix when unset.
    pub fn publisher_prefix(&self) -> &str {
        if self.publisher.prefix.is_empty() {
            &self.store.inbound_prefix
        } else {
            &self.publisher.prefix
        }
    }

    /// Reject values that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("crm.base_url", &self.crm.base_url),
            ("bus.endpoint", &self.bus.endpoint),
        ];
        for (field, value) in urls {
            Url::parse(value).map_err(|e| {
                OppSyncError::config(format!("{field} '{value}' is not a valid URL: {e}"))
            })?;
        }

        if self.store.inbound_prefix.is_empty() {
            return Err(OppSyncError::config("store.inbound_prefix must not be empty"));
        }
        if self.store.list_page_size == 0 {
            return Err(OppSyncError::config("store.list_page_size must be at least 1"));
        }
        if self.pipeline.lookup_timeout_secs == 0 {
            return Err(OppSyncError::config("pipeline.lookup_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OppSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OppSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OppSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the CRM access token from the env var named in the config.
pub fn validate_access_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.crm.access_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(OppSyncError::config(format!(
            "CRM access token not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| OppSyncError::config("could not determine home directory"))?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("inbound_prefix"));
        assert!(toml_str.contains("HUBSPOT_ACCESS_TOKEN"));
        assert!(toml_str.contains("Managed Services"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[crm]
base_url = "http://localhost:9000"

[default_company]
country = "Belgium"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crm.base_url, "http://localhost:9000");
        assert_eq!(config.crm.access_token_env, "HUBSPOT_ACCESS_TOKEN");
        assert_eq!(config.default_company.country, "Belgium");
        assert_eq!(config.default_company.zip, "75017");
        assert_eq!(config.publisher.prefix, "");
        assert_eq!(config.publisher_prefix(), "opportunity-inbound/");
        assert_eq!(config.opportunity.expected_monthly_revenue, 100.0);
    }

    #[test]
    fn default_company_converts_to_company() {
        let company = Company::from(&DefaultCompanyConfig::default());
        assert_eq!(company.country.as_deref(), Some("France"));
        assert_eq!(company.domain.as_deref(), Some("theodo.fr"));
        assert_eq!(company.name.as_deref(), Some(""));
    }

    #[test]
    fn access_token_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.crm.access_token_env = "OPPSYNC_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = validate_access_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("access token not found"));
    }

    #[test]
    fn publisher_prefix_follows_inbound_prefix() {
        let config: AppConfig = toml::from_str(
            r#"
[store]
inbound_prefix = "deals/"
"#,
        )
        .expect("parse");
        assert_eq!(config.publisher_prefix(), "deals/");

        let config: AppConfig = toml::from_str(
            r#"
[store]
inbound_prefix = "deals/"

[publisher]
prefix = "processed/"
"#,
        )
        .expect("parse");
        assert_eq!(config.publisher_prefix(), "processed/");
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.bus.endpoint = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OppSyncError::Config { .. }));
        assert!(err.to_string().contains("bus.endpoint"));

        let mut config = AppConfig::default();
        config.pipeline.lookup_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/var/data").unwrap(), PathBuf::from("/var/data"));
        let expanded = expand_home("~/store").unwrap();
        assert!(expanded.ends_with("store"));
        assert!(!expanded.to_string_lossy().contains('~'));
    }
}
