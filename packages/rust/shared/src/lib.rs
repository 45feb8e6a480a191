//! Shared types, error model, and configuration for oppsync.
//!
//! This crate is the foundation depended on by all other oppsync crates.
//! It provides:
//! - [`OppSyncError`]: the unified error type
//! - Domain types ([`WebhookEvent`], [`Company`], [`Owner`], [`OpportunityRecord`], [`CreationEvent`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BusConfig, CrmConfig, DefaultCompanyConfig, OpportunityConfig, PipelineConfig,
    PublisherConfig, StoreConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, validate_access_token,
};
pub use error::{OppSyncError, Result};
pub use types::{
    Company, CreationDetail, CreationEvent, DealId, FlatProperties, OpportunityDetail, OpportunityRecord, Owner,
    PropertyEnvelope, WebhookEvent, WebhookPayload,
};
