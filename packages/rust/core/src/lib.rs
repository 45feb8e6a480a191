//! Core domain logic for oppsync.
//!
//! This crate holds the enrichment pipeline (webhook event → CRM lookups →
//! normalized opportunity record in the store) and the change publisher
//! (new store keys → creation events on the bus).

pub mod industry;
pub mod mapping;
pub mod pipeline;
pub mod publisher;
pub mod sanitize;

pub use pipeline::{EnrichmentPipeline, ProcessOutcome, ProgressReporter, SilentProgress};
pub use publisher::{ChangePublisher, PublishSummary};
