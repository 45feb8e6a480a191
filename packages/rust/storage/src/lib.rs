//! Persistence for oppsync: the object store holding opportunity records and
//! the marker store remembering which keys were already announced.
//!
//! - [`ObjectStore`]: `put`/`get`/paged `list_page`; [`ObjectStore::list_all`]
//!   drains every page so callers never see a truncated listing.
//! - [`FsObjectStore`]: directory-backed store (keys map to relative paths).
//! - [`MarkerStore`]: the published-key set, persisted by
//!   [`LibsqlMarkerStore`].
//! - [`MemoryObjectStore`] / [`MemoryMarkerStore`]: in-process doubles.

mod fs;
mod markers;
mod memory;
mod migrations;

use async_trait::async_trait;
use oppsync_shared::{OppSyncError, Result};

pub use fs::FsObjectStore;
pub use markers::{LibsqlMarkerStore, MarkerStore};
pub use memory::{MemoryMarkerStore, MemoryObjectStore};

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in ascending order.
    pub keys: Vec<String>,
    /// Token to pass back for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Flat key/value object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `key`, replacing any previous object.
    async fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List keys starting with `prefix`, resuming after `continuation`.
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    /// List every key under `prefix`, following continuation tokens to the end.
    async fn list_all(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(prefix, continuation.as_deref()).await?;
            pages += 1;
            keys.extend(page.keys);

            match page.next {
                Some(next) if continuation.as_deref() == Some(next.as_str()) => {
                    return Err(OppSyncError::Persistence(format!(
                        "listing '{prefix}' returned the same continuation token twice"
                    )));
                }
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        tracing::debug!(prefix, pages, keys = keys.len(), "listing drained");
        Ok(keys)
    }
}

/// Reject keys that would escape the store or address nothing.
///
/// A single trailing `/` is allowed: object stores use such keys as folder
/// markers.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let body = key.strip_suffix('/').unwrap_or(key);
    if body.is_empty()
        || body.starts_with('/')
        || body.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(OppSyncError::Persistence(format!("invalid object key '{key}'")));
    }
    Ok(())
}
