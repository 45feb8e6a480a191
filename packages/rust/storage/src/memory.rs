//! In-process stores, used by tests and dry runs.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use oppsync_shared::Result;

use crate::{ListPage, MarkerStore, ObjectStore, validate_key};

/// Default listing page size, matching common object-store APIs.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// [`ObjectStore`] over an ordered in-memory map.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store returning at most `page_size` keys per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.objects
            .lock()
            .await
            .insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().await.get(key).cloned())
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.lock().await;
        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.is_none_or(|after| key.as_str() > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };

        Ok(ListPage { keys, next })
    }
}

/// [`MarkerStore`] over an in-memory set.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    keys: Mutex<HashSet<String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn published_keys(&self, prefix: &str) -> Result<HashSet<String>> {
        Ok(self
            .keys
            .lock()
            .await
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn mark_published(&self, keys: &[String]) -> Result<()> {
        self.keys.lock().await.extend(keys.iter().cloned());
        Ok(())
    }
}
