//! Directory-backed object store.
//!
//! Keys are `/`-separated relative paths under the store root. Writes go to a
//! hidden temp file first and are renamed into place, so a listing never
//! observes a half-written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use oppsync_shared::{OppSyncError, Result};

use crate::{ListPage, ObjectStore, validate_key};

/// Default listing page size, matching common object-store APIs.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| OppSyncError::io(&root, e))?;
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Limit the number of keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        if key.ends_with('/') {
            return Err(OppSyncError::Persistence(format!(
                "folder marker '{key}' cannot be stored as a file"
            )));
        }
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    /// Every stored key, sorted. Hidden entries (temp files) are skipped.
    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| OppSyncError::io(&dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| OppSyncError::io(&dir, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| OppSyncError::io(entry.path(), e))?;
                let key = format!("{key_prefix}{name}");

                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{key}/")));
                } else if file_type.is_file() {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| OppSyncError::Persistence(format!("no parent directory for '{key}'")))?;

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OppSyncError::io(parent, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| OppSyncError::io(&tmp, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(OppSyncError::io(&path, e));
        }

        debug!(key, bytes = body.len(), "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OppSyncError::io(&path, e)),
        }
    }

    /// Each page re-walks and re-sorts the whole tree, so draining `n` keys
    /// costs `O(n² / page_size)`. Fine for a local store of modest size.
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut matching = self
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.is_none_or(|after| key.as_str() > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).collect();
        let next = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };

        Ok(ListPage { keys, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (FsObjectStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("oppsync-fs-test-{}", Uuid::now_v7()));
        let store = FsObjectStore::open(&dir).await.expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn put_creates_nested_directories() {
        let (store, dir) = test_store().await;

        store
            .put("opportunity-inbound/42-abc.json", br#"{"version":"1"}"#)
            .await
            .unwrap();

        assert!(dir.join("opportunity-inbound").join("42-abc.json").exists());
        let body = store.get("opportunity-inbound/42-abc.json").await.unwrap();
        assert_eq!(body.as_deref(), Some(br#"{"version":"1"}"#.as_slice()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let (store, dir) = test_store().await;
        assert_eq!(store.get("nope/missing.json").await.unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn listing_is_sorted_paged_and_prefix_scoped() {
        let (store, dir) = test_store().await;
        let store = store.with_page_size(2);

        for name in ["c", "a", "d", "b"] {
            store
                .put(&format!("opportunity-inbound/{name}.json"), b"{}")
                .await
                .unwrap();
        }
        store.put("archive/z.json", b"{}").await.unwrap();
        // Stray temp file from an interrupted write is invisible.
        std::fs::write(dir.join("opportunity-inbound").join(".e.json.tmp"), b"").unwrap();

        let first = store.list_page("opportunity-inbound/", None).await.unwrap();
        assert_eq!(first.keys, vec!["opportunity-inbound/a.json", "opportunity-inbound/b.json"]);
        assert_eq!(first.next.as_deref(), Some("opportunity-inbound/b.json"));

        let all = store.list_all("opportunity-inbound/").await.unwrap();
        assert_eq!(
            all,
            vec![
                "opportunity-inbound/a.json",
                "opportunity-inbound/b.json",
                "opportunity-inbound/c.json",
                "opportunity-inbound/d.json",
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (store, dir) = test_store().await;
        let err = store.put("../outside.json", b"{}").await.unwrap_err();
        assert!(matches!(err, OppSyncError::Persistence(_)));
        assert!(store.put("folder/", b"").await.is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
