//! Published-key markers backed by libSQL (offline mode).
//!
//! The change publisher records every key it has announced here so a later
//! listing pass skips it.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};

use oppsync_shared::{OppSyncError, Result};

use crate::migrations;

/// The set of store keys already announced on the event bus.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Announced keys starting with `prefix`.
    async fn published_keys(&self, prefix: &str) -> Result<HashSet<String>>;

    /// Record `keys` as announced. Already-marked keys are left untouched.
    async fn mark_published(&self, keys: &[String]) -> Result<()>;
}

fn storage_err(e: libsql::Error) -> OppSyncError {
    OppSyncError::Persistence(e.to_string())
}

/// [`MarkerStore`] persisted in a local libSQL database file.
pub struct LibsqlMarkerStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl LibsqlMarkerStore {
    /// Open or create the marker database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OppSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        OppSyncError::Persistence(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Number of recorded markers.
    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM published_keys", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as usize),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl MarkerStore for LibsqlMarkerStore {
    async fn published_keys(&self, prefix: &str) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key FROM published_keys WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )
            .await
            .map_err(storage_err)?;

        let mut keys = HashSet::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            keys.insert(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(keys)
    }

    async fn mark_published(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for key in keys {
            tx.execute(
                "INSERT OR IGNORE INTO published_keys (key, published_at) VALUES (?1, ?2)",
                params![key.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(count = keys.len(), "keys marked as published");
        Ok(())
    }
}
