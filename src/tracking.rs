//! Tracking Store: per-database last-backup timestamps, persisted as a single
//! JSON document under the resolved state directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TenangError;

const TRACKING_FILE_NAME: &str = ".tenangdb_backup_tracking.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackingDocument {
    database_backups: HashMap<String, DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

pub struct TrackingStore {
    path: PathBuf,
    doc: Mutex<TrackingDocument>,
}

impl TrackingStore {
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(TRACKING_FILE_NAME)
    }

    /// Loads the document at `path` if present, otherwise starts empty.
    pub async fn load(path: PathBuf) -> Result<Self, TenangError> {
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrackingDocument::default(),
            Err(e) => {
                return Err(TenangError::TrackerIOFailed {
                    path: path.clone(),
                    source: e,
                })
            }
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Returns the recorded instant for `database`, or `None` if it has never
    /// completed a backup.
    pub async fn last_backup(&self, database: &str) -> Option<DateTime<Utc>> {
        self.doc.lock().await.database_backups.get(database).copied()
    }

    /// Records a successful backup at `when`. Enforces the monotonic-tracker
    /// invariant: a regression (an instant older than what's already on file)
    /// is silently clamped to the existing value rather than rejected, since
    /// clock skew between workers should never move the tracker backwards.
    pub async fn record_success(
        &self,
        database: &str,
        when: DateTime<Utc>,
    ) -> Result<(), TenangError> {
        let mut doc = self.doc.lock().await;
        let entry = doc.database_backups.entry(database.to_string()).or_insert(when);
        if when > *entry {
            *entry = when;
        }
        doc.last_updated = Some(Utc::now());
        let snapshot = serde_json::to_vec_pretty(&*doc).map_err(|e| TenangError::TrackerIOFailed {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        drop(doc);
        self.flush(&snapshot).await
    }

    async fn flush(&self, bytes: &[u8]) -> Result<(), TenangError> {
        atomic_write(&self.path, bytes)
            .await
            .map_err(|source| TenangError::TrackerIOFailed {
                path: self.path.clone(),
                source,
            })
    }
}

/// Writes to a sibling temp file, fsyncs, then renames over `path` so a
/// concurrent reader never observes a partial document.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("tracking.json")).await.unwrap();
        assert!(store.last_backup("orders").await.is_none());
    }

    #[tokio::test]
    async fn record_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.json");
        let store = TrackingStore::load(path.clone()).await.unwrap();
        let t = Utc::now();
        store.record_success("orders", t).await.unwrap();

        let reloaded = TrackingStore::load(path).await.unwrap();
        let recorded = reloaded.last_backup("orders").await.unwrap();
        assert_eq!(recorded.timestamp_millis(), t.timestamp_millis());
    }

    #[tokio::test]
    async fn tracker_never_regresses() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("tracking.json")).await.unwrap();
        let later = Utc::now();
        let earlier = later - ChronoDuration::hours(1);

        store.record_success("orders", later).await.unwrap();
        store.record_success("orders", earlier).await.unwrap();

        let recorded = store.last_backup("orders").await.unwrap();
        assert_eq!(recorded.timestamp_millis(), later.timestamp_millis());
    }
}
