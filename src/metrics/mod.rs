//! Metrics Store: in-memory snapshot mirrored to an atomically-replaced JSON
//! file, read independently by the Exporter Daemon.

pub mod exporter;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::TenangError;
use crate::tracking::atomic_write;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PerDatabaseCounters {
    pub backup_success_total: u64,
    pub backup_failed_total: u64,
    pub backup_duration_seconds: f64,
    pub backup_size_bytes: u64,
    pub backup_last_timestamp: Option<i64>,
    pub upload_success_total: u64,
    pub upload_failed_total: u64,
    pub upload_duration_seconds: f64,
    pub restore_success_total: u64,
    pub restore_failed_total: u64,
    pub restore_duration_seconds: f64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CleanupAggregates {
    pub cleanup_files_removed_total: u64,
    pub cleanup_bytes_freed_total: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub databases: HashMap<String, PerDatabaseCounters>,
    pub cleanup: CleanupAggregates,
    pub total_databases: u64,
    pub backup_process_active: bool,
    pub system_health: bool,
    pub last_process_timestamp: Option<i64>,
}

/// Holds the in-memory snapshot plus the file path it mirrors to. When
/// `enabled` is false, every mutator is a no-op and no file is ever created.
pub struct MetricsStore {
    path: Option<PathBuf>,
    snapshot: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            snapshot: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    fn enabled(&self) -> bool {
        self.path.is_some()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Re-reads the on-disk snapshot most recently flushed by whichever
    /// process owns this file (the backup/cleanup/restore process). This is
    /// what the Exporter Daemon calls on every scrape — it never mutates,
    /// and never shares, the writer's in-memory `snapshot`. A transiently
    /// missing or unparsable file (e.g. mid-rename, or not created yet
    /// because metrics are disabled) degrades to a zeroed snapshot rather
    /// than failing the scrape.
    pub async fn read_from_file(&self) -> MetricsSnapshot {
        let Some(path) = &self.path else {
            return MetricsSnapshot::default();
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => MetricsSnapshot::default(),
        }
    }

    pub async fn set_process_active(&self, active: bool) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        s.backup_process_active = active;
        s.last_process_timestamp = Some(Utc::now().timestamp());
        s.system_health = true;
        self.flush(&s).await
    }

    pub async fn set_total_databases(&self, count: u64) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        s.total_databases = count;
        self.flush(&s).await
    }

    pub async fn record_backup_success(
        &self,
        database: &str,
        duration: std::time::Duration,
        size_bytes: u64,
        at: DateTime<Utc>,
    ) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.backup_success_total += 1;
        entry.backup_duration_seconds = duration.as_secs_f64();
        entry.backup_size_bytes = size_bytes;
        entry.backup_last_timestamp = Some(at.timestamp());
        self.flush(&s).await
    }

    pub async fn record_backup_failure(&self, database: &str) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.backup_failed_total += 1;
        self.flush(&s).await
    }

    pub async fn record_upload_success(
        &self,
        database: &str,
        duration: std::time::Duration,
    ) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.upload_success_total += 1;
        entry.upload_duration_seconds = duration.as_secs_f64();
        self.flush(&s).await
    }

    pub async fn record_upload_failure(&self, database: &str) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.upload_failed_total += 1;
        self.flush(&s).await
    }

    pub async fn record_restore_success(
        &self,
        database: &str,
        duration: std::time::Duration,
    ) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.restore_success_total += 1;
        entry.restore_duration_seconds = duration.as_secs_f64();
        self.flush(&s).await
    }

    pub async fn record_restore_failure(&self, database: &str) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        let entry = s.databases.entry(database.to_string()).or_default();
        entry.restore_failed_total += 1;
        self.flush(&s).await
    }

    pub async fn record_cleanup(
        &self,
        files_removed: u64,
        bytes_freed: u64,
    ) -> Result<(), TenangError> {
        if !self.enabled() {
            return Ok(());
        }
        let mut s = self.snapshot.lock().await;
        s.cleanup.cleanup_files_removed_total += files_removed;
        s.cleanup.cleanup_bytes_freed_total += bytes_freed;
        self.flush(&s).await
    }

    async fn flush(&self, snapshot: &MetricsSnapshot) -> Result<(), TenangError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| TenangError::MetricsIOFailed {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        atomic_write(path, &bytes)
            .await
            .map_err(|source| TenangError::MetricsIOFailed {
                path: path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_never_writes_a_file() {
        let store = MetricsStore::disabled();
        store.set_process_active(true).await.unwrap();
        store
            .record_backup_success("orders", std::time::Duration::from_secs(1), 100, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.databases.len(), 0);
    }

    #[tokio::test]
    async fn enabled_store_flushes_and_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = MetricsStore::new(Some(path.clone()));
        store
            .record_backup_success("orders", std::time::Duration::from_secs(2), 4096, Utc::now())
            .await
            .unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        let reloaded: MetricsSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reloaded.databases["orders"].backup_success_total, 1);
    }

    #[tokio::test]
    async fn counters_are_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::new(Some(dir.path().join("metrics.json")));
        store.record_backup_failure("orders").await.unwrap();
        store.record_backup_failure("orders").await.unwrap();
        let snap = store.snapshot().await;
        assert_eq!(snap.databases["orders"].backup_failed_total, 2);
    }

    /// `read_from_file` is what the exporter process calls: a fresh store
    /// pointed at the same path a writer flushed to picks up that writer's
    /// state, even though the two `MetricsStore` instances never share an
    /// in-memory snapshot.
    #[tokio::test]
    async fn read_from_file_observes_another_store_s_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let writer = MetricsStore::new(Some(path.clone()));
        writer
            .record_backup_success("orders", std::time::Duration::from_secs(3), 2048, Utc::now())
            .await
            .unwrap();

        let reader = MetricsStore::new(Some(path));
        let snap = reader.read_from_file().await;
        assert_eq!(snap.databases["orders"].backup_success_total, 1);
        // The reader's own in-memory snapshot stays untouched by the read.
        assert_eq!(reader.snapshot().await.databases.len(), 0);
    }

    #[tokio::test]
    async fn read_from_file_tolerates_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::new(Some(dir.path().join("not-written-yet.json")));
        let snap = store.read_from_file().await;
        assert_eq!(snap.total_databases, 0);
        assert!(!snap.system_health);
    }

    #[tokio::test]
    async fn read_from_file_on_disabled_store_returns_default() {
        let store = MetricsStore::disabled();
        let snap = store.read_from_file().await;
        assert_eq!(snap.total_databases, 0);
    }
}
