//! Cleanup Engine: delete-after-upload-with-buffer (in-process, driven by the
//! UploadLedger) and age-based-with-cloud-verification (driven by a walk of
//! the backup root).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::{CleanupConfig, UploadConfig};
use crate::context::OpContext;
use crate::error::TenangError;
use crate::subprocess::SubprocessAdapter;
use crate::upload_ledger::UploadLedger;

#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    pub files_removed: u64,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

pub struct CleanupEngine {
    config: CleanupConfig,
    upload: UploadConfig,
    adapter: Arc<dyn SubprocessAdapter>,
}

impl CleanupEngine {
    pub fn new(config: CleanupConfig, upload: UploadConfig, adapter: Arc<dyn SubprocessAdapter>) -> Self {
        Self {
            config,
            upload,
            adapter,
        }
    }

    /// Delete-after-upload mode: consumes a ledger snapshot taken by the
    /// caller at invocation time, so entries added mid-pass are untouched.
    pub async fn run_delete_after_upload(&self, ledger: &UploadLedger) -> CleanupReport {
        let mut report = CleanupReport::default();
        let buffer = Duration::from_secs(self.config.upload_safety_buffer_secs.max(3600));
        let buffer = chrono::Duration::from_std(buffer).unwrap_or_default();

        for (path, uploaded_at) in ledger.snapshot() {
            if Utc::now().signed_duration_since(uploaded_at) < buffer {
                continue;
            }

            if self.config.dry_run {
                debug!(path = %path.display(), "dry-run: would delete uploaded artifact");
                continue;
            }

            match self.delete_path(&path).await {
                Ok(bytes) => {
                    report.files_removed += 1;
                    report.bytes_freed += bytes;
                    ledger.remove(&path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete uploaded artifact");
                    report.errors.push(e);
                }
            }
        }

        report
    }

    /// Age-based mode: walks `backup_root`, deleting regular files older
    /// than `max_age_days` subject to the database filter and, if enabled, a
    /// remote-list probe confirming the object is actually present remotely.
    pub async fn run_age_based(
        &self,
        ctx: &OpContext,
        backup_root: &Path,
    ) -> Result<CleanupReport, TenangError> {
        if !backup_root.exists() {
            return Err(TenangError::ConfigurationInvalid(format!(
                "backup root {} does not exist",
                backup_root.display()
            )));
        }

        let mut report = CleanupReport::default();
        let max_age = chrono::Duration::days(self.config.max_age_days as i64);
        let mut stack = vec![backup_root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cleanup: failed to read directory");
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            while let Some(entry) = match entries.next_entry().await {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "cleanup: failed to read directory entry");
                    report.errors.push(e.to_string());
                    None
                }
            } {
                let path = entry.path();
                let meta = match entry.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cleanup: stat failed");
                        report.errors.push(e.to_string());
                        continue;
                    }
                };

                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }

                if !self.matches_database_filter(&path) {
                    continue;
                }

                let age = match meta.modified() {
                    Ok(modified) => Utc::now().signed_duration_since(chrono::DateTime::<Utc>::from(modified)),
                    Err(_) => continue,
                };
                if age < max_age {
                    continue;
                }

                if self.config.verify_cloud_exists {
                    let remote_path = self.remote_path_for(&path, backup_root);
                    match self.adapter.remote_list(ctx, &remote_path).await {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "cleanup: remote probe failed");
                            report.errors.push(e.to_string());
                            continue;
                        }
                    }
                }

                if self.config.dry_run {
                    debug!(path = %path.display(), "dry-run: would delete aged artifact");
                    continue;
                }

                match self.delete_path(&path).await {
                    Ok(bytes) => {
                        report.files_removed += 1;
                        report.bytes_freed += bytes;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cleanup: delete failed");
                        report.errors.push(e);
                    }
                }
            }
        }

        Ok(report)
    }

    fn matches_database_filter(&self, path: &Path) -> bool {
        if self.config.database_filter.is_empty() {
            return true;
        }
        let path_str = path.to_string_lossy();
        self.config
            .database_filter
            .iter()
            .any(|db| path_str.contains(db.as_str()))
    }

    fn remote_path_for(&self, local_path: &Path, backup_root: &Path) -> String {
        let relative = local_path.strip_prefix(backup_root).unwrap_or(local_path);
        format!(
            "{}/{}",
            self.upload.destination.trim_end_matches('/'),
            relative.display()
        )
    }

    async fn delete_path(&self, path: &Path) -> Result<u64, String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| e.to_string())?;
        let size = meta.len();
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await.map_err(|e| e.to_string())?;
        } else {
            tokio::fs::remove_file(path).await.map_err(|e| e.to_string())?;
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupMode;
    use crate::subprocess::fake::FakeSubprocessAdapter;
    use filetime::FileTime;

    fn set_old_mtime(path: &Path, days_ago: i64) {
        let time = FileTime::from_unix_time(
            (Utc::now() - chrono::Duration::days(days_ago)).timestamp(),
            0,
        );
        filetime::set_file_mtime(path, time).unwrap();
    }

    #[tokio::test]
    async fn age_based_deletes_only_confirmed_present_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.sql");
        let absent = dir.path().join("absent.sql");
        tokio::fs::write(&present, b"x").await.unwrap();
        tokio::fs::write(&absent, b"x").await.unwrap();
        set_old_mtime(&present, 10);
        set_old_mtime(&absent, 10);

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        adapter.set_remote_present(
            &format!("s3:bucket/backups/present.sql"),
            true,
        );

        let engine = CleanupEngine::new(
            CleanupConfig {
                mode: CleanupMode::AgeBased,
                max_age_days: 7,
                verify_cloud_exists: true,
                ..CleanupConfig::default()
            },
            UploadConfig {
                destination: "s3:bucket/backups".into(),
                ..UploadConfig::default()
            },
            adapter,
        );

        let ctx = OpContext::new();
        let report = engine.run_age_based(&ctx, dir.path()).await.unwrap();
        assert_eq!(report.files_removed, 1);
        assert!(!present.exists());
        assert!(absent.exists());
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.sql");
        tokio::fs::write(&file, b"x").await.unwrap();
        set_old_mtime(&file, 10);

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let engine = CleanupEngine::new(
            CleanupConfig {
                mode: CleanupMode::AgeBased,
                max_age_days: 7,
                verify_cloud_exists: false,
                dry_run: true,
                ..CleanupConfig::default()
            },
            UploadConfig::default(),
            adapter,
        );

        let ctx = OpContext::new();
        let report = engine.run_age_based(&ctx, dir.path()).await.unwrap();
        assert_eq!(report.files_removed, 0);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn delete_after_upload_respects_safety_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let recent = dir.path().join("recent.sql");
        let old = dir.path().join("old.sql");
        tokio::fs::write(&recent, b"x").await.unwrap();
        tokio::fs::write(&old, b"x").await.unwrap();

        let ledger = UploadLedger::new();
        ledger.record(recent.clone(), Utc::now());
        ledger.record(old.clone(), Utc::now() - chrono::Duration::hours(3));

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let engine = CleanupEngine::new(
            CleanupConfig {
                upload_safety_buffer_secs: 3600,
                ..CleanupConfig::default()
            },
            UploadConfig::default(),
            adapter,
        );

        let report = engine.run_delete_after_upload(&ledger).await;
        assert_eq!(report.files_removed, 1);
        assert!(!old.exists());
        assert!(recent.exists());
    }
}
