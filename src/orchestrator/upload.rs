//! Upload Engine: per-artifact upload with retry, provider-aware flags for
//! the policy-only cloud family, and timeout/cancellation via the ambient
//! context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::UploadConfig;
use crate::context::OpContext;
use crate::error::TenangError;
use crate::subprocess::SubprocessAdapter;

pub struct UploadEngine {
    adapter: Arc<dyn SubprocessAdapter>,
    config: UploadConfig,
    /// The backup root every artifact lives under, so the remote path can
    /// preserve the `<database>/<YYYY-MM>/<snapshot-name>/<files>` layout
    /// instead of collapsing every upload down to its bare filename.
    backup_root: PathBuf,
}

impl UploadEngine {
    pub fn new(adapter: Arc<dyn SubprocessAdapter>, config: UploadConfig, backup_root: PathBuf) -> Self {
        Self {
            adapter,
            config,
            backup_root,
        }
    }

    /// Uploads one artifact. Directory artifacts upload each contained
    /// regular file individually so a partial failure only affects the
    /// files not yet transferred.
    pub async fn upload(&self, ctx: &OpContext, local_path: &Path) -> Result<(), TenangError> {
        if self.config.is_policy_only_destination() {
            debug!(
                destination = %self.config.destination,
                "policy-only cloud destination: disabling object/bucket ACL overrides"
            );
        }

        let files = self.files_to_upload(local_path).await?;
        for file in files {
            self.upload_one_with_retry(ctx, &file).await?;
        }
        Ok(())
    }

    async fn files_to_upload(&self, local_path: &Path) -> Result<Vec<std::path::PathBuf>, TenangError> {
        let meta = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| TenangError::UploadFailed {
                path: local_path.to_path_buf(),
                reason: format!("stat-ing artifact before upload: {e}"),
            })?;

        if meta.is_file() {
            return Ok(vec![local_path.to_path_buf()]);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(local_path)
            .await
            .map_err(|e| TenangError::UploadFailed {
                path: local_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| TenangError::UploadFailed {
            path: local_path.to_path_buf(),
            reason: e.to_string(),
        })? {
            if entry
                .metadata()
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn upload_one_with_retry(
        &self,
        ctx: &OpContext,
        file: &Path,
    ) -> Result<(), TenangError> {
        let attempts = self.config.retry_count.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if ctx.is_cancelled() {
                return Err(TenangError::Cancelled);
            }

            match self.upload_one(ctx, file).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(file = %file.display(), attempt, error = %e, "upload attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(TenangError::UploadFailed {
            path: file.to_path_buf(),
            reason: "retry loop exited without an error or a result".to_string(),
        }))
    }

    async fn upload_one(&self, ctx: &OpContext, file: &Path) -> Result<(), TenangError> {
        let remote_path = self.remote_path_for(file);
        let timeout = Duration::from_secs(self.config.per_attempt_timeout_secs);
        let policy_only = self.config.is_policy_only_destination();

        ctx.run(timeout, async {
            self.adapter
                .upload_file(ctx, file, &remote_path, policy_only)
                .await
        })
        .await
    }

    /// Preserves the artifact's path relative to the backup root, e.g.
    /// `<database>/<YYYY-MM>/<snapshot-name>/<file>`, so two databases (or
    /// two runs of the same database) never collide on the same remote
    /// object. Falls back to the bare filename if the artifact somehow
    /// isn't under `backup_root` (same fallback `cleanup_engine` uses).
    fn remote_path_for(&self, local_file: &Path) -> String {
        let relative = local_file
            .strip_prefix(&self.backup_root)
            .unwrap_or(local_file);
        format!(
            "{}/{}",
            self.config.destination.trim_end_matches('/'),
            relative.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::fake::FakeSubprocessAdapter;

    #[tokio::test]
    async fn uploads_each_file_in_a_directory_artifact() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.sql"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("metadata"), b"y").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let engine = UploadEngine::new(
            adapter.clone(),
            UploadConfig {
                enabled: true,
                destination: "s3:bucket/backups".into(),
                ..UploadConfig::default()
            },
            dir.path().to_path_buf(),
        );

        let ctx = OpContext::new();
        engine.upload(&ctx, dir.path()).await.unwrap();
        assert_eq!(adapter.invocation_count(), 2);
    }

    /// The regression this guards against: two databases' snapshot
    /// directories both contain a file literally named `metadata`. Without
    /// preserving the path relative to the backup root, both uploads would
    /// land on the identical remote object `<destination>/metadata`.
    #[tokio::test]
    async fn remote_path_preserves_database_month_and_snapshot_segments() {
        let root = tempfile::tempdir().unwrap();
        let snapshot_dir = root
            .path()
            .join("orders")
            .join("2026-07")
            .join("orders-2026-07-31_00-00-00");
        tokio::fs::create_dir_all(&snapshot_dir).await.unwrap();
        tokio::fs::write(snapshot_dir.join("metadata"), b"y").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let engine = UploadEngine::new(
            adapter.clone(),
            UploadConfig {
                enabled: true,
                destination: "s3:bucket/backups".into(),
                ..UploadConfig::default()
            },
            root.path().to_path_buf(),
        );

        let ctx = OpContext::new();
        engine.upload(&ctx, &snapshot_dir).await.unwrap();

        let invocations = adapter.invocations.lock().unwrap();
        let remote_path = invocations
            .iter()
            .find_map(|i| match i {
                crate::subprocess::fake::Invocation::Upload { remote_path } => {
                    Some(remote_path.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(
            remote_path,
            "s3:bucket/backups/orders/2026-07/orders-2026-07-31_00-00-00/metadata"
        );
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.sql");
        tokio::fs::write(&file, b"x").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        *adapter.fail_upload.lock().unwrap() = true;

        let engine = UploadEngine::new(
            adapter.clone(),
            UploadConfig {
                enabled: true,
                destination: "rsync://host/backups".into(),
                retry_count: 2,
                ..UploadConfig::default()
            },
            dir.path().to_path_buf(),
        );

        let ctx = OpContext::new();
        let result = engine.upload(&ctx, &file).await;
        assert!(result.is_err());
        assert_eq!(adapter.invocation_count(), 2);
    }
}
