//! Restore Driver: resolves a snapshot's physical shape, decompresses if
//! needed, and delegates to the matching restore tool via the Provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::context::OpContext;
use crate::error::TenangError;
use crate::provider::Provider;
use crate::subprocess::{recognized_archive_suffix, ArtifactShape, SubprocessAdapter};

pub struct RestoreOptions {
    /// Resolved by the caller (an explicit `--yes` or an answered two-tier
    /// prompt) before the target's existence is even known to matter here;
    /// this is the last line of defense against a caller that skips that
    /// resolution and passes `false` against an existing target.
    pub confirm_overwrite: bool,
}

pub struct RestoreDriver {
    adapter: Arc<dyn SubprocessAdapter>,
}

impl RestoreDriver {
    pub fn new(adapter: Arc<dyn SubprocessAdapter>) -> Self {
        Self { adapter }
    }

    /// `target_exists` is resolved by the caller via
    /// `Provider::database_exists` before invoking restore, so this method
    /// stays testable without a live database connection.
    pub async fn restore(
        &self,
        ctx: &OpContext,
        provider: &Provider,
        artifact_path: &Path,
        target_db: &str,
        target_exists: bool,
        opts: &RestoreOptions,
    ) -> Result<(), TenangError> {
        self.check_safety(target_exists, opts)?;

        let mut temp_dir_guard: Option<tempfile::TempDir> = None;
        let resolved_path: PathBuf = if recognized_archive_suffix(artifact_path) {
            let temp_dir = tempfile::tempdir().map_err(|e| TenangError::DecompressionFailed {
                path: artifact_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let dest = self
                .adapter
                .decompress(ctx, artifact_path, temp_dir.path())
                .await?;
            temp_dir_guard = Some(temp_dir);
            dest
        } else {
            artifact_path.to_path_buf()
        };

        let shape = self.classify(&resolved_path).await?;
        let result = provider
            .restore_backup(ctx, self.adapter.as_ref(), &shape, target_db)
            .await;

        // Temporary decompressed directory is removed regardless of outcome.
        drop(temp_dir_guard);

        result?;
        info!(target_db, "✅ restore completed");
        Ok(())
    }

    fn check_safety(&self, target_exists: bool, opts: &RestoreOptions) -> Result<(), TenangError> {
        if target_exists && !opts.confirm_overwrite {
            return Err(TenangError::RestoreToolFailed {
                target_db: String::new(),
                exit_code: None,
                stderr: "target database exists; refusing to overwrite without confirmation"
                    .to_string(),
            });
        }
        Ok(())
    }

    async fn classify(&self, path: &Path) -> Result<ArtifactShape, TenangError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| TenangError::ArtifactVerificationFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(path).await.map_err(|e| {
                TenangError::ArtifactVerificationFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            // A decompressed archive commonly unpacks into a single nested
            // directory; recurse one level if that's the only entry.
            let mut single_child = None;
            let mut count = 0;
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                TenangError::ArtifactVerificationFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })? {
                count += 1;
                single_child = Some(entry.path());
            }
            if count == 1 {
                if let Some(child) = single_child {
                    if tokio::fs::metadata(&child).await.map(|m| m.is_dir()).unwrap_or(false) {
                        return Ok(ArtifactShape::Directory(child));
                    }
                }
            }
            Ok(ArtifactShape::Directory(path.to_path_buf()))
        } else {
            Ok(ArtifactShape::File(path.to_path_buf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::subprocess::fake::FakeSubprocessAdapter;

    fn test_provider() -> ProviderConfig {
        ProviderConfig {
            name: "orders".into(),
            db_type: None,
            host: "localhost".into(),
            port: 3306,
            username: "root".into(),
            password: String::new(),
            defaults_file: None,
            connect_timeout_secs: 10,
            engine: Default::default(),
        }
    }

    #[tokio::test]
    async fn restores_a_plain_file_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.sql");
        tokio::fs::write(&file, b"create table t (id int);").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let driver = RestoreDriver::new(adapter.clone());
        let provider = Provider::for_config(test_provider()).unwrap();
        let ctx = OpContext::new();

        driver
            .restore(
                &ctx,
                &provider,
                &file,
                "orders_restored",
                false,
                &RestoreOptions {
                    confirm_overwrite: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(adapter.invocation_count(), 1);
    }

    #[tokio::test]
    async fn refuses_to_overwrite_existing_target_without_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.sql");
        tokio::fs::write(&file, b"create table t (id int);").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let driver = RestoreDriver::new(adapter.clone());
        let provider = Provider::for_config(test_provider()).unwrap();
        let ctx = OpContext::new();

        let result = driver
            .restore(
                &ctx,
                &provider,
                &file,
                "orders",
                true,
                &RestoreOptions {
                    confirm_overwrite: false,
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(adapter.invocation_count(), 0);
    }

    #[tokio::test]
    async fn overwrites_existing_target_once_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.sql");
        tokio::fs::write(&file, b"create table t (id int);").await.unwrap();

        let adapter = Arc::new(FakeSubprocessAdapter::default());
        let driver = RestoreDriver::new(adapter.clone());
        let provider = Provider::for_config(test_provider()).unwrap();
        let ctx = OpContext::new();

        driver
            .restore(
                &ctx,
                &provider,
                &file,
                "orders",
                true,
                &RestoreOptions {
                    confirm_overwrite: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(adapter.invocation_count(), 1);
    }

    #[test]
    fn archive_suffix_recognition_matches_driver_expectations() {
        assert!(recognized_archive_suffix(Path::new("/tmp/a.tar.gz")));
        assert!(!recognized_archive_suffix(Path::new("/tmp/a.sql")));
    }
}
