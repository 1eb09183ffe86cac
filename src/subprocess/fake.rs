//! In-memory fake `SubprocessAdapter` used by orchestrator/restore tests so
//! they never shell out to a real mydumper/mysqldump/rclone/tar binary.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::context::OpContext;
use crate::error::TenangError;

use super::{ArtifactShape, DumpOptions, Engine, SubprocessAdapter};

#[derive(Debug, Clone)]
pub enum Invocation {
    Dump { database: String },
    Restore { target_db: String },
    Upload { remote_path: String },
    RemoteList { remote_path: String },
    RemoteDelete { remote_path: String },
    Decompress { archive: PathBuf },
}

/// Scripted responses, consumed in FIFO order per database for `dump` so a
/// test can model "fails twice then succeeds".
#[derive(Default)]
pub struct FakeSubprocessAdapter {
    pub invocations: Mutex<Vec<Invocation>>,
    pub dump_scripts: Mutex<std::collections::HashMap<String, Vec<Result<(), String>>>>,
    pub remote_present: Mutex<std::collections::HashMap<String, bool>>,
    pub fail_restore: Mutex<bool>,
    pub fail_upload: Mutex<bool>,
}

impl FakeSubprocessAdapter {
    pub fn script_dump_outcomes(&self, database: &str, outcomes: Vec<Result<(), String>>) {
        self.dump_scripts
            .lock()
            .unwrap()
            .insert(database.to_string(), outcomes);
    }

    pub fn set_remote_present(&self, remote_path: &str, present: bool) {
        self.remote_present
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), present);
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl SubprocessAdapter for FakeSubprocessAdapter {
    async fn dump(
        &self,
        _ctx: &OpContext,
        _provider: &ProviderConfig,
        database: &str,
        out_dir: &Path,
        _opts: &DumpOptions,
    ) -> Result<ArtifactShape, TenangError> {
        self.invocations.lock().unwrap().push(Invocation::Dump {
            database: database.to_string(),
        });

        let next = {
            let mut scripts = self.dump_scripts.lock().unwrap();
            scripts
                .get_mut(database)
                .and_then(|outcomes| {
                    if outcomes.is_empty() {
                        None
                    } else {
                        Some(outcomes.remove(0))
                    }
                })
                .unwrap_or(Ok(()))
        };

        match next {
            Ok(()) => Ok(ArtifactShape::File(
                out_dir.join(format!("{database}-fake.sql")),
            )),
            Err(reason) => Err(TenangError::DumpToolFailed {
                database: database.to_string(),
                exit_code: Some(1),
                stderr: reason,
            }),
        }
    }

    async fn verify_artifact(&self, _artifact: &ArtifactShape) -> Result<(), TenangError> {
        Ok(())
    }

    async fn restore(
        &self,
        _ctx: &OpContext,
        _provider: &ProviderConfig,
        _artifact: &ArtifactShape,
        target_db: &str,
    ) -> Result<(), TenangError> {
        self.invocations.lock().unwrap().push(Invocation::Restore {
            target_db: target_db.to_string(),
        });
        if *self.fail_restore.lock().unwrap() {
            return Err(TenangError::RestoreToolFailed {
                target_db: target_db.to_string(),
                exit_code: Some(1),
                stderr: "fake restore failure".to_string(),
            });
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        _ctx: &OpContext,
        _local_path: &Path,
        remote_path: &str,
        _policy_only_destination: bool,
    ) -> Result<(), TenangError> {
        self.invocations.lock().unwrap().push(Invocation::Upload {
            remote_path: remote_path.to_string(),
        });
        if *self.fail_upload.lock().unwrap() {
            return Err(TenangError::UploadFailed {
                path: _local_path.to_path_buf(),
                reason: "fake upload failure".to_string(),
            });
        }
        Ok(())
    }

    async fn remote_list(
        &self,
        _ctx: &OpContext,
        remote_path: &str,
    ) -> Result<bool, TenangError> {
        self.invocations.lock().unwrap().push(Invocation::RemoteList {
            remote_path: remote_path.to_string(),
        });
        Ok(*self
            .remote_present
            .lock()
            .unwrap()
            .get(remote_path)
            .unwrap_or(&false))
    }

    async fn remote_delete(
        &self,
        _ctx: &OpContext,
        remote_path: &str,
        _min_age_secs: u64,
    ) -> Result<(), TenangError> {
        self.invocations
            .lock()
            .unwrap()
            .push(Invocation::RemoteDelete {
                remote_path: remote_path.to_string(),
            });
        Ok(())
    }

    async fn decompress(
        &self,
        _ctx: &OpContext,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, TenangError> {
        self.invocations.lock().unwrap().push(Invocation::Decompress {
            archive: archive_path.to_path_buf(),
        });
        Ok(dest_dir.to_path_buf())
    }

    async fn validate_tools(&self, _engine: Engine) -> Result<(), TenangError> {
        Ok(())
    }
}
