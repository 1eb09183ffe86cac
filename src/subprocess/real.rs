//! Real `SubprocessAdapter`, shelling out to mydumper/myloader, mysqldump/mysql,
//! rclone, and tar.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::context::OpContext;
use crate::error::TenangError;

use super::{
    filter_benign_stderr, ArtifactShape, DumpOptions, Engine, SubprocessAdapter,
};

/// Modern vs. legacy mydumper flag sets, chosen by a one-time `--help` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MydumperFlavor {
    Modern,
    Legacy,
}

pub struct RealSubprocessAdapter {
    mydumper_path: String,
    myloader_path: String,
    mysqldump_path: String,
    mysql_path: String,
    rclone_path: String,
    tar_path: String,
    /// Cached per tool path so the `--help` probe runs at most once per process.
    flavor_cache: Mutex<HashMap<String, MydumperFlavor>>,
}

impl Default for RealSubprocessAdapter {
    fn default() -> Self {
        Self {
            mydumper_path: "mydumper".to_string(),
            myloader_path: "myloader".to_string(),
            mysqldump_path: "mysqldump".to_string(),
            mysql_path: "mysql".to_string(),
            rclone_path: "rclone".to_string(),
            tar_path: "tar".to_string(),
            flavor_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl RealSubprocessAdapter {
    async fn mydumper_flavor(&self) -> MydumperFlavor {
        if let Some(f) = self
            .flavor_cache
            .lock()
            .unwrap()
            .get(&self.mydumper_path)
            .copied()
        {
            return f;
        }

        let flavor = match Command::new(&self.mydumper_path).arg("--help").output().await {
            Ok(out) => {
                let help = String::from_utf8_lossy(&out.stdout);
                if help.contains("--sync-thread-lock-mode") && help.contains("--trx-tables") {
                    MydumperFlavor::Modern
                } else {
                    MydumperFlavor::Legacy
                }
            }
            Err(e) => {
                debug!(error = %e, "mydumper --help probe failed, assuming legacy flag set");
                MydumperFlavor::Legacy
            }
        };

        debug!(flavor = ?flavor, tool = %self.mydumper_path, "negotiated mydumper flag set");
        self.flavor_cache
            .lock()
            .unwrap()
            .insert(self.mydumper_path.clone(), flavor);
        flavor
    }

    fn credential_args(&self, provider: &ProviderConfig) -> Vec<String> {
        if let Some(defaults_file) = &provider.defaults_file {
            vec![format!("--defaults-file={}", defaults_file.display())]
        } else {
            let mut args = vec![
                format!("--host={}", provider.host),
                format!("--port={}", provider.port),
                format!("--user={}", provider.username),
            ];
            if !provider.password.is_empty() {
                args.push(format!("--password={}", provider.password));
            }
            args
        }
    }
}

#[async_trait]
impl SubprocessAdapter for RealSubprocessAdapter {
    async fn dump(
        &self,
        ctx: &OpContext,
        provider: &ProviderConfig,
        database: &str,
        out_dir: &Path,
        opts: &DumpOptions,
    ) -> Result<ArtifactShape, TenangError> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");

        match opts.engine {
            Engine::Parallel => {
                let artifact_dir = out_dir.join(format!("{database}-{timestamp}"));
                tokio::fs::create_dir_all(&artifact_dir).await.map_err(|e| {
                    TenangError::DumpToolFailed {
                        database: database.to_string(),
                        exit_code: None,
                        stderr: format!("creating output directory: {e}"),
                    }
                })?;

                let flavor = self.mydumper_flavor().await;
                let mut cmd = Command::new(&self.mydumper_path);
                cmd.args(self.credential_args(provider))
                    .arg(format!("--database={database}"))
                    .arg(format!("--outputdir={}", artifact_dir.display()))
                    .arg(format!("--threads={}", opts.threads))
                    .arg("--verbose=3");

                if opts.include_triggers {
                    cmd.arg("--triggers");
                }
                if opts.include_events {
                    cmd.arg("--events");
                }
                if opts.include_routines {
                    cmd.arg("--routines");
                }

                match (flavor, opts.single_transaction) {
                    (MydumperFlavor::Modern, true) => {
                        cmd.arg("--trx-tables").arg("--sync-thread-lock-mode=AUTO");
                    }
                    (MydumperFlavor::Modern, false) => {
                        cmd.arg("--no-backup-locks");
                    }
                    (MydumperFlavor::Legacy, true) => {
                        cmd.arg("--trx-consistency-only");
                    }
                    (MydumperFlavor::Legacy, false) => {
                        cmd.arg("--no-locks");
                    }
                }

                let result = run_checked(
                    ctx,
                    cmd,
                    Duration::from_secs(3600),
                    database,
                    |exit_code, stderr| TenangError::DumpToolFailed {
                        database: database.to_string(),
                        exit_code,
                        stderr,
                    },
                )
                .await;

                if result.is_err() {
                    let _ = tokio::fs::remove_dir_all(&artifact_dir).await;
                }
                result?;
                Ok(ArtifactShape::Directory(artifact_dir))
            }
            Engine::Classic => {
                let artifact_file = out_dir.join(format!("{database}-{timestamp}.sql"));
                let mut cmd = Command::new(&self.mysqldump_path);
                cmd.args(self.credential_args(provider));
                if opts.single_transaction {
                    cmd.arg("--single-transaction");
                }
                if opts.include_routines {
                    cmd.arg("--routines");
                }
                if opts.include_events {
                    cmd.arg("--events");
                }
                if opts.include_triggers {
                    cmd.arg("--triggers");
                } else {
                    cmd.arg("--skip-triggers");
                }
                cmd.arg(database);
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

                let output = ctx
                    .run(Duration::from_secs(3600), async {
                        cmd.output().await.map_err(|e| TenangError::DumpToolFailed {
                            database: database.to_string(),
                            exit_code: None,
                            stderr: e.to_string(),
                        })
                    })
                    .await?;

                if !output.status.success() {
                    return Err(TenangError::DumpToolFailed {
                        database: database.to_string(),
                        exit_code: output.status.code(),
                        stderr: filter_benign_stderr(&String::from_utf8_lossy(&output.stderr)),
                    });
                }

                tokio::fs::write(&artifact_file, &output.stdout).await.map_err(|e| {
                    TenangError::DumpToolFailed {
                        database: database.to_string(),
                        exit_code: None,
                        stderr: format!("writing dump file: {e}"),
                    }
                })?;

                Ok(ArtifactShape::File(artifact_file))
            }
        }
    }

    async fn verify_artifact(&self, artifact: &ArtifactShape) -> Result<(), TenangError> {
        let result = match artifact {
            ArtifactShape::Directory(dir) => verify_directory_artifact(dir).await,
            ArtifactShape::File(file) => verify_file_artifact(file).await,
        };

        if let Err(reason) = &result {
            let path = artifact.path().to_path_buf();
            match artifact {
                ArtifactShape::Directory(_) => {
                    let _ = tokio::fs::remove_dir_all(&path).await;
                }
                ArtifactShape::File(_) => {
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
            return Err(TenangError::ArtifactVerificationFailed {
                path,
                reason: reason.clone(),
            });
        }
        Ok(())
    }

    async fn restore(
        &self,
        ctx: &OpContext,
        provider: &ProviderConfig,
        artifact: &ArtifactShape,
        target_db: &str,
    ) -> Result<(), TenangError> {
        match artifact {
            ArtifactShape::Directory(dir) => {
                let mut cmd = Command::new(&self.myloader_path);
                cmd.args(self.credential_args(provider))
                    .arg(format!("--database={target_db}"))
                    .arg(format!("--directory={}", dir.display()))
                    .arg("--overwrite-tables");

                run_checked(
                    ctx,
                    cmd,
                    Duration::from_secs(3600),
                    target_db,
                    |exit_code, stderr| TenangError::RestoreToolFailed {
                        target_db: target_db.to_string(),
                        exit_code,
                        stderr,
                    },
                )
                .await
            }
            ArtifactShape::File(file) => {
                let mut cmd = Command::new(&self.mysql_path);
                cmd.args(self.credential_args(provider)).arg(target_db);
                cmd.stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());

                let file_contents = tokio::fs::read(file).await.map_err(|e| {
                    TenangError::RestoreToolFailed {
                        target_db: target_db.to_string(),
                        exit_code: None,
                        stderr: format!("reading artifact file: {e}"),
                    }
                })?;

                let target_db = target_db.to_string();
                ctx.run(Duration::from_secs(3600), async move {
                    let mut child = cmd.spawn().map_err(|e| TenangError::RestoreToolFailed {
                        target_db: target_db.clone(),
                        exit_code: None,
                        stderr: e.to_string(),
                    })?;

                    if let Some(mut stdin) = child.stdin.take() {
                        stdin.write_all(&file_contents).await.map_err(|e| {
                            TenangError::RestoreToolFailed {
                                target_db: target_db.clone(),
                                exit_code: None,
                                stderr: e.to_string(),
                            }
                        })?;
                    }

                    let output = child.wait_with_output().await.map_err(|e| {
                        TenangError::RestoreToolFailed {
                            target_db: target_db.clone(),
                            exit_code: None,
                            stderr: e.to_string(),
                        }
                    })?;

                    if !output.status.success() {
                        return Err(TenangError::RestoreToolFailed {
                            target_db: target_db.clone(),
                            exit_code: output.status.code(),
                            stderr: filter_benign_stderr(&String::from_utf8_lossy(
                                &output.stderr,
                            )),
                        });
                    }
                    Ok(())
                })
                .await
            }
        }
    }

    async fn upload_file(
        &self,
        ctx: &OpContext,
        local_path: &Path,
        remote_path: &str,
        policy_only_destination: bool,
    ) -> Result<(), TenangError> {
        let mut cmd = Command::new(&self.rclone_path);
        cmd.arg("copyto").arg(local_path).arg(remote_path);

        if policy_only_destination {
            cmd.arg("--s3-no-check-bucket").arg("--s3-no-check-object");
        }

        let remote_path = remote_path.to_string();
        let local_path_owned = local_path.to_path_buf();
        run_checked(
            ctx,
            cmd,
            Duration::from_secs(600),
            &remote_path.clone(),
            move |_exit_code, stderr| TenangError::UploadFailed {
                path: local_path_owned,
                reason: if stderr.trim().is_empty() {
                    format!("rclone copyto to {remote_path} failed")
                } else {
                    stderr
                },
            },
        )
        .await
    }

    async fn remote_list(
        &self,
        ctx: &OpContext,
        remote_path: &str,
    ) -> Result<bool, TenangError> {
        let mut cmd = Command::new(&self.rclone_path);
        cmd.arg("lsf").arg(remote_path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let remote_path = remote_path.to_string();
        let output = ctx
            .run(Duration::from_secs(60), async {
                cmd.output()
                    .await
                    .map_err(|e| TenangError::RemoteProbeFailed {
                        remote_path: remote_path.clone(),
                        reason: e.to_string(),
                    })
            })
            .await?;

        if !output.status.success() {
            let stderr = filter_benign_stderr(&String::from_utf8_lossy(&output.stderr));
            if stderr.trim().is_empty() {
                return Ok(false);
            }
            return Err(TenangError::RemoteProbeFailed {
                remote_path,
                reason: stderr,
            });
        }
        Ok(!output.stdout.is_empty())
    }

    async fn remote_delete(
        &self,
        ctx: &OpContext,
        remote_path: &str,
        min_age_secs: u64,
    ) -> Result<(), TenangError> {
        let mut cmd = Command::new(&self.rclone_path);
        cmd.arg("delete")
            .arg(remote_path)
            .arg("--min-age")
            .arg(format!("{min_age_secs}s"));

        run_checked(
            ctx,
            cmd,
            Duration::from_secs(120),
            remote_path,
            |_exit_code, stderr| TenangError::RemoteProbeFailed {
                remote_path: remote_path.to_string(),
                reason: stderr,
            },
        )
        .await
    }

    async fn decompress(
        &self,
        ctx: &OpContext,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, TenangError> {
        tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
            TenangError::DecompressionFailed {
                path: archive_path.to_path_buf(),
                reason: format!("creating destination directory: {e}"),
            }
        })?;

        let name = archive_path.to_string_lossy();
        let mut cmd = Command::new(&self.tar_path);
        if name.ends_with(".tar.zst") {
            cmd.arg("--zstd").arg("-xf").arg(archive_path);
        } else if name.ends_with(".tar.xz") {
            cmd.arg("-xJf").arg(archive_path);
        } else {
            cmd.arg("-xzf").arg(archive_path);
        }
        cmd.arg("-C").arg(dest_dir);

        let archive_path_owned = archive_path.to_path_buf();
        run_checked(
            ctx,
            cmd,
            Duration::from_secs(600),
            &archive_path.to_string_lossy(),
            move |_exit_code, stderr| TenangError::DecompressionFailed {
                path: archive_path_owned.clone(),
                reason: stderr,
            },
        )
        .await?;

        Ok(dest_dir.to_path_buf())
    }

    async fn validate_tools(&self, engine: Engine) -> Result<(), TenangError> {
        let tools: &[&str] = match engine {
            Engine::Parallel => &[&self.mydumper_path, &self.myloader_path],
            Engine::Classic => &[&self.mysqldump_path, &self.mysql_path],
        };
        for tool in tools {
            which_on_path(tool).await.map_err(|reason| {
                TenangError::ConfigurationInvalid(format!(
                    "required tool '{tool}' not found: {reason}"
                ))
            })?;
        }
        which_on_path(&self.rclone_path).await.ok();
        Ok(())
    }
}

async fn which_on_path(tool: &str) -> Result<(), String> {
    if Path::new(tool).is_absolute() {
        return if Path::new(tool).exists() {
            Ok(())
        } else {
            Err(format!("{tool} does not exist"))
        };
    }
    match Command::new(tool).arg("--version").output().await {
        Ok(_) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

async fn run_checked<F>(
    ctx: &OpContext,
    mut cmd: Command,
    timeout: Duration,
    label: &str,
    to_error: F,
) -> Result<(), TenangError>
where
    F: FnOnce(Option<i32>, String) -> TenangError,
{
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    debug!(tool = label, "running subprocess");

    if ctx.is_cancelled() {
        return Err(TenangError::Cancelled);
    }

    let output = tokio::select! {
        biased;
        _ = ctx.cancelled() => return Err(TenangError::Cancelled),
        res = tokio::time::timeout(timeout, cmd.output()) => match res {
            Err(_) => {
                warn!(tool = label, ?timeout, "subprocess timed out");
                return Err(TenangError::TimeoutExceeded(timeout));
            }
            Ok(Err(spawn_err)) => {
                return Err(to_error(None, spawn_err.to_string()));
            }
            Ok(Ok(output)) => output,
        },
    };

    if !output.status.success() {
        let stderr = filter_benign_stderr(&String::from_utf8_lossy(&output.stderr));
        return Err(to_error(output.status.code(), stderr));
    }
    Ok(())
}

async fn verify_directory_artifact(dir: &Path) -> Result<(), String> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| format!("reading artifact directory: {e}"))?;

    let mut has_metadata = false;
    let mut has_data_file = false;
    const DATA_SUFFIXES: &[&str] = &[".sql", ".gz", ".lz4", ".zst"];

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("reading directory entry: {e}"))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "metadata" {
            has_metadata = true;
        }
        if DATA_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            has_data_file = true;
        }
    }

    if !has_metadata {
        return Err("missing metadata file".to_string());
    }
    if !has_data_file {
        return Err("no data file with a recognized suffix".to_string());
    }
    Ok(())
}

async fn verify_file_artifact(file: &Path) -> Result<(), String> {
    let meta = tokio::fs::metadata(file)
        .await
        .map_err(|e| format!("stat-ing artifact file: {e}"))?;
    if meta.len() == 0 {
        return Err("artifact file is empty".to_string());
    }
    if meta.len() < 10 {
        return Err("artifact file is shorter than the minimum header length".to_string());
    }
    Ok(())
}
