//! The Subprocess Adapter: the crate's sole boundary onto external binaries
//! (mydumper/mysqldump, myloader/mysql, rclone, tar).

mod real;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::{EngineOptions, ProviderConfig};
use crate::error::TenangError;

pub use real::RealSubprocessAdapter;

/// Which external dump/restore engine to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// mydumper/myloader: directory-shaped artifacts, parallel, version-gated flags.
    Parallel,
    /// mysqldump/mysql: single-file artifacts, no version negotiation needed.
    Classic,
}

/// Dump-time flags resolved from [`EngineOptions`] plus the connection.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub engine: Engine,
    pub single_transaction: bool,
    pub include_routines: bool,
    pub include_events: bool,
    pub include_triggers: bool,
    pub threads: u32,
}

impl DumpOptions {
    pub fn from_provider(provider: &ProviderConfig) -> Self {
        let opts: &EngineOptions = &provider.engine;
        Self {
            engine: if opts.use_parallel_dump {
                Engine::Parallel
            } else {
                Engine::Classic
            },
            single_transaction: opts.single_transaction,
            include_routines: opts.include_routines,
            include_events: opts.include_events,
            include_triggers: opts.include_triggers,
            threads: opts.threads,
        }
    }
}

/// The shape of a completed (and verified) artifact on disk.
#[derive(Debug, Clone)]
pub enum ArtifactShape {
    Directory(PathBuf),
    File(PathBuf),
}

impl ArtifactShape {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactShape::Directory(p) | ArtifactShape::File(p) => p,
        }
    }
}

/// stderr substrings that are expected noise, never surfaced as failures.
const BENIGN_STDERR_SUBSTRINGS: &[&str] = &[
    "using a password on the command line is insecure",
    "using --password on the command line interface can be insecure",
];

pub fn is_benign_stderr_line(line: &str) -> bool {
    BENIGN_STDERR_SUBSTRINGS
        .iter()
        .any(|needle| line.contains(needle))
}

/// Strips benign lines from a captured stderr blob, keeping the rest verbatim.
pub fn filter_benign_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|l| !is_benign_stderr_line(l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trait boundary so tests can substitute an in-memory fake that records
/// invocations and returns scripted results instead of shelling out.
#[async_trait]
pub trait SubprocessAdapter: Send + Sync {
    async fn dump(
        &self,
        ctx: &crate::context::OpContext,
        provider: &ProviderConfig,
        database: &str,
        out_dir: &Path,
        opts: &DumpOptions,
    ) -> Result<ArtifactShape, TenangError>;

    async fn verify_artifact(&self, artifact: &ArtifactShape) -> Result<(), TenangError>;

    async fn restore(
        &self,
        ctx: &crate::context::OpContext,
        provider: &ProviderConfig,
        artifact: &ArtifactShape,
        target_db: &str,
    ) -> Result<(), TenangError>;

    /// Copies one local file to `remote_path`, adding the policy-only /
    /// cleared-ACL flags when `policy_only_destination` is set.
    async fn upload_file(
        &self,
        ctx: &crate::context::OpContext,
        local_path: &Path,
        remote_path: &str,
        policy_only_destination: bool,
    ) -> Result<(), TenangError>;

    async fn remote_list(
        &self,
        ctx: &crate::context::OpContext,
        remote_path: &str,
    ) -> Result<bool, TenangError>;

    async fn remote_delete(
        &self,
        ctx: &crate::context::OpContext,
        remote_path: &str,
        min_age_secs: u64,
    ) -> Result<(), TenangError>;

    async fn decompress(
        &self,
        ctx: &crate::context::OpContext,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, TenangError>;

    /// Confirms the configured binaries exist on PATH (or at configured
    /// absolute paths) so the orchestrator fails fast with one clear error.
    async fn validate_tools(&self, engine: Engine) -> Result<(), TenangError>;
}

pub fn recognized_archive_suffix(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tar.gz") || name.ends_with(".tar.zst") || name.ends_with(".tar.xz")
}

#[cfg(test)]
pub mod fake;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_benign_password_warning_only() {
        let stderr = "Warning: using a password on the command line is insecure\nERROR 1045: Access denied";
        let filtered = filter_benign_stderr(stderr);
        assert_eq!(filtered, "ERROR 1045: Access denied");
    }

    #[test]
    fn recognizes_archive_suffixes() {
        assert!(recognized_archive_suffix(Path::new("/tmp/x.tar.gz")));
        assert!(recognized_archive_suffix(Path::new("/tmp/x.tar.zst")));
        assert!(recognized_archive_suffix(Path::new("/tmp/x.tar.xz")));
        assert!(!recognized_archive_suffix(Path::new("/tmp/x.sql")));
    }
}
