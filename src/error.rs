//! Typed error kinds for the backup/upload/cleanup/restore pipeline.
//!
//! Components return `TenangError` at their boundary; call sites that only
//! need to propagate collapse it into `anyhow::Error` via `?` like the rest
//! of the crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenangError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("database '{database}' unreachable: {source}")]
    DatabaseUnreachable {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("dump tool failed for '{database}' (exit {exit_code:?}): {stderr}")]
    DumpToolFailed {
        database: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("artifact verification failed at {path}: {reason}")]
    ArtifactVerificationFailed { path: PathBuf, reason: String },

    #[error("upload failed for {path}: {reason}")]
    UploadFailed { path: PathBuf, reason: String },

    #[error("remote probe failed for {remote_path}: {reason}")]
    RemoteProbeFailed { remote_path: String, reason: String },

    #[error("decompression failed for {path}: {reason}")]
    DecompressionFailed { path: PathBuf, reason: String },

    #[error("restore tool failed for '{target_db}' (exit {exit_code:?}): {stderr}")]
    RestoreToolFailed {
        target_db: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("tracker I/O failed at {path}: {source}")]
    TrackerIOFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics I/O failed at {path}: {source}")]
    MetricsIOFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    TimeoutExceeded(std::time::Duration),
}

impl TenangError {
    /// Whether the Orchestrator's retry loop should treat this as transient.
    ///
    /// Timeouts and cancellation are fatal for the current job; everything
    /// else is retried until the configured attempt budget is exhausted.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TenangError::TimeoutExceeded(_) | TenangError::Cancelled
        )
    }
}
