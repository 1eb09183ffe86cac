//! Cleanup Engine settings.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    DeleteAfterUpload,
    AgeBased,
}

impl Default for CleanupMode {
    fn default() -> Self {
        CleanupMode::DeleteAfterUpload
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub mode: CleanupMode,
    pub max_age_days: u32,
    pub verify_cloud_exists: bool,
    pub dry_run: bool,
    /// Operator-facing gate; the engine exposes the flag but does not
    /// consult the calendar itself.
    pub weekend_only: bool,
    /// Restrict age-based cleanup to paths containing one of these names.
    pub database_filter: Vec<String>,
    /// Minimum age before an uploaded artifact is deleted locally, even if
    /// the upload ledger already confirmed it. Never below one hour.
    pub upload_safety_buffer_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            mode: CleanupMode::DeleteAfterUpload,
            max_age_days: 14,
            verify_cloud_exists: true,
            dry_run: false,
            weekend_only: false,
            database_filter: Vec::new(),
            upload_safety_buffer_secs: 3600,
        }
    }
}
