//! Global backup-run settings (batch size, concurrency, retry policy, force/yes).

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub batch_size: usize,
    pub concurrency: usize,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    /// Minimum time between successful backups of the same database before
    /// the frequency guard allows another one unattended.
    pub min_backup_interval_secs: u64,
    /// Bypasses the frequency guard regardless of recency.
    pub force: bool,
    /// Non-interactive mode: a Prompt verdict from the frequency guard
    /// becomes a Block instead of waiting on stdin.
    pub non_interactive: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("/var/backups/tenangdb"),
            batch_size: 3,
            concurrency: 2,
            retry_count: 3,
            retry_delay_secs: 5,
            min_backup_interval_secs: 6 * 3600,
            force: false,
            non_interactive: false,
        }
    }
}
