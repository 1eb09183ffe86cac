//! Upload Engine settings.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    /// Destination root passed to the remote-copy utility, e.g. `s3:my-bucket/backups`.
    pub destination: String,
    pub retry_count: u32,
    pub per_attempt_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: String::new(),
            retry_count: 3,
            per_attempt_timeout_secs: 300,
        }
    }
}

/// Cloud families whose buckets prefer identity-based policies over
/// object/bucket ACLs. Detection is a prefix match on the destination string.
const POLICY_ONLY_PREFIXES: &[&str] = &["s3:", "s3://", "gcs:", "gcs://"];

impl UploadConfig {
    pub fn is_policy_only_destination(&self) -> bool {
        POLICY_ONLY_PREFIXES
            .iter()
            .any(|p| self.destination.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_s3_prefix() {
        let cfg = UploadConfig {
            destination: "s3:my-bucket/backups".into(),
            ..UploadConfig::default()
        };
        assert!(cfg.is_policy_only_destination());
    }

    #[test]
    fn plain_rsync_destination_is_not_policy_only() {
        let cfg = UploadConfig {
            destination: "rsync://host/backups".into(),
            ..UploadConfig::default()
        };
        assert!(!cfg.is_policy_only_destination());
    }
}
