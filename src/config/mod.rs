//! Layered configuration: built-in defaults, overlaid by a TOML file, overlaid
//! by environment variables. Mirrors the loading order described for every
//! settings group below.

mod backup;
mod cleanup;
mod metrics;
mod provider;
mod upload;

pub use backup::BackupConfig;
pub use cleanup::{CleanupConfig, CleanupMode};
pub use metrics::{LoggingConfig, MetricsConfig};
pub use provider::{EngineOptions, ProviderConfig, ProviderType};
pub use upload::UploadConfig;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::TenangError;

pub const CONFIG_PATH_ENV: &str = "TENANGDB_CONFIG";

/// Shape of the on-disk TOML document. Every field is optional so a partial
/// file only overrides what it mentions; everything else falls back to
/// [`AppConfig`]'s own defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    backup: Option<BackupConfigFile>,
    #[serde(default)]
    databases: Vec<ProviderConfig>,
    #[serde(default)]
    upload: Option<UploadConfig>,
    #[serde(default)]
    cleanup: Option<CleanupConfig>,
    #[serde(default)]
    metrics: Option<MetricsConfig>,
    #[serde(default)]
    logging: Option<LoggingConfig>,
}

/// `[backup]` table deserializes into the same shape as [`BackupConfig`];
/// kept as a type alias point so future divergence doesn't ripple.
type BackupConfigFile = BackupConfig;

/// Root configuration value produced by loading a file (if any) over the
/// built-in default, then applying a small set of environment overrides.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backup: BackupConfig,
    pub databases: Vec<ProviderConfig>,
    pub upload: UploadConfig,
    pub cleanup: CleanupConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup: BackupConfig::default(),
            databases: Vec::new(),
            upload: UploadConfig::default(),
            cleanup: CleanupConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolves the config file path: explicit `--config` flag, then
    /// `TENANGDB_CONFIG`, then `~/.config/tenangdb/config.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("tenangdb")
            .join("config.toml")
    }

    /// Loads the file at `path` if it exists, falling back silently to
    /// built-in defaults when it does not (a missing config file is not an
    /// error — only a malformed one is).
    pub fn load(path: &Path) -> Result<Self, TenangError> {
        let file_cfg = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                TenangError::ConfigurationInvalid(format!(
                    "reading config file {}: {e}",
                    path.display()
                ))
            })?;
            toml::from_str::<FileConfig>(&raw).map_err(|e| {
                TenangError::ConfigurationInvalid(format!(
                    "parsing config file {}: {e}",
                    path.display()
                ))
            })?
        } else {
            FileConfig::default()
        };

        let mut cfg = AppConfig {
            backup: file_cfg.backup.unwrap_or_default(),
            databases: file_cfg.databases,
            upload: file_cfg.upload.unwrap_or_default(),
            cleanup: file_cfg.cleanup.unwrap_or_default(),
            metrics: file_cfg.metrics.unwrap_or_default(),
            logging: file_cfg.logging.unwrap_or_default(),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// A narrow set of environment overrides, for the knobs operators most
    /// often want to flip without touching the file (container deployments).
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TENANGDB_BACKUP_DIR") {
            self.backup.backup_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TENANGDB_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.backup.concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("TENANGDB_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("TENANGDB_METRICS_PORT") {
            if let Ok(n) = v.parse() {
                self.metrics.bind_port = n;
            }
        }
    }

    fn validate(&self) -> Result<(), TenangError> {
        if self.backup.concurrency == 0 {
            return Err(TenangError::ConfigurationInvalid(
                "backup.concurrency must be at least 1".into(),
            ));
        }
        if self.backup.batch_size == 0 {
            return Err(TenangError::ConfigurationInvalid(
                "backup.batch_size must be at least 1".into(),
            ));
        }
        if self.upload.enabled && self.upload.destination.trim().is_empty() {
            return Err(TenangError::ConfigurationInvalid(
                "upload.enabled is true but upload.destination is empty".into(),
            ));
        }
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(TenangError::ConfigurationInvalid(
                    "a database entry is missing a name".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/tenangdb.toml")).unwrap();
        assert_eq!(cfg.backup.concurrency, BackupConfig::default().concurrency);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.backup.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn upload_enabled_without_destination_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.upload.enabled = true;
        cfg.upload.destination.clear();
        assert!(cfg.validate().is_err());
    }
}
