//! Provider: the capability-set abstraction the Orchestrator and Restore
//! Driver program against instead of a concrete database engine type.
//!
//! Dispatch is by tag, not inheritance — only MySQL is implemented today, but
//! a second engine slots in at `Provider::Mysql(..)` without the orchestrator
//! changing.

mod mysql;

use std::path::Path;

use crate::config::{ProviderConfig, ProviderType};
use crate::context::OpContext;
use crate::error::TenangError;
use crate::subprocess::{ArtifactShape, DumpOptions, Engine, SubprocessAdapter};

pub use mysql::MysqlProvider;

/// Tagged union over supported engines. Orchestrator code matches on this
/// enum rather than depending on a trait object, so adding a second engine
/// only touches this module and `config::ProviderType`.
pub enum Provider {
    Mysql(MysqlProvider),
}

impl Provider {
    /// Resolves the legacy-migration hint before dispatching, so a
    /// `Reserved`-type config (e.g. an untyped entry on port 5432) is
    /// rejected here rather than silently treated as MySQL.
    pub fn for_config(config: ProviderConfig) -> Result<Self, TenangError> {
        match config.migrate_legacy() {
            ProviderType::Mysql => Ok(Provider::Mysql(MysqlProvider::new(config))),
            ProviderType::Reserved => Err(TenangError::ConfigurationInvalid(format!(
                "database '{}' resolves to an unsupported provider type (only mysql is implemented)",
                config.name
            ))),
        }
    }

    pub async fn test_connection(&self) -> Result<(), TenangError> {
        match self {
            Provider::Mysql(p) => p.test_connection().await,
        }
    }

    pub async fn list_databases(&self) -> Result<Vec<String>, TenangError> {
        match self {
            Provider::Mysql(p) => p.list_databases().await,
        }
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool, TenangError> {
        match self {
            Provider::Mysql(p) => p.database_exists(name).await,
        }
    }

    pub async fn create_backup(
        &self,
        ctx: &OpContext,
        adapter: &dyn SubprocessAdapter,
        database: &str,
        out_dir: &Path,
    ) -> Result<ArtifactShape, TenangError> {
        match self {
            Provider::Mysql(p) => p.create_backup(ctx, adapter, database, out_dir).await,
        }
    }

    pub async fn restore_backup(
        &self,
        ctx: &OpContext,
        adapter: &dyn SubprocessAdapter,
        artifact: &ArtifactShape,
        target_db: &str,
    ) -> Result<(), TenangError> {
        match self {
            Provider::Mysql(p) => p.restore_backup(ctx, adapter, artifact, target_db).await,
        }
    }

    pub async fn validate_tools(
        &self,
        adapter: &dyn SubprocessAdapter,
    ) -> Result<(), TenangError> {
        match self {
            Provider::Mysql(p) => p.validate_tools(adapter).await,
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Provider::Mysql(p) => DumpOptions::from_provider(&p.config).engine,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        match self {
            Provider::Mysql(p) => &p.config,
        }
    }
}
