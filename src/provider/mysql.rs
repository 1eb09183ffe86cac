//! MySQL implementation of the Provider capability set.

use std::path::Path;
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::Row;

use crate::config::ProviderConfig;
use crate::context::OpContext;
use crate::error::TenangError;
use crate::subprocess::{ArtifactShape, DumpOptions, SubprocessAdapter};

/// Schemas that ship with every MySQL server and are never user data.
const BUILTIN_SCHEMAS: &[&str] = &["information_schema", "performance_schema", "mysql", "sys"];

pub struct MysqlProvider {
    pub config: ProviderConfig,
}

impl MysqlProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    async fn pool(&self) -> Result<sqlx::MySqlPool, TenangError> {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect(&self.config.connection_url())
            .await
            .map_err(|source| TenangError::DatabaseUnreachable {
                database: self.config.name.clone(),
                source,
            })
    }

    pub async fn test_connection(&self) -> Result<(), TenangError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|source| TenangError::DatabaseUnreachable {
                database: self.config.name.clone(),
                source,
            })?;
        Ok(())
    }

    pub async fn list_databases(&self) -> Result<Vec<String>, TenangError> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT schema_name FROM information_schema.schemata")
            .fetch_all(&pool)
            .await
            .map_err(|source| TenangError::DatabaseUnreachable {
                database: self.config.name.clone(),
                source,
            })?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>(0))
            .filter(|name| !BUILTIN_SCHEMAS.contains(&name.as_str()))
            .collect())
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool, TenangError> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(name)
        .fetch_one(&pool)
        .await
        .map_err(|source| TenangError::DatabaseUnreachable {
            database: self.config.name.clone(),
            source,
        })?;

        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    pub async fn create_backup(
        &self,
        ctx: &OpContext,
        adapter: &dyn SubprocessAdapter,
        database: &str,
        out_dir: &Path,
    ) -> Result<ArtifactShape, TenangError> {
        let opts = DumpOptions::from_provider(&self.config);
        let artifact = adapter
            .dump(ctx, &self.config, database, out_dir, &opts)
            .await?;
        adapter.verify_artifact(&artifact).await?;
        Ok(artifact)
    }

    pub async fn restore_backup(
        &self,
        ctx: &OpContext,
        adapter: &dyn SubprocessAdapter,
        artifact: &ArtifactShape,
        target_db: &str,
    ) -> Result<(), TenangError> {
        adapter.restore(ctx, &self.config, artifact, target_db).await
    }

    pub async fn validate_tools(
        &self,
        adapter: &dyn SubprocessAdapter,
    ) -> Result<(), TenangError> {
        let opts = DumpOptions::from_provider(&self.config);
        adapter.validate_tools(opts.engine).await
    }
}
