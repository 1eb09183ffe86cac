//! Backup Orchestrator: batches databases, fans out to a bounded worker pool,
//! applies retry, and updates the Tracking Store, UploadLedger, and Metrics
//! Store as jobs complete.

mod upload;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ProviderConfig};
use crate::context::OpContext;
use crate::error::TenangError;
use crate::frequency_guard::{FrequencyGuard, Verdict};
use crate::metrics::MetricsStore;
use crate::provider::Provider;
use crate::subprocess::SubprocessAdapter;
use crate::tracking::TrackingStore;
use crate::upload_ledger::UploadLedger;

pub use upload::UploadEngine;

/// Terminal outcome of one database within a run, matching the state machine
/// the run-completion statistics are aggregated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Failed,
    UploadFailed,
    Done,
    Uploaded,
}

#[derive(Debug, Default, Clone)]
pub struct JobStatistics {
    pub total: usize,
    pub successful_backups: usize,
    pub failed_backups: usize,
    pub successful_uploads: usize,
    pub failed_uploads: usize,
    pub skipped: usize,
    pub start_time: Option<chrono::DateTime<Utc>>,
    pub end_time: Option<chrono::DateTime<Utc>>,
}

pub struct BackupOrchestrator {
    config: AppConfig,
    adapter: Arc<dyn SubprocessAdapter>,
    tracking: Arc<TrackingStore>,
    ledger: Arc<UploadLedger>,
    metrics: Arc<MetricsStore>,
}

impl BackupOrchestrator {
    pub fn new(
        config: AppConfig,
        adapter: Arc<dyn SubprocessAdapter>,
        tracking: Arc<TrackingStore>,
        ledger: Arc<UploadLedger>,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        Self {
            config,
            adapter,
            tracking,
            ledger,
            metrics,
        }
    }

    pub async fn run(&self, ctx: &OpContext) -> Result<JobStatistics, TenangError> {
        let mut stats = JobStatistics {
            total: self.config.databases.len(),
            start_time: Some(Utc::now()),
            ..Default::default()
        };

        self.metrics.set_process_active(true).await?;
        self.metrics
            .set_total_databases(self.config.databases.len() as u64)
            .await?;

        tokio::fs::create_dir_all(&self.config.backup.backup_dir)
            .await
            .map_err(|e| {
                TenangError::ConfigurationInvalid(format!(
                    "creating backup root {}: {e}",
                    self.config.backup.backup_dir.display()
                ))
            })?;

        let batches: Vec<Vec<ProviderConfig>> = self
            .config
            .databases
            .chunks(self.config.backup.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        for (i, batch) in batches.iter().enumerate() {
            let outcomes = self
                .process_batch(ctx, batch, self.config.backup.concurrency)
                .await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Skipped => stats.skipped += 1,
                    Outcome::Failed => stats.failed_backups += 1,
                    Outcome::UploadFailed => {
                        stats.successful_backups += 1;
                        stats.failed_uploads += 1;
                    }
                    Outcome::Done => stats.successful_backups += 1,
                    Outcome::Uploaded => {
                        stats.successful_backups += 1;
                        stats.successful_uploads += 1;
                    }
                }
            }

            if i + 1 < batches.len() {
                sleep(Duration::from_secs(5)).await;
            }
        }

        self.metrics.set_process_active(false).await?;
        stats.end_time = Some(Utc::now());

        info!(
            total = stats.total,
            successful_backups = stats.successful_backups,
            failed_backups = stats.failed_backups,
            successful_uploads = stats.successful_uploads,
            failed_uploads = stats.failed_uploads,
            skipped = stats.skipped,
            "backup run completed"
        );

        Ok(stats)
    }

    async fn process_batch(
        &self,
        ctx: &OpContext,
        batch: &[ProviderConfig],
        concurrency: usize,
    ) -> Vec<Outcome> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(batch.len());

        for provider_cfg in batch.iter().cloned() {
            let semaphore = semaphore.clone();
            let ctx = ctx.child();
            let this = self.clone_refs();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                this.process_database(&ctx, provider_cfg).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    error!(error = %join_err, "backup job task panicked");
                    outcomes.push(Outcome::Failed);
                }
            }
        }
        outcomes
    }

    async fn process_database(&self, ctx: &OpContext, provider_cfg: ProviderConfig) -> Outcome {
        let database = provider_cfg.name.clone();
        let guard = FrequencyGuard::new(&self.tracking);
        let verdict = guard
            .decide(
                &database,
                Duration::from_secs(self.config.backup.min_backup_interval_secs),
                self.config.backup.force,
                self.config.backup.non_interactive,
            )
            .await;

        match verdict {
            Verdict::Allow => {}
            Verdict::Block => {
                info!(database, "skipping database: frequency guard blocked (non-interactive)");
                return Outcome::Skipped;
            }
            Verdict::Prompt => {
                let confirmed = crate::prompt::confirm(&format!(
                    "Database '{database}' was backed up within the last {}s; back it up again now? [y/N] ",
                    self.config.backup.min_backup_interval_secs
                ));
                if !confirmed {
                    info!(database, "skipping database: operator declined frequency-guard prompt");
                    return Outcome::Skipped;
                }
                info!(database, "operator confirmed backup despite frequency guard");
            }
        }

        let provider = match Provider::for_config(provider_cfg) {
            Ok(p) => p,
            Err(e) => {
                error!(database, error = %e, "skipping database: unsupported provider configuration");
                return Outcome::Failed;
            }
        };
        let out_dir = self.database_out_dir(&database);

        let started = Instant::now();
        let backup_result = self
            .create_backup_with_retry(ctx, &provider, &database, &out_dir)
            .await;

        let artifact = match backup_result {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(database, error = %e, "backup failed after exhausting retries");
                let _ = self.metrics.record_backup_failure(&database).await;
                return Outcome::Failed;
            }
        };

        let duration = started.elapsed();
        let size_bytes = artifact_size(artifact.path()).await.unwrap_or(0);
        let now = Utc::now();

        if let Err(e) = self
            .metrics
            .record_backup_success(&database, duration, size_bytes, now)
            .await
        {
            warn!(database, error = %e, "metrics flush failed after successful backup");
        }
        if let Err(e) = self.tracking.record_success(&database, now).await {
            warn!(database, error = %e, "tracker update failed after successful backup");
        }
        info!(database, "✅ backup completed");

        if !self.config.upload.enabled {
            return Outcome::Done;
        }

        let upload_engine = UploadEngine::new(
            self.adapter.clone(),
            self.config.upload.clone(),
            self.config.backup.backup_dir.clone(),
        );
        match upload_engine.upload(ctx, artifact.path()).await {
            Ok(()) => {
                self.ledger.record(artifact.path().to_path_buf(), Utc::now());
                let _ = self
                    .metrics
                    .record_upload_success(&database, started.elapsed())
                    .await;
                info!(database, "✅ upload completed");
                Outcome::Uploaded
            }
            Err(e) => {
                error!(database, error = %e, "❌ upload failed");
                let _ = self.metrics.record_upload_failure(&database).await;
                Outcome::UploadFailed
            }
        }
    }

    async fn create_backup_with_retry(
        &self,
        ctx: &OpContext,
        provider: &Provider,
        database: &str,
        out_dir: &PathBuf,
    ) -> Result<crate::subprocess::ArtifactShape, TenangError> {
        let attempts = self.config.backup.retry_count.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match provider
                .create_backup(ctx, self.adapter.as_ref(), database, out_dir)
                .await
            {
                Ok(artifact) => return Ok(artifact),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        database,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "backup attempt failed, will retry"
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        sleep(Duration::from_secs(self.config.backup.retry_delay_secs)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(TenangError::ConfigurationInvalid(
            "retry loop exited without an error or a result".to_string(),
        )))
    }

    fn database_out_dir(&self, database: &str) -> PathBuf {
        let month = Utc::now().format("%Y-%m");
        self.config
            .backup
            .backup_dir
            .join(database)
            .join(month.to_string())
    }

    fn clone_refs(&self) -> Self {
        Self {
            config: self.config.clone(),
            adapter: self.adapter.clone(),
            tracking: self.tracking.clone(),
            ledger: self.ledger.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

async fn artifact_size(path: &std::path::Path) -> std::io::Result<u64> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}
