mod cleanup_engine;
mod cli;
mod config;
mod context;
mod error;
mod frequency_guard;
mod logging;
mod metrics;
mod orchestrator;
mod prompt;
mod provider;
mod restore;
mod state_dir;
mod subprocess;
mod tracking;
mod upload_ledger;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Command};
use config::AppConfig;
use context::OpContext;
use metrics::MetricsStore;
use orchestrator::BackupOrchestrator;
use provider::Provider;
use restore::{RestoreDriver, RestoreOptions};
use subprocess::{RealSubprocessAdapter, SubprocessAdapter};
use tracking::TrackingStore;
use upload_ledger::UploadLedger;

const EXIT_GENERAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_DB_CONNECTION: u8 = 3;
const EXIT_BACKUP: u8 = 4;
const EXIT_UPLOAD: u8 = 5;
const EXIT_CLEANUP: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err((code, message)) => {
            eprintln!("❌ {message}");
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<u8, (u8, String)> {
    match cli.command {
        Command::Version => {
            println!("tenangdb {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Backup {
            config,
            database,
            force,
            yes,
        } => run_backup(config, database, force, yes).await,
        Command::Restore {
            config,
            artifact_path,
            target_database,
            yes,
        } => run_restore(config, artifact_path, target_database, yes).await,
        Command::Cleanup {
            config,
            force,
            dry_run,
            database,
            max_age_days,
            yes,
        } => run_cleanup(config, force, dry_run, database, max_age_days, yes).await,
        Command::Exporter { config, port } => run_exporter(config, port).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig, (u8, String)> {
    let path = AppConfig::resolve_path(path.as_deref());
    AppConfig::load(&path).map_err(|e| (EXIT_CONFIG, e.to_string()))
}

fn init_logging(cfg: &AppConfig) -> Result<logging::LoggingGuard, (u8, String)> {
    logging::init(&cfg.logging).map_err(|e| (EXIT_GENERAL, format!("initializing logging: {e:#}")))
}

async fn run_backup(
    config_path: Option<PathBuf>,
    databases_filter: Vec<String>,
    force: bool,
    yes: bool,
) -> Result<u8, (u8, String)> {
    let mut cfg = load_config(config_path)?;
    let _guard = init_logging(&cfg)?;

    if force {
        cfg.backup.force = true;
    }
    if yes {
        cfg.backup.non_interactive = true;
    }
    if !databases_filter.is_empty() {
        cfg.databases
            .retain(|db| databases_filter.contains(&db.name));
    }

    let adapter: Arc<dyn SubprocessAdapter> = Arc::new(RealSubprocessAdapter::default());
    let ctx = OpContext::new();
    context::cancel_on_ctrl_c(ctx.clone());

    for db in &cfg.databases {
        let provider = Provider::for_config(db.clone()).map_err(|e| (EXIT_CONFIG, e.to_string()))?;
        provider.validate_tools(adapter.as_ref()).await.map_err(|e| {
            (EXIT_CONFIG, format!("validating tools for '{}': {e}", db.name))
        })?;
        provider
            .test_connection()
            .await
            .map_err(|e| (EXIT_DB_CONNECTION, format!("'{}': {e}", db.name)))?;
    }

    let state_dir = state_dir::ensure().map_err(|e| (EXIT_GENERAL, format!("{e:#}")))?;
    let tracking = Arc::new(
        TrackingStore::load(TrackingStore::path_in(&state_dir))
            .await
            .map_err(|e| (EXIT_GENERAL, e.to_string()))?,
    );
    let ledger = Arc::new(UploadLedger::new());
    let metrics = Arc::new(if cfg.metrics.enabled {
        MetricsStore::new(Some(cfg.metrics.file_path.clone()))
    } else {
        MetricsStore::disabled()
    });

    let cleanup_cfg = cfg.cleanup.clone();
    let upload_cfg = cfg.upload.clone();

    let orchestrator = BackupOrchestrator::new(cfg, adapter.clone(), tracking, ledger.clone(), metrics);
    let stats = orchestrator
        .run(&ctx)
        .await
        .map_err(|e| (EXIT_GENERAL, e.to_string()))?;

    // Delete-after-upload cleanup runs in-process at the end of a backup
    // run, against the ledger this same run populated.
    if cleanup_cfg.mode == config::CleanupMode::DeleteAfterUpload {
        let engine = cleanup_engine::CleanupEngine::new(cleanup_cfg, upload_cfg, adapter);
        let report = engine.run_delete_after_upload(&ledger).await;
        info!(
            files_removed = report.files_removed,
            bytes_freed = report.bytes_freed,
            "in-process cleanup after upload completed"
        );
    }

    if stats.failed_backups > 0 {
        return Ok(EXIT_BACKUP);
    }
    if stats.failed_uploads > 0 {
        return Ok(EXIT_UPLOAD);
    }
    Ok(0)
}

async fn run_restore(
    config_path: Option<PathBuf>,
    artifact_path: PathBuf,
    target_database: String,
    yes: bool,
) -> Result<u8, (u8, String)> {
    let cfg = load_config(config_path)?;
    let _guard = init_logging(&cfg)?;

    let provider_cfg = cfg
        .databases
        .iter()
        .find(|db| db.name == target_database)
        .cloned()
        .ok_or_else(|| {
            (
                EXIT_CONFIG,
                format!("no configured database named '{target_database}'"),
            )
        })?;

    let adapter: Arc<dyn SubprocessAdapter> = Arc::new(RealSubprocessAdapter::default());
    let provider = Provider::for_config(provider_cfg).map_err(|e| (EXIT_CONFIG, e.to_string()))?;
    let ctx = OpContext::new();
    context::cancel_on_ctrl_c(ctx.clone());
    let metrics = Arc::new(if cfg.metrics.enabled {
        MetricsStore::new(Some(cfg.metrics.file_path.clone()))
    } else {
        MetricsStore::disabled()
    });

    let target_exists = provider
        .database_exists(&target_database)
        .await
        .map_err(|e| (EXIT_DB_CONNECTION, e.to_string()))?;

    // Two-tier prompt: overwriting an existing target gets a different
    // warning than creating a fresh one. `--yes` bypasses both; absent it, a
    // non-interactive stdin (closed, redirected from /dev/null) reads an
    // empty line and declines, so a scripted run with no `-y` refuses rather
    // than overwriting silently.
    let confirmed = yes
        || if target_exists {
            prompt::confirm(&format!(
                "Target database '{target_database}' already exists and will be overwritten by this restore. Continue? [y/N] "
            ))
        } else {
            prompt::confirm(&format!(
                "Create database '{target_database}' from snapshot {}? [y/N] ",
                artifact_path.display()
            ))
        };

    if !confirmed {
        return Err((
            EXIT_BACKUP,
            format!("restore into '{target_database}' aborted: not confirmed"),
        ));
    }

    let driver = RestoreDriver::new(adapter);
    let opts = RestoreOptions {
        confirm_overwrite: true,
    };

    let started = std::time::Instant::now();
    match driver
        .restore(&ctx, &provider, &artifact_path, &target_database, target_exists, &opts)
        .await
    {
        Ok(()) => {
            let _ = metrics
                .record_restore_success(&target_database, started.elapsed())
                .await;
            Ok(0)
        }
        Err(e) => {
            let _ = metrics.record_restore_failure(&target_database).await;
            error!(target_database, error = %e, "❌ restore failed");
            Err((EXIT_BACKUP, e.to_string()))
        }
    }
}

async fn run_cleanup(
    config_path: Option<PathBuf>,
    force: bool,
    dry_run: bool,
    database_filter: Vec<String>,
    max_age_days: Option<u32>,
    _yes: bool,
) -> Result<u8, (u8, String)> {
    let mut cfg = load_config(config_path)?;
    let _guard = init_logging(&cfg)?;

    if dry_run {
        cfg.cleanup.dry_run = true;
    }
    if let Some(days) = max_age_days {
        cfg.cleanup.max_age_days = days;
    }
    if !database_filter.is_empty() {
        cfg.cleanup.database_filter = database_filter;
    }
    if force {
        cfg.cleanup.dry_run = false;
    }

    let adapter: Arc<dyn SubprocessAdapter> = Arc::new(RealSubprocessAdapter::default());
    let ctx = OpContext::new();
    context::cancel_on_ctrl_c(ctx.clone());
    let engine = cleanup_engine::CleanupEngine::new(cfg.cleanup.clone(), cfg.upload.clone(), adapter);

    let report = match cfg.cleanup.mode {
        config::CleanupMode::AgeBased => engine
            .run_age_based(&ctx, &cfg.backup.backup_dir)
            .await
            .map_err(|e| (EXIT_CLEANUP, e.to_string()))?,
        config::CleanupMode::DeleteAfterUpload => {
            let ledger = UploadLedger::new();
            engine.run_delete_after_upload(&ledger).await
        }
    };

    if cfg.metrics.enabled {
        let metrics = MetricsStore::new(Some(cfg.metrics.file_path.clone()));
        let _ = metrics
            .record_cleanup(report.files_removed, report.bytes_freed)
            .await;
    }

    info!(
        files_removed = report.files_removed,
        bytes_freed = report.bytes_freed,
        errors = report.errors.len(),
        "cleanup completed"
    );

    if !report.errors.is_empty() && report.files_removed == 0 {
        return Ok(EXIT_CLEANUP);
    }
    Ok(0)
}

async fn run_exporter(config_path: Option<PathBuf>, port: Option<u16>) -> Result<u8, (u8, String)> {
    let mut cfg = load_config(config_path)?;
    let _guard = init_logging(&cfg)?;

    if let Some(p) = port {
        cfg.metrics.bind_port = p;
    }

    let metrics = Arc::new(MetricsStore::new(Some(cfg.metrics.file_path.clone())));
    metrics::exporter::serve(metrics, cfg.metrics.bind_port)
        .await
        .map_err(|e| (EXIT_GENERAL, format!("exporter daemon: {e}")))?;
    Ok(0)
}

