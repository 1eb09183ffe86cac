//! Structured logging: a console layer plus a daily-rotating file appender
//! under the configured log directory.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Guard that must be held for the process lifetime to keep the non-blocking
/// file writer flushing.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = if config.json {
        None
    } else {
        Some(fmt::layer().with_target(false))
    };
    let console_json_layer = if config.json {
        Some(fmt::layer().with_target(false).json())
    } else {
        None
    };

    let (file_layer, file_guard) = if config.log_dir.as_os_str().is_empty() {
        (None, None)
    } else {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("creating log directory {}", config.log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, "tenangdb.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        (Some(layer), Some(guard))
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(console_json_layer)
        .with(file_layer);

    registry.try_init().context("installing tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
