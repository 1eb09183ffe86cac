//! Exporter Daemon: a thin `axum` router that reads the Metrics Store
//! snapshot and renders Prometheus text exposition by hand.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::info;

use super::MetricsSnapshot;
use crate::metrics::MetricsStore;

#[derive(Clone)]
struct ExporterState {
    metrics: Arc<MetricsStore>,
}

pub async fn serve(metrics: Arc<MetricsStore>, port: u16) -> std::io::Result<()> {
    let state = ExporterState { metrics };
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "exporter daemon listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Waits for Ctrl-C so the exporter exits cleanly on SIGINT instead of being
/// killed mid-scrape.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("exporter daemon received interrupt signal, shutting down");
}

/// Re-reads the metrics file on every scrape rather than a cached in-memory
/// snapshot — the exporter process never writes to it, the backup/cleanup/
/// restore process does, so the file is the only thing that's current.
async fn metrics_handler(State(state): State<ExporterState>) -> impl IntoResponse {
    let snapshot = state.metrics.read_from_file().await;
    (StatusCode::OK, render_prometheus_text(&snapshot))
}

/// `/health` never returns 500: a transiently unreadable metrics file
/// degrades to `system_health 0` in a 200 response rather than failing the
/// probe outright.
async fn health_handler(State(state): State<ExporterState>) -> impl IntoResponse {
    let snapshot = state.metrics.read_from_file().await;
    let healthy = snapshot.system_health;
    let body = if healthy { "ok\n" } else { "degraded\n" };
    (StatusCode::OK, body)
}

fn render_prometheus_text(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    for (db, counters) in &snapshot.databases {
        let db = escape_label(db);
        let _ = writeln!(
            out,
            "backup_success_total{{database=\"{db}\"}} {}",
            counters.backup_success_total
        );
        let _ = writeln!(
            out,
            "backup_failed_total{{database=\"{db}\"}} {}",
            counters.backup_failed_total
        );
        let _ = writeln!(
            out,
            "backup_duration_seconds{{database=\"{db}\"}} {}",
            counters.backup_duration_seconds
        );
        let _ = writeln!(
            out,
            "backup_size_bytes{{database=\"{db}\"}} {}",
            counters.backup_size_bytes
        );
        if let Some(ts) = counters.backup_last_timestamp {
            let _ = writeln!(out, "backup_last_timestamp{{database=\"{db}\"}} {ts}");
        }
        let _ = writeln!(
            out,
            "upload_success_total{{database=\"{db}\"}} {}",
            counters.upload_success_total
        );
        let _ = writeln!(
            out,
            "upload_failed_total{{database=\"{db}\"}} {}",
            counters.upload_failed_total
        );
        let _ = writeln!(
            out,
            "upload_duration_seconds{{database=\"{db}\"}} {}",
            counters.upload_duration_seconds
        );
        let _ = writeln!(
            out,
            "restore_success_total{{database=\"{db}\"}} {}",
            counters.restore_success_total
        );
        let _ = writeln!(
            out,
            "restore_failed_total{{database=\"{db}\"}} {}",
            counters.restore_failed_total
        );
        let _ = writeln!(
            out,
            "restore_duration_seconds{{database=\"{db}\"}} {}",
            counters.restore_duration_seconds
        );
    }

    let _ = writeln!(
        out,
        "cleanup_files_removed_total {}",
        snapshot.cleanup.cleanup_files_removed_total
    );
    let _ = writeln!(
        out,
        "cleanup_bytes_freed_total {}",
        snapshot.cleanup.cleanup_bytes_freed_total
    );
    let _ = writeln!(out, "total_databases {}", snapshot.total_databases);
    let _ = writeln!(
        out,
        "backup_process_active {}",
        snapshot.backup_process_active as u8
    );
    let _ = writeln!(out, "system_health {}", snapshot.system_health as u8);
    if let Some(ts) = snapshot.last_process_timestamp {
        let _ = writeln!(out, "last_process_timestamp {ts}");
    }

    out
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PerDatabaseCounters;
    use std::collections::HashMap;

    #[test]
    fn renders_full_exposition_without_panicking() {
        let mut databases = HashMap::new();
        databases.insert(
            "orders".to_string(),
            PerDatabaseCounters {
                backup_success_total: 3,
                ..Default::default()
            },
        );
        let snapshot = MetricsSnapshot {
            databases,
            total_databases: 1,
            backup_process_active: true,
            system_health: true,
            ..Default::default()
        };
        let text = render_prometheus_text(&snapshot);
        assert!(text.contains("backup_success_total{database=\"orders\"} 3"));
        assert!(text.contains("backup_process_active 1"));
    }

    #[test]
    fn escapes_quotes_in_database_label() {
        assert_eq!(escape_label("a\"b"), "a\\\"b");
    }
}
