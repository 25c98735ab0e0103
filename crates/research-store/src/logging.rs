//! Tracing initialization: bounded stdout plus daily-rotated file logs.
//!
//! stdout stays at WARN (compact, human-friendly) regardless of `RUST_LOG`
//! so pipeline runs don't amplify logs into transcripts. The file layer
//! defaults to the configured level for our crates and honors `RUST_LOG`
//! as an override.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogLevel;

/// Guards that must be held for the lifetime of the process.
/// Dropping this will cause buffered logs to be lost.
pub struct TracingGuards {
    _file_guard: WorkerGuard,
}

/// Initialize tracing for a pipeline binary.
///
/// # Parameters
/// * `logs_dir` - Workspace logs directory (daily rotation target).
/// * `service_name` - Log file stem, e.g. "research-kit".
/// * `level` - File-layer level for our crates.
pub fn init_tracing(logs_dir: &Path, service_name: &str, level: LogLevel) -> TracingGuards {
    let _ = std::fs::create_dir_all(logs_dir);

    let file_appender =
        tracing_appender::rolling::daily(logs_dir, format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    // stdout: always WARN, ignoring RUST_LOG.
    let stdout_filter = EnvFilter::new("warn");

    // One directive per pipeline crate; deps stay at WARN.
    let directive = level.as_directive();
    let default_file_filter = [
        "research_models",
        "research_store",
        "research_ingest",
        "research_codegen",
        "research_gates",
        "research_backtest",
        "research_synthesis",
        "research_runner",
    ]
    .iter()
    .map(|krate| format!("{krate}={directive}"))
    .collect::<Vec<_>>()
    .join(",")
        + ",warn";
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_file_filter));

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_filter(stdout_filter);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        "logging initialized for {} (stdout=WARN, file={}/{}.log)",
        service_name,
        logs_dir.display(),
        service_name
    );

    TracingGuards {
        _file_guard: file_guard,
    }
}
