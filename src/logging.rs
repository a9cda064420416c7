//! Tracing configuration and log routing.
//!
//! The server logs to stdout with a compact formatter and appends the same events to a log
//! file (`DOCSIFT_LOG_FILE`, default `logs/docsift.log`) through a non-blocking writer. The
//! CLI logs to stderr only so stdout carries nothing but JSON.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILE: &str = "logs/docsift.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Configure tracing subscribers for the HTTP server.
///
/// `RUST_LOG` controls filtering (default `info`). The file layer is skipped, with a note on
/// stderr, when the log file cannot be opened.
pub fn init_tracing() {
    let registry = tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer().with_target(false).compact());

    match file_writer(&log_file_path(std::env::var("DOCSIFT_LOG_FILE").ok())) {
        Some(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
            .init(),
        None => registry.init(),
    }
}

/// Configure a stderr-only subscriber for one-shot command line runs (default `warn`).
pub fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn log_file_path(configured: Option<String>) -> PathBuf {
    configured
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from)
}

/// Open `path` for appending behind a non-blocking writer, creating its directory first.
fn file_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {err}", dir.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_falls_back_to_default() {
        assert_eq!(log_file_path(None), PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(
            log_file_path(Some("  ".into())),
            PathBuf::from(DEFAULT_LOG_FILE)
        );
        assert_eq!(
            log_file_path(Some("/var/log/docsift.log".into())),
            PathBuf::from("/var/log/docsift.log")
        );
    }
}
