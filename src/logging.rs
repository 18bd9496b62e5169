//! Structured logging: console (stderr) plus a daily rolling file.
//!
//! stdout is reserved for responses in `call`/`serve` mode, so the console
//! layer writes to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "cierre";
const MAX_LOG_FILES: usize = 14;
const DEFAULT_FILTER: &str = "info,cierre_caja_lib=debug";

/// Install the global subscriber. Safe to call once per process; a second
/// call is a no-op.
pub fn init(log_dir: &Path) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fs::create_dir_all(log_dir).ok();
    prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    // Dropping the guard flushes and stops the writer; the process owns it.
    if installed {
        std::mem::forget(guard);
    }
}

/// Keep the newest `MAX_LOG_FILES` rolled files in `log_dir`.
pub fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(LOG_FILE_PREFIX))
                .unwrap_or(false)
        })
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (path, modified)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
