use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/modelist.log";

/// How long the process is expected to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// A single command: quiet console, one log file appended forever.
    OneShot,
    /// `modelist watch`: timestamped console output and a log file rotated
    /// daily so a long-running watcher does not grow one file without bound.
    Daemon,
}

pub fn init_logger(mode: LogMode) -> WorkerGuard {
    let default_level = match mode {
        LogMode::OneShot => "info",
        LogMode::Daemon => "info,modelist_core::watch=debug",
    };
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| default_level.to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (directory, file_name) = split_log_path(&log_file_path);

    // Daily rotation appends a date suffix, so it needs the directory and
    // the file name separately.
    let file_appender = match mode {
        LogMode::OneShot => rolling::never(&directory, &file_name),
        LogMode::Daemon => rolling::daily(&directory, &file_name),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_thread_names(true)
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(filter_layer).with(file_layer);
    match mode {
        LogMode::OneShot => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .compact()
                    .with_target(false)
                    .without_time()
                    .with_ansi(true),
            )
            .init(),
        LogMode::Daemon => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .compact()
                    .with_target(false)
                    .with_ansi(true),
            )
            .init(),
    }

    info!("Logging to stdout and {} ({:?})", log_file_path, mode);

    guard
}

fn split_log_path(log_file_path: &str) -> (PathBuf, OsString) {
    let log_file = Path::new(log_file_path);
    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_else(|| "modelist.log".into());
    (directory.to_path_buf(), file_name)
}
