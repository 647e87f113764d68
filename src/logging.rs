//! Logging initialisation
//!
//! Stdout in one of three formats, plus an optional file sink. A plain
//! file is written synchronously; a log directory gets a daily-rolling
//! file behind a non-blocking writer whose guard must be kept alive.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file prefix inside a log directory
const LOG_FILE_PREFIX: &str = "lamco-screen-manager.log";

/// Where file output goes
#[derive(Debug, Clone, Copy)]
pub enum LogSink<'a> {
    /// Stdout only
    Stdout,
    /// Stdout plus a single file
    File(&'a Path),
    /// Stdout plus a daily-rolling file in a directory
    Directory(&'a Path),
}

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("lamco_screen_manager={},warn", level))
}

/// Install the global tracing subscriber
///
/// # Arguments
///
/// * `level` - Level for this crate when `RUST_LOG` is unset
/// * `format` - `"json"`, `"compact"` or anything else for pretty
/// * `sink` - Optional file output
///
/// # Returns
///
/// Guard flushing the rolling file writer; `None` for other sinks
pub fn init_logging(level: &str, format: &str, sink: LogSink<'_>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    let (file_writer, guard) = file_writer(sink)?;

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .try_init()?;
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(file_writer.map(|writer| {
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                }))
                .try_init()?;
        }
    }

    Ok(guard)
}

fn file_writer(sink: LogSink<'_>) -> Result<(Option<BoxMakeWriter>, Option<WorkerGuard>)> {
    match sink {
        LogSink::Stdout => Ok((None, None)),
        LogSink::File(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            Ok((Some(BoxMakeWriter::new(Arc::new(file))), None))
        }
        LogSink::Directory(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            Ok((Some(BoxMakeWriter::new(writer)), Some(guard)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.log");
        let (writer, guard) = file_writer(LogSink::File(&path)).unwrap();
        assert!(writer.is_some());
        assert!(guard.is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_directory_sink_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let (writer, guard) = file_writer(LogSink::Directory(&logs)).unwrap();
        assert!(writer.is_some());
        assert!(guard.is_some());
        assert!(logs.is_dir());
    }

    #[test]
    fn test_stdout_sink_has_no_writer() {
        let (writer, guard) = file_writer(LogSink::Stdout).unwrap();
        assert!(writer.is_none());
        assert!(guard.is_none());
    }
}
