//! Logging infrastructure for the re-encode bridge.
//!
//! This module provides:
//! - Process-wide `tracing` setup (stderr, optionally a daily rolling file)
//! - Per-job loggers with file + callback output
//! - Compact mode with progress filtering
//! - Tail buffer dumped when a job fails
//!
//! # Example
//!
//! ```no_run
//! use reencode_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("job-1", "/path/to/logs", LogConfig::default(), None).unwrap();
//!
//! logger.phase("Re-encode");
//! logger.progress(50);
//! logger.success("Job completed");
//! ```

mod job_logger;
mod types;

use std::io;
use std::path::Path;

pub use job_logger::JobLogger;
pub use types::{LogConfig, LogLevel, LogLineCallback};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix of the rolling application log.
const LOG_FILE_PREFIX: &str = "reencode.log";

/// Target of job log lines mirrored into `tracing`.
pub const JOB_LOG_TARGET: &str = "reencode::job";

/// Callback mirroring job log lines into the application log at debug
/// level, inside whatever span is current (the coordinator's job span).
pub fn job_line_forwarder() -> LogLineCallback {
    Box::new(|line: &str| tracing::debug!(target: JOB_LOG_TARGET, "{}", line))
}

/// Initialize global tracing subscriber for application-wide logging.
///
/// Respects `RUST_LOG`, falling back to `default_level`, and writes to
/// stderr. Should be called once at startup.
pub fn init_tracing(default_level: LogLevel) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(env_filter(default_level))
        .init();
}

/// Like [`init_tracing`], plus a daily rolling file in `log_dir`.
///
/// Keep the returned guard alive for as long as logging should reach the
/// file; dropping it flushes and stops the writer thread.
pub fn init_tracing_with_file(
    default_level: LogLevel,
    log_dir: impl AsRef<Path>,
) -> io::Result<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(env_filter(default_level))
        .init();

    Ok(guard)
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(any(test, feature = "test-support"))]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_to_filter_works() {
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
        assert_eq!(LogLevel::Info.as_filter_str(), "info");
    }

    #[test]
    fn forwarder_accepts_lines_without_subscriber() {
        let forward = job_line_forwarder();
        forward("=== Re-encode ===");
        forward("[ERROR] unsupported codec");
    }
}
