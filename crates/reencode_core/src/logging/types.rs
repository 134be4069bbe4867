//! Log levels and per-job log settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum level, as written in `[logging] level`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

/// What a [`JobLogger`](super::JobLogger) writes for one re-encode.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Write progress in `progress_step` bands and keep engine samples out
    /// of the file unless the job fails.
    pub compact: bool,
    /// Band width in percent.
    pub progress_step: u32,
    /// Engine samples kept for the failure dump.
    pub error_tail: usize,
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: 20,
            error_tail: 20,
            show_timestamps: true,
        }
    }
}

impl LogConfig {
    /// Every progress change and every engine sample.
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            compact: false,
            progress_step: 1,
            error_tail: 50,
            show_timestamps: true,
        }
    }
}

/// Receives each job log line without its timestamp.
pub type LogLineCallback = Box<dyn Fn(&str) + Send + Sync>;
