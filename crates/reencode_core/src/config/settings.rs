//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Engine binary locations and encoding defaults.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Background task descriptor and budget.
    #[serde(default)]
    pub background: BackgroundSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Encoder settings read by the engine library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// ffmpeg executable (name on PATH or absolute path).
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// ffprobe executable, used to read the input duration.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// x264 preset.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Bitrate used when the caller passes 0 (bits per second).
    #[serde(default = "default_bitrate")]
    pub default_bitrate: i32,

    /// Lowest accepted bitrate.
    #[serde(default = "default_min_bitrate")]
    pub min_bitrate: i32,

    /// Highest accepted bitrate.
    #[serde(default = "default_max_bitrate")]
    pub max_bitrate: i32,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_bitrate() -> i32 {
    1_000_000
}

fn default_min_bitrate() -> i32 {
    100_000
}

fn default_max_bitrate() -> i32 {
    100_000_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            preset: default_preset(),
            default_bitrate: default_bitrate(),
            min_bitrate: default_min_bitrate(),
            max_bitrate: default_max_bitrate(),
        }
    }
}

impl EngineSettings {
    /// Check that the bitrate bounds are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_bitrate <= 0 {
            return Err(format!("min_bitrate must be positive, got {}", self.min_bitrate));
        }
        if self.min_bitrate > self.max_bitrate {
            return Err(format!(
                "min_bitrate {} is above max_bitrate {}",
                self.min_bitrate, self.max_bitrate
            ));
        }
        if !(self.min_bitrate..=self.max_bitrate).contains(&self.default_bitrate) {
            return Err(format!(
                "default_bitrate {} is outside {}..={}",
                self.default_bitrate, self.min_bitrate, self.max_bitrate
            ));
        }
        Ok(())
    }
}

/// Descriptor of the OS continuing task a job runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundSettings {
    /// Fixed identifier the launch handler is registered under.
    #[serde(default = "default_task_identifier")]
    pub task_identifier: String,

    /// Title shown by the OS while a job runs.
    #[serde(default = "default_title")]
    pub title: String,

    /// Time budget in seconds, 0 for none.
    #[serde(default)]
    pub budget_secs: u64,
}

fn default_task_identifier() -> String {
    "com.reencode.video".to_string()
}

fn default_title() -> String {
    "Re-encoding video".to_string()
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            task_identifier: default_task_identifier(),
            title: default_title(),
            budget_secs: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact per-job logs.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Number of lines kept for the failure tail.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Write a log file per job.
    #[serde(default)]
    pub job_logs: bool,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    20
}

fn default_error_tail() -> u32 {
    20
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            progress_step: default_progress_step(),
            error_tail: default_error_tail(),
            job_logs: false,
            logs_folder: default_logs_folder(),
        }
    }
}

impl LoggingSettings {
    /// Per-job logger configuration derived from these settings.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step.max(1),
            error_tail: self.error_tail as usize,
            ..LogConfig::default()
        }
    }

    /// Folder per-job logs go to, if job logs are enabled.
    pub fn job_logs_dir(&self) -> Option<PathBuf> {
        self.job_logs.then(|| PathBuf::from(&self.logs_folder))
    }
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Engine,
    Background,
    Logging,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 3] = [
        ConfigSection::Engine,
        ConfigSection::Background,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Engine => "engine",
            ConfigSection::Background => "background",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Engine => "# Encoder binaries and bitrate policy",
            ConfigSection::Background => "# Background task shown by the OS while a job runs",
            ConfigSection::Logging => "# Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let toml = toml::to_string_pretty(&Settings::default()).unwrap();
        assert!(toml.contains("[engine]"));
        assert!(toml.contains("[background]"));
        assert!(toml.contains("[logging]"));
        assert!(toml.contains("preset = \"medium\""));
        assert!(toml.contains("level = \"info\""));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[engine]\npreset = \"fast\"\n[logging]\nlevel = \"debug\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.engine.preset, "fast");
        assert_eq!(parsed.engine.default_bitrate, 1_000_000);
        assert_eq!(parsed.logging.level, LogLevel::Debug);
        assert_eq!(parsed.background, BackgroundSettings::default());
    }

    #[test]
    fn bitrate_bounds_are_validated() {
        assert!(EngineSettings::default().validate().is_ok());

        let inverted = EngineSettings {
            min_bitrate: 5_000_000,
            max_bitrate: 1_000_000,
            ..EngineSettings::default()
        };
        assert!(inverted.validate().is_err());

        let default_too_low = EngineSettings {
            default_bitrate: 50_000,
            ..EngineSettings::default()
        };
        assert!(default_too_low.validate().is_err());
    }

    #[test]
    fn job_logs_dir_only_when_enabled() {
        let mut logging = LoggingSettings::default();
        assert_eq!(logging.job_logs_dir(), None);
        logging.job_logs = true;
        assert_eq!(logging.job_logs_dir(), Some(PathBuf::from(".logs")));
    }

    #[test]
    fn log_config_never_gets_zero_step() {
        let logging = LoggingSettings {
            progress_step: 0,
            ..LoggingSettings::default()
        };
        assert_eq!(logging.to_log_config().progress_step, 1);
    }
}
