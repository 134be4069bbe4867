//! Configuration management for the re-encode plugin.
//!
//! This module provides:
//! - TOML-based configuration with `[engine]`, `[background]` and
//!   `[logging]` sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use reencode_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/reencode.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Preset: {}", config.settings().engine.preset);
//!
//! config.settings_mut().logging.compact = false;
//! config.update_section(ConfigSection::Logging).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{
    settings_from_env, settings_from_path, ConfigError, ConfigManager, ConfigResult, CONFIG_ENV,
};
pub use settings::{
    BackgroundSettings, ConfigSection, EngineSettings, LoggingSettings, Settings,
};
