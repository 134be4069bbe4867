//! Reading and writing the plugin's `settings.toml`.
//!
//! Writes go to a temp file that is renamed over the original. A single
//! table can be replaced with `toml_edit` without disturbing the rest of the
//! file. Tables this version does not know are dropped on load.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Environment variable naming the config file the engine library reads.
pub const CONFIG_ENV: &str = "REENCODE_CONFIG";

/// Failures while loading or writing the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid [{section}] settings: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

/// Shorthand for config results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the plugin configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Manager for `config_path`, holding defaults until loaded.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory only until `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Read and validate an existing file. A missing file is an error.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = parse_and_validate(&content)?;
        Ok(())
    }

    /// Read the file, or write one with defaults if there is none.
    ///
    /// Also drops unknown sections and fills in missing keys, saving if
    /// anything changed.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_validate_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                tracing::debug!(path = %self.config_path.display(), "Rewriting cleaned config");
                self.save()?;
            }
        } else {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            self.settings = Settings::default();
            self.save()?;
            tracing::info!(path = %self.config_path.display(), "Created default config");
        }
        Ok(())
    }

    /// Ensure the logs directory exists.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let logs = self.logs_folder();
        if !logs.exists() {
            fs::create_dir_all(&logs)?;
        }
        Ok(())
    }

    /// Directory for job logs and the rolling application log.
    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.logging.logs_folder)
    }

    /// Rewrite the whole file with section comments.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Replace one table on disk.
    ///
    /// Re-reads the file from disk, replaces only the given table, and
    /// writes back atomically, so other sections and their comments survive.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let content = match section {
            ConfigSection::Engine => toml::to_string_pretty(&self.settings.engine)?,
            ConfigSection::Background => toml::to_string_pretty(&self.settings.background)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Video re-encode plugin configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n",
        );

        for section in ConfigSection::ALL {
            output.push('\n');
            output.push_str(section.comment());
            output.push('\n');
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file in the same directory so the rename stays atomic
        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Settings from the file named by [`CONFIG_ENV`], or defaults when unset.
pub fn settings_from_env() -> ConfigResult<Settings> {
    settings_from_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Settings from `path`, or defaults when `None`.
pub fn settings_from_path(path: Option<PathBuf>) -> ConfigResult<Settings> {
    match path {
        Some(path) => {
            let mut manager = ConfigManager::new(path);
            manager.load()?;
            Ok(manager.settings)
        }
        None => Ok(Settings::default()),
    }
}

fn parse_and_validate(content: &str) -> ConfigResult<Settings> {
    let settings: Settings = toml::from_str(content)?;
    settings
        .engine
        .validate()
        .map_err(|message| ConfigError::Invalid {
            section: ConfigSection::Engine.table_name(),
            message,
        })?;
    Ok(settings)
}

/// Returns the settings and whether the file needs rewriting.
fn parse_validate_and_clean(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings = parse_and_validate(content)?;

    let has_unknown = doc.iter().any(|(key, _)| {
        !ConfigSection::ALL
            .iter()
            .any(|section| section.table_name() == key)
    });

    // Re-serializing differently means defaults were filled in
    let reserialized = toml::to_string_pretty(&settings)?;
    let was_modified = has_unknown || content.trim() != reserialized.trim();

    Ok((settings, was_modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("reencode.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[engine]"));
        assert!(content.contains("[background]"));
        assert!(content.contains("[logging]"));
        assert!(content.contains("# Encoder binaries"));
    }

    #[test]
    fn generated_file_loads_back() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");
        ConfigManager::new(&config_path).save().unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load().unwrap();
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");
        fs::write(
            &config_path,
            "[engine]\nffmpeg_path = \"/opt/ffmpeg/bin/ffmpeg\"\n[stale]\nx = 1\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().engine.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(!content.contains("[stale]"));
        assert!(content.contains("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn invalid_bitrate_bounds_are_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");
        fs::write(&config_path, "[engine]\nmin_bitrate = 0\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        assert!(matches!(
            manager.load(),
            Err(ConfigError::Invalid { section: "engine", .. })
        ));
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        manager.settings_mut().logging.level = LogLevel::Debug;
        manager.settings_mut().engine.preset = "ultrafast".to_string();
        manager.update_section(ConfigSection::Logging).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("level = \"debug\""));
        assert!(content.contains("preset = \"medium\""));
        assert!(content.contains("# Encoder binaries"));
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn ensure_dirs_creates_logs_folder() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("reencode.toml"));
        manager.settings_mut().logging.logs_folder =
            dir.path().join("logs").to_string_lossy().into_owned();

        manager.ensure_dirs_exist().unwrap();

        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn settings_from_path_defaults_without_path() {
        assert_eq!(settings_from_path(None).unwrap(), Settings::default());
    }

    #[test]
    fn settings_from_path_reads_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("reencode.toml");
        fs::write(&config_path, "[engine]\npreset = \"slow\"\n").unwrap();

        let settings = settings_from_path(Some(config_path)).unwrap();
        assert_eq!(settings.engine.preset, "slow");
    }
}
