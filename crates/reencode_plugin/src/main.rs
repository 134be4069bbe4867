//! Reencode - run one re-encode through the plugin facade
//!
//! Usage: `reencode <input> <output> <width> <height> [bitrate]`
//!
//! Configuration is read from `$REENCODE_CONFIG`, or `settings.toml` in the
//! platform config directory (created with defaults on first run).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde_json::{json, Value};

use reencode_core::config::{ConfigManager, CONFIG_ENV};
use reencode_core::logging::init_tracing_with_file;
use reencode_plugin::{invoke, ReencodePlugin, PLUGIN_VERSION, REENCODE_VIDEO};

fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "reencode", "reencode")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from(".config").join("settings.toml"))
}

fn parse_args() -> Result<Value> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 || args.len() > 5 {
        bail!("usage: reencode <input> <output> <width> <height> [bitrate]");
    }
    let width: i64 = args[2].parse().with_context(|| format!("Invalid width: {}", args[2]))?;
    let height: i64 = args[3].parse().with_context(|| format!("Invalid height: {}", args[3]))?;

    let mut options = json!({
        "inputPath": args[0],
        "outputPath": args[1],
        "width": width,
        "height": height,
    });
    if let Some(bitrate) = args.get(4) {
        let bitrate: i64 = bitrate
            .parse()
            .with_context(|| format!("Invalid bitrate: {}", bitrate))?;
        options["bitrate"] = json!(bitrate);
    }
    Ok(options)
}

fn main() -> Result<()> {
    let options = parse_args()?;

    let config_path = config_path();
    let mut config = ConfigManager::new(&config_path);
    if let Err(e) = config.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }
    // The engine library reads the same file
    std::env::set_var(CONFIG_ENV, &config_path);

    let settings = config.settings().clone();
    let _log_guard = init_tracing_with_file(settings.logging.level, config.logs_folder())
        .context("Failed to set up logging")?;
    if let Err(e) = config.ensure_dirs_exist() {
        tracing::warn!("Failed to create directories: {}", e);
    }

    tracing::info!("Reencode {} starting", PLUGIN_VERSION);
    tracing::info!("Config: {}", config_path.display());

    let plugin = ReencodePlugin::from_settings(&settings).context("Failed to create plugin")?;
    plugin
        .add_listener(
            "progress",
            Arc::new(|data: &Value| match data.get("message") {
                Some(message) => eprintln!("failed at {}: {}", data["progress"], message),
                None => eprintln!("progress {:.1}%", data["progress"].as_f64().unwrap_or(0.0) * 100.0),
            }),
        )
        .context("Failed to register progress listener")?;

    match invoke(&plugin, REENCODE_VIDEO, options).wait() {
        Ok(_) => {
            tracing::info!("Done");
            Ok(())
        }
        Err(message) => bail!(message),
    }
}
