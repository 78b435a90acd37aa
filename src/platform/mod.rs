//! Platform paths and filesystem helpers

pub mod common;

use anyhow::Result;
use std::path::PathBuf;

const APP_NAME: &str = "riddle-lock";

/// Default configuration file
///
/// - Linux: `~/.config/riddle-lock/config.toml`
/// - macOS: `~/Library/Application Support/riddle-lock/config.toml`
/// - Windows: `%APPDATA%\riddle-lock\config\config.toml`
/// - Fallback: `./riddle-lock.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("riddle-lock.toml")))
}

/// Default lock storage file
///
/// - Linux: `~/.local/share/riddle-lock/storage.json`
/// - macOS: `~/Library/Application Support/riddle-lock/storage.json`
/// - Windows: `%APPDATA%\riddle-lock\data\storage.json`
/// - Fallback: `./riddle-lock-storage.json`
pub fn default_storage_path() -> Result<PathBuf> {
    Ok(directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("storage.json"))
        .unwrap_or_else(|| PathBuf::from("riddle-lock-storage.json")))
}
