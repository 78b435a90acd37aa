use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::lockout::{FileStore, KeyValueStore, LockoutController, SystemClock};
use crate::platform;

/// Initialize logging
///
/// `RUST_LOG` wins over both the config level and `--verbose`.
pub fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if verbose { "debug" } else { level };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Resolve the configuration path from the command line or the platform default
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => platform::default_config_path(),
    }
}

/// Load configuration, pointing at `init` when there is none
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!(
            "No configuration found at {}.\nCreate one with: riddle-lock init",
            path.display()
        );
    }

    Config::load(path)
}

/// Open the lock storage configured for this machine
pub fn open_store(config: &Config) -> Result<FileStore> {
    let path = config.storage_path()?;
    FileStore::open(&path)
        .with_context(|| format!("Failed to open lock storage: {}", path.display()))
}

/// Controller for one riddle over the given store, using the wall clock
pub fn controller_for(
    config: &Config,
    riddle_id: u32,
    store: Box<dyn KeyValueStore>,
) -> LockoutController {
    LockoutController::new(
        riddle_id,
        store,
        Arc::new(SystemClock),
        config.lockout_settings(riddle_id),
    )
}
