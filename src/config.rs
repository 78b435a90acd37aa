use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lockout::LockoutSettings;

/// Commented example written by `riddle-lock init`
pub const EXAMPLE_CONFIG: &str = include_str!("../example-config.toml");

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub service: ServiceConfig,

    #[serde(default)]
    pub lockout: LockoutConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub riddles: Vec<RiddleConfig>,
}

/// Quiz backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL the quiz endpoints hang off
    pub base_url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Lockout defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockoutConfig {
    /// Used when the backend judges an answer wrong without a lock duration
    #[serde(default = "default_fallback_lock_ms")]
    pub fallback_lock_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Persistent storage settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A riddle known to this client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiddleConfig {
    pub id: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Overrides `lockout.fallback_lock_ms` for this riddle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_lock_ms: Option<u64>,
}

// Default values
fn default_timeout_secs() -> u64 {
    30
}

fn default_fallback_lock_ms() -> u64 {
    180_000 // 3 minutes
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            fallback_lock_ms: default_fallback_lock_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;

        crate::platform::common::atomic_write(path, toml.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        crate::service::parse_base_url(&self.service.base_url)
            .context("Invalid service.base_url")?;

        if self.service.timeout_secs == 0 {
            anyhow::bail!("service.timeout_secs must be greater than 0");
        }

        if self.lockout.fallback_lock_ms == 0 {
            anyhow::bail!("lockout.fallback_lock_ms must be greater than 0");
        }

        if self.lockout.tick_interval_ms == 0 {
            anyhow::bail!("lockout.tick_interval_ms must be greater than 0");
        }

        let mut seen = std::collections::HashSet::new();
        for riddle in &self.riddles {
            if !seen.insert(riddle.id) {
                anyhow::bail!("Duplicate riddle id: {}", riddle.id);
            }

            if riddle.fallback_lock_ms == Some(0) {
                anyhow::bail!("Riddle {}: fallback_lock_ms must be greater than 0", riddle.id);
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Unknown log level: {}", other),
        }

        Ok(())
    }

    /// Lock settings for a riddle, applying its override if configured
    pub fn lockout_settings(&self, riddle_id: u32) -> LockoutSettings {
        let fallback_ms = self
            .riddle(riddle_id)
            .and_then(|r| r.fallback_lock_ms)
            .unwrap_or(self.lockout.fallback_lock_ms);

        LockoutSettings {
            fallback_lock: Duration::from_millis(fallback_ms),
            tick_interval: Duration::from_millis(self.lockout.tick_interval_ms),
        }
    }

    pub fn riddle(&self, riddle_id: u32) -> Option<&RiddleConfig> {
        self.riddles.iter().find(|r| r.id == riddle_id)
    }

    /// Display name of a riddle
    pub fn riddle_name(&self, riddle_id: u32) -> String {
        self.riddle(riddle_id)
            .and_then(|r| r.name.clone())
            .unwrap_or_else(|| format!("Riddle {}", riddle_id))
    }

    /// Storage file, from config or the platform data directory
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => crate::platform::default_storage_path(),
        }
    }
}
