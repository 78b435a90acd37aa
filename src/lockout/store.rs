use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::platform::common::atomic_write;

/// Key-value storage that outlives a single quiz session
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// One store shared between several controllers
impl<S: KeyValueStore> KeyValueStore for Arc<Mutex<S>> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?
            .get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?
            .set(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.lock()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?
            .delete(key)
    }
}

/// Key holding the unlock time (epoch ms) for a riddle
pub fn timer_key(riddle_id: u32) -> String {
    format!("timer_riddle{}", riddle_id)
}

/// Key set to "true" once a lock on the riddle ran out on its own
pub fn time_over_key(riddle_id: u32) -> String {
    format!("timeOver_riddle{}", riddle_id)
}

/// Key recording whether the last judged answer was correct
pub fn is_correct_key(riddle_id: u32) -> String {
    format!("isCorrect_riddle{}", riddle_id)
}

/// Read a "true"/"false" flag, anything else counts as unset
pub fn read_flag(store: &dyn KeyValueStore, key: &str) -> Result<Option<bool>> {
    Ok(match store.get(key)?.as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    })
}

pub fn write_flag(store: &mut dyn KeyValueStore, key: &str, value: bool) -> Result<()> {
    store.set(key, if value { "true" } else { "false" })
}

/// Volatile store, used in tests and for one-shot runs
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store persisted as a JSON object on disk
///
/// The file is the only copy: every read loads it and every mutation is a
/// read-modify-write of a single key, so other processes sharing the file see
/// each other's locks. Writes go through `atomic_write`, so a crash never
/// leaves a half-written store behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open the store, starting empty if the file does not exist yet
    ///
    /// Fails if an existing file cannot be parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        let entries = store.load()?;

        tracing::debug!("Opened store {} ({} keys)", store.path.display(), entries.len());

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file: {}", self.path.display()))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {}", self.path.display()))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)
            .context("Failed to serialize store")?;

        atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write store file: {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}
