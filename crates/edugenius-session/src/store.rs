//! String key/value stores.

use std::path::{Path, PathBuf};

use edugenius_common::{EduError, Result};
use hashbrown::HashMap;
use tracing::debug;

/// Application directory name under the platform data dir.
const APP_NAME: &str = "edugenius";

/// Durable store file name.
const SESSION_FILE: &str = "session.json";

/// A string key/value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn is_empty(&self) -> bool;
}

// ==================== Memory Store ====================

/// Short-lived store; gone when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.values.clear();
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ==================== File Store ====================

/// Durable store backed by a JSON file. Every write is flushed to disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| EduError::storage(&path, e.to_string()))?;
            serde_json::from_str(&contents).map_err(|e| EduError::storage(&path, e.to_string()))?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "Opened durable store");
        Ok(Self { path, values })
    }

    /// Platform default location, e.g. `~/.local/share/edugenius/session.json`.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| EduError::config("could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EduError::storage(parent, e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, contents)
            .map_err(|e| EduError::storage(&self.path, e.to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.values.clear();
        self.flush()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
