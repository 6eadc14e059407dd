//! Cache generations and their storage.
//!
//! `CacheStorage` holds every generation by name. Callers share it as
//! [`SharedCacheStorage`]; each read or write takes the lock once, which is
//! what gives per-key atomicity. Concurrent writers to the same key race and
//! the last one wins.

use std::path::Path;
use std::sync::Arc;

use edugenius_common::EduError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage shared between the controller, the registration and callers.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Final response URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    #[serde(default)]
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ==================== Cache ====================

/// One cache generation.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Generation name.
    pub name: String,

    /// Entries by request key.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create an empty generation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request key.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the key.
    pub fn put(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All request keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All cache generations.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into shared storage.
    pub fn shared(self) -> SharedCacheStorage {
        Arc::new(RwLock::new(self))
    }

    /// Open a generation, creating it if it doesn't exist.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a generation without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Get a generation mutably without creating it.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cache> {
        self.caches.get_mut(name)
    }

    /// Check if a generation exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a generation.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All generation names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.caches.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Match a request key in one generation.
    pub fn match_in(&self, name: &str, key: &str) -> Option<&CacheEntry> {
        self.caches.get(name)?.match_request(key)
    }

    /// Write every generation to `dir` as `<name>.json`.
    ///
    /// Files of generations no longer present are removed.
    pub fn save_to_dir(&self, dir: &Path) -> edugenius_common::Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| EduError::storage(dir, e.to_string()))?;

        for cache in self.caches.values() {
            let path = dir.join(format!("{}.json", cache.name));
            let tmp = dir.join(format!("{}.json.tmp", cache.name));
            let contents = serde_json::to_vec(cache)?;
            std::fs::write(&tmp, contents).map_err(|e| EduError::storage(&tmp, e.to_string()))?;
            std::fs::rename(&tmp, &path).map_err(|e| EduError::storage(&path, e.to_string()))?;
            debug!(generation = %cache.name, entries = cache.len(), "Generation saved");
        }

        for path in json_files(dir)? {
            let stale = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|name| !self.caches.contains_key(name));
            if stale {
                std::fs::remove_file(&path).map_err(|e| EduError::storage(&path, e.to_string()))?;
                info!(path = %path.display(), "Removed stale generation file");
            }
        }

        Ok(())
    }

    /// Load every `<name>.json` generation from `dir`.
    ///
    /// A missing directory yields empty storage.
    pub fn load_from_dir(dir: &Path) -> edugenius_common::Result<Self> {
        let mut storage = Self::new();
        if !dir.exists() {
            return Ok(storage);
        }

        for path in json_files(dir)? {
            let contents =
                std::fs::read(&path).map_err(|e| EduError::storage(&path, e.to_string()))?;
            let cache: Cache = serde_json::from_slice(&contents)
                .map_err(|e| EduError::storage(&path, e.to_string()))?;

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem != cache.name {
                warn!(path = %path.display(), generation = %cache.name, "Generation name does not match file name");
            }
            debug!(generation = %cache.name, entries = cache.len(), "Generation loaded");
            storage.caches.insert(cache.name.clone(), cache);
        }

        Ok(storage)
    }
}

fn json_files(dir: &Path) -> edugenius_common::Result<Vec<std::path::PathBuf>> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| EduError::storage(dir, e.to_string()))?;
    let mut files = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry.map_err(|e| EduError::storage(dir, e.to_string()))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &[u8]) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: body.to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = Cache::new("edugenius-v2");
        let key = "GET https://edu.example.com/index.html";

        cache.put(key, entry("https://edu.example.com/index.html", b"old"));
        cache.put(key, entry("https://edu.example.com/index.html", b"new"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_request(key).unwrap().body, b"new");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("edugenius-v2");
        cache.put("GET https://e.com/a.js", entry("https://e.com/a.js", b"a"));
        assert!(cache.delete("GET https://e.com/a.js"));
        assert!(!cache.delete("GET https://e.com/a.js"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("edugenius-v2"));

        storage.open("edugenius-v2");
        storage.open("edugenius-v3");
        assert_eq!(storage.keys(), vec!["edugenius-v2", "edugenius-v3"]);

        assert!(storage.delete("edugenius-v2"));
        assert!(!storage.has("edugenius-v2"));
        assert!(storage.get("edugenius-v2").is_none());
    }

    #[test]
    fn test_match_in_is_scoped_to_generation() {
        let mut storage = CacheStorage::new();
        let key = "GET https://e.com/index.html";
        storage
            .open("edugenius-v2")
            .put(key, entry("https://e.com/index.html", b"v2"));
        storage.open("edugenius-v3");

        assert!(storage.match_in("edugenius-v2", key).is_some());
        assert!(storage.match_in("edugenius-v3", key).is_none());
        assert!(storage.match_in("missing", key).is_none());
    }

    #[test]
    fn test_save_and_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let key = "GET https://e.com/pwalogo.png";
        let png = [0x89u8, 0x50, 0x4e, 0x47, 0x00, 0xff];

        let mut storage = CacheStorage::new();
        storage
            .open("edugenius-v2")
            .put(key, entry("https://e.com/pwalogo.png", &png));
        storage.save_to_dir(dir.path()).unwrap();

        let loaded = CacheStorage::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.keys(), vec!["edugenius-v2"]);
        assert_eq!(loaded.match_in("edugenius-v2", key).unwrap().body, png);
    }

    #[test]
    fn test_save_removes_deleted_generations() {
        let dir = tempfile::tempdir().unwrap();

        let mut storage = CacheStorage::new();
        storage.open("edugenius-v2");
        storage.open("edugenius-v3");
        storage.save_to_dir(dir.path()).unwrap();
        assert!(dir.path().join("edugenius-v2.json").exists());

        storage.delete("edugenius-v2");
        storage.save_to_dir(dir.path()).unwrap();

        assert!(!dir.path().join("edugenius-v2.json").exists());
        let loaded = CacheStorage::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.keys(), vec!["edugenius-v3"]);
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CacheStorage::load_from_dir(&dir.path().join("nope")).unwrap();
        assert!(loaded.keys().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("edugenius-v2.json"), b"{ not json").unwrap();

        let err = CacheStorage::load_from_dir(dir.path()).unwrap_err();
        assert_eq!(err.category(), "storage");
    }
}
