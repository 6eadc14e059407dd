//! Controller configuration.
//!
//! A `CacheConfig` is baked in per deployment: the generation name, the
//! origin the app is served from, the deployment base path and the precache
//! manifest. Changing `version` is the only way to invalidate every cached
//! entry on the next deployment.

use std::path::Path;

use edugenius_common::EduError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SwError;

/// Generation name used when none is configured.
pub const DEFAULT_VERSION: &str = "edugenius-v2";

/// Precache manifest of the EduGenius build: shell, PWA manifest, icon and
/// the script/style bundles. Deployments list their content-hashed bundle
/// names instead of the plain ones.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/pwalogo.png",
    "/manifest.json",
    "/assets/index.css",
    "/assets/index.js",
];

/// Offline cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache generation name.
    pub version: String,

    /// Origin the application is served from.
    pub origin: Url,

    /// Deployment base path, e.g. `/EduGenius`. Empty when served at the root.
    pub base_path: String,

    /// Precache manifest paths, relative to the base path.
    pub precache: Vec<String>,

    /// Document served for navigations when the network is unreachable.
    pub shell_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            origin: Url::parse("http://localhost:5173/").expect("static origin is valid"),
            base_path: String::new(),
            precache: DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
            shell_path: "/index.html".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration for a generation served from `origin`.
    pub fn new(version: impl Into<String>, origin: Url) -> Self {
        Self {
            version: version.into(),
            origin,
            ..Default::default()
        }
    }

    /// Set the deployment base path.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Replace the precache manifest.
    pub fn with_precache<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a JSON configuration and validate it.
    pub fn from_json(json: &str) -> edugenius_common::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config
            .validate()
            .map_err(|e| EduError::config_with_source("invalid cache config", e))?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> edugenius_common::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EduError::storage(path, e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> Result<(), SwError> {
        if self.version.is_empty() {
            return Err(SwError::Config("version must not be empty".to_string()));
        }
        // The version doubles as the on-disk file name of the generation.
        if !self
            .version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(SwError::Config(format!(
                "version {:?} may only contain [A-Za-z0-9._-]",
                self.version
            )));
        }

        if !matches!(self.origin.scheme(), "http" | "https") || self.origin.host_str().is_none() {
            return Err(SwError::Config(format!(
                "origin {} must be an http(s) URL with a host",
                self.origin
            )));
        }

        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/') || self.base_path.ends_with('/'))
        {
            return Err(SwError::Config(format!(
                "base path {:?} must start with '/' and not end with '/'",
                self.base_path
            )));
        }

        if self.precache.is_empty() {
            return Err(SwError::Config("precache manifest is empty".to_string()));
        }
        if let Some(bad) = self.precache.iter().find(|p| !p.starts_with('/')) {
            return Err(SwError::Config(format!(
                "precache path {:?} must start with '/'",
                bad
            )));
        }

        if !self.precache.contains(&self.shell_path) {
            return Err(SwError::Config(format!(
                "shell document {} is not in the precache manifest",
                self.shell_path
            )));
        }

        Ok(())
    }

    /// Resolve a manifest path against the origin and base path.
    pub fn resolve(&self, path: &str) -> Result<Url, SwError> {
        let full = format!("{}{}", self.base_path, path);
        self.origin
            .join(&full)
            .map_err(|e| SwError::InvalidUrl(format!("{}: {}", full, e)))
    }

    /// Absolute URLs of the precache manifest, in manifest order.
    pub fn precache_urls(&self) -> Result<Vec<Url>, SwError> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the shell document.
    pub fn shell_url(&self) -> Result<Url, SwError> {
        self.resolve(&self.shell_path)
    }
}
