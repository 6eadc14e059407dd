//! # EduGenius Common
//!
//! Shared error type and logging setup for the EduGenius offline runtime.

use std::path::PathBuf;
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for EduGenius.
#[derive(Error, Debug)]
pub enum EduError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persistent storage errors.
    #[error("Storage error at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    /// JSON encoding or decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EduError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error for a file or directory.
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            EduError::Config { .. } => "config",
            EduError::Storage { .. } => "storage",
            EduError::Json(_) => "json",
        }
    }
}

/// Result type alias for EduGenius operations.
pub type Result<T> = std::result::Result<T, EduError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_categories() {
        assert_eq!(EduError::config("bad").category(), "config");
        assert_eq!(
            EduError::storage("/tmp/x.json", "truncated").category(),
            "storage"
        );
        let json = serde_json::from_str::<u16>("nope").unwrap_err();
        assert_eq!(EduError::from(json).category(), "json");
    }

    #[test]
    fn test_storage_message_includes_path() {
        let err = EduError::storage("/var/cache/edugenius-v2.json", "truncated");
        assert_eq!(
            err.to_string(),
            "Storage error at /var/cache/edugenius-v2.json: truncated"
        );
    }

    #[test]
    fn test_config_with_source_keeps_source() {
        let parsed = "abc".parse::<u16>().unwrap_err();
        let err = EduError::config_with_source("invalid port", parsed);
        assert_eq!(err.to_string(), "Config error: invalid port");
        assert!(err.source().is_some());
        assert!(EduError::config("bad").source().is_none());
    }
}
