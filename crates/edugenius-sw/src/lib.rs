//! # EduGenius Offline Cache
//!
//! Offline caching and update lifecycle for the EduGenius progressive web app.
//!
//! ## Features
//!
//! - **Lifecycle**: install (precache), activate (drop stale generations), fetch
//! - **Cache generations**: one named, versioned `Cache` per deployed build
//! - **Cache-first fetch**: cached responses first, then network, with the
//!   shell document as the offline fallback for navigations
//! - **Registration**: adopts new deployments with skip-waiting and client claim
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── installing / waiting / active (ServiceWorker)
//!     │       └── CacheController ── Fetcher (network)
//!     └── Clients
//!
//! CacheStorage (shared)
//!     └── Cache (generation, e.g. "edugenius-v2")
//!             └── request key → CacheEntry
//! ```

use thiserror::Error;

pub mod config;
pub mod controller;
pub mod fetch;
pub mod policy;
pub mod registration;
pub mod request;
pub mod storage;

pub use config::CacheConfig;
pub use controller::CacheController;
pub use fetch::{Fetcher, LoaderConfig, NetworkFetcher};
// Scripted test double, exported for integration tests and tool tests.
pub use fetch::MemoryFetcher;
pub use policy::{CachePolicy, NonCacheableReason};
pub use registration::{
    Client, Clients, Registration, RegistrationEvent, ServiceWorkerId, ServiceWorkerState,
    UpdateOutcome,
};
pub use request::{Destination, Request, Response, ResponseType};
pub use storage::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};

// ==================== Errors ====================

/// Errors that can occur in the offline cache controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwError {
    /// A precache manifest URL could not be fetched during install.
    #[error("Precache failed for {url}: {reason}")]
    PrecacheFailure { url: String, reason: String },

    /// A runtime fetch failed on the network.
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    StateError(String),
}

impl SwError {
    pub(crate) fn network(url: impl ToString, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.into(),
        }
    }
}
