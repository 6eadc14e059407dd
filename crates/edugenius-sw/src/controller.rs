//! The offline cache controller.
//!
//! One controller serves one deployed version. Its three operations map to
//! the worker lifecycle:
//!
//! - [`CacheController::install`] precaches the manifest into the generation
//!   named by the configured version. All or nothing.
//! - [`CacheController::activate`] deletes every other generation, once the
//!   current one holds the full manifest.
//! - [`CacheController::handle`] answers one intercepted request: cache
//!   first, then network, then the shell document for offline navigations.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, trace, warn};

use crate::config::CacheConfig;
use crate::fetch::Fetcher;
use crate::policy::CachePolicy;
use crate::request::{Request, Response, ResponseType};
use crate::storage::SharedCacheStorage;
use crate::SwError;

/// Cache-first request handler bound to one cache generation.
pub struct CacheController<F: Fetcher> {
    config: Arc<CacheConfig>,
    storage: SharedCacheStorage,
    fetcher: Arc<F>,
}

impl<F: Fetcher> Clone for CacheController<F> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            storage: Arc::clone(&self.storage),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<F: Fetcher> std::fmt::Debug for CacheController<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("version", &self.config.version)
            .finish_non_exhaustive()
    }
}

impl<F: Fetcher> CacheController<F> {
    /// Create a controller. The configuration is validated up front.
    pub fn new(
        config: CacheConfig,
        storage: SharedCacheStorage,
        fetcher: Arc<F>,
    ) -> Result<Self, SwError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            storage,
            fetcher,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Name of the generation this controller serves from.
    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn storage(&self) -> &SharedCacheStorage {
        &self.storage
    }

    /// Precache every manifest URL into the current generation.
    ///
    /// Fetches run concurrently. If any fetch fails, answers with a status
    /// other than 200, or is redirected off the origin, nothing is written and
    /// `PrecacheFailure` is returned. Returns the number of entries stored.
    pub async fn install(&self) -> Result<usize, SwError> {
        let urls = self.config.precache_urls()?;
        info!(version = %self.config.version, urls = urls.len(), "Installing");

        let fetcher = &self.fetcher;
        let origin = &self.config.origin;
        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response =
                fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| SwError::PrecacheFailure {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    })?;
            if response.status != 200 {
                return Err(SwError::PrecacheFailure {
                    url: request.url.to_string(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            if response.response_type(origin) == ResponseType::Opaque {
                return Err(SwError::PrecacheFailure {
                    url: request.url.to_string(),
                    reason: format!("redirected off origin to {}", response.url),
                });
            }
            Ok::<_, SwError>((request, response))
        });

        let fetched = match try_join_all(fetches).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(version = %self.config.version, error = %err, "Install failed");
                return Err(err);
            }
        };

        let mut storage = self.storage.write().await;
        let cache = storage.open(&self.config.version);
        for (request, response) in &fetched {
            cache.put(request.cache_key(), response.to_entry(request));
        }

        info!(version = %self.config.version, entries = fetched.len(), "Installed");
        Ok(fetched.len())
    }

    /// Delete every generation except the current one.
    ///
    /// The current generation must already hold every manifest entry, so a
    /// failed or skipped install never removes the version still serving.
    /// Returns the deleted generation names.
    pub async fn activate(&self) -> Result<Vec<String>, SwError> {
        let required: Vec<String> = self
            .config
            .precache_urls()?
            .into_iter()
            .map(|url| Request::get(url).cache_key())
            .collect();

        let mut storage = self.storage.write().await;

        let Some(current) = storage.get(&self.config.version) else {
            warn!(version = %self.config.version, "Refusing to activate, not installed");
            return Err(SwError::StateError(format!(
                "generation {} is not installed",
                self.config.version
            )));
        };
        if let Some(missing) = required
            .iter()
            .find(|key| current.match_request(key).is_none())
        {
            warn!(version = %self.config.version, %missing, "Refusing to activate, incomplete");
            return Err(SwError::StateError(format!(
                "generation {} is incomplete, missing {}",
                self.config.version, missing
            )));
        }

        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| *name != self.config.version)
            .map(str::to_string)
            .collect();

        for name in &stale {
            storage.delete(name);
            info!(generation = %name, "Deleted stale generation");
        }

        info!(version = %self.config.version, deleted = stale.len(), "Activated");
        Ok(stale)
    }

    /// Answer one intercepted request.
    pub async fn handle(&self, request: Request) -> Result<Response, SwError> {
        let key = request.cache_key();

        if let Some(response) = self.lookup(&key).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(response);
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                match CachePolicy::evaluate(&self.config.origin, &request, &response) {
                    CachePolicy::Cacheable => self.store(key, &request, &response).await,
                    CachePolicy::NonCacheable(reason) => {
                        trace!(url = %request.url, ?reason, "Not caching response");
                    }
                }
                Ok(response)
            }
            Err(err) => {
                if request.is_navigation() {
                    if let Some(shell) = self.shell().await {
                        warn!(url = %request.url, error = %err, "Network failed, serving shell");
                        return Ok(shell);
                    }
                }
                debug!(url = %request.url, error = %err, "Network failed");
                Err(err)
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        let storage = self.storage.read().await;
        let entry = storage.match_in(&self.config.version, key)?;
        match Response::from_entry(entry) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(key, error = %err, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    // The generation is not recreated here: if activation of a newer version
    // deleted it while this fetch was in flight, the write is dropped.
    async fn store(&self, key: String, request: &Request, response: &Response) {
        let mut storage = self.storage.write().await;
        match storage.get_mut(&self.config.version) {
            Some(cache) => {
                cache.put(key, response.to_entry(request));
                trace!(url = %request.url, "Stored response");
            }
            None => {
                debug!(version = %self.config.version, url = %request.url, "Generation gone, dropping write");
            }
        }
    }

    async fn shell(&self) -> Option<Response> {
        let shell_url = self.config.shell_url().ok()?;
        self.lookup(&Request::get(shell_url).cache_key()).await
    }
}
