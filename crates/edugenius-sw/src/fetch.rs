//! Network access for the controller.
//!
//! The controller never talks to the network directly; it goes through a
//! [`Fetcher`]. [`NetworkFetcher`] is the reqwest-backed implementation,
//! [`MemoryFetcher`] answers from an in-memory route table and can be
//! switched offline.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use hashbrown::HashMap;
use reqwest::Client;
use tracing::{debug, info, trace};
use url::Url;

use crate::request::{Request, Response};
use crate::SwError;

/// Performs network fetches on behalf of the controller.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch `request`. Transport failures are `SwError::Network`; HTTP
    /// error statuses are successful fetches.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, SwError>> + Send;
}

// ==================== Network Fetcher ====================

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Transport timeout per request.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("EduGenius-Offline/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Fetcher backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct NetworkFetcher {
    client: Client,
}

impl NetworkFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, SwError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| SwError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(user_agent = %config.user_agent, "NetworkFetcher initialized");

        Ok(Self { client })
    }
}

impl Fetcher for NetworkFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SwError::network(&request.url, e.to_string()))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| SwError::network(&request.url, e.to_string()))?;

        let mut requested = request.url.clone();
        requested.set_fragment(None);
        let redirected = final_url != requested;

        trace!(
            url = %final_url,
            status = %status,
            redirected,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            url: final_url,
            redirected,
            from_cache: false,
        })
    }
}

// ==================== Memory Fetcher ====================

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: u16,
        body: Bytes,
        headers: HashMap<String, String>,
        final_url: Option<Url>,
    },
    Fail(String),
}

/// Scripted test fetcher. Not for production use.
///
/// Answers from an in-memory route table filled by [`respond`](Self::respond),
/// [`redirect`](Self::redirect) and [`fail`](Self::fail). Unknown URLs get a
/// 404. While offline every fetch fails. Never touches the network.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    calls_by_url: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn route_key(url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    fn insert(&self, url: &Url, route: Route) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(Self::route_key(url), route);
    }

    /// Answer `url` with `status` and `body`.
    pub fn respond(&self, url: &Url, status: u16, body: impl Into<Bytes>) {
        self.insert(
            url,
            Route::Respond {
                status,
                body: body.into(),
                headers: HashMap::new(),
                final_url: None,
            },
        );
    }

    /// Answer `url` with a response that was redirected to `final_url`.
    pub fn redirect(&self, url: &Url, final_url: &Url, status: u16, body: impl Into<Bytes>) {
        self.insert(
            url,
            Route::Respond {
                status,
                body: body.into(),
                headers: HashMap::new(),
                final_url: Some(final_url.clone()),
            },
        );
    }

    /// Fail every fetch of `url` with a network error.
    pub fn fail(&self, url: &Url, message: impl Into<String>) {
        self.insert(url, Route::Fail(message.into()));
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total fetches attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetches attempted for one URL.
    pub fn calls_for(&self, url: &Url) -> usize {
        self.calls_by_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&Self::route_key(url))
            .copied()
            .unwrap_or(0)
    }

    fn answer(&self, request: &Request) -> Result<Response, SwError> {
        let key = Self::route_key(&request.url);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_insert(0) += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(SwError::network(&request.url, "offline"));
        }

        let route = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned();

        match route {
            Some(Route::Respond {
                status,
                body,
                headers,
                final_url,
            }) => {
                let redirected = final_url.is_some();
                let mut response =
                    Response::new(final_url.unwrap_or_else(|| request.url.clone()), status, body);
                response.headers = headers;
                response.redirected = redirected;
                Ok(response)
            }
            Some(Route::Fail(message)) => Err(SwError::network(&request.url, message)),
            None => Ok(Response::new(request.url.clone(), 404, Bytes::new())),
        }
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        self.answer(request)
    }
}
