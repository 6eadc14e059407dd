//! Request and response descriptors passed through the controller.

use bytes::Bytes;
use hashbrown::HashMap;
use http::Method;
use url::Url;

use crate::storage::CacheEntry;
use crate::SwError;

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level document navigation.
    Document,
    Script,
    Style,
    Image,
    Manifest,
    /// Anything else (fetch/XHR, fonts, precache requests).
    #[default]
    Other,
}

impl Destination {
    /// Guess a destination from the URL path extension.
    ///
    /// Paths ending in `/` and `.html` are treated as documents.
    pub fn guess(url: &Url) -> Self {
        let path = url.path();
        if path.ends_with('/') {
            return Destination::Document;
        }
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" => Destination::Document,
            "js" | "mjs" => Destination::Script,
            "css" => Destination::Style,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" => Destination::Image,
            "webmanifest" => Destination::Manifest,
            "json" if path.ends_with("/manifest.json") => Destination::Manifest,
            _ => Destination::Other,
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: HashMap<String, String>,
}

impl Request {
    /// Create a GET request for a subresource.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Other,
            headers: HashMap::new(),
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Normalized cache key: method plus URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }

    /// Whether this request navigates a top-level document.
    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }
}

/// Response classification relative to the application origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin response that never left the origin.
    Basic,
    /// Cross-origin or redirected off-origin; must not be cached.
    Opaque,
}

/// A response produced by the network or the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Bytes,

    /// Final URL (after redirects).
    pub url: Url,

    /// Whether any redirect was followed.
    pub redirected: bool,

    /// Whether served from a cache generation.
    pub from_cache: bool,
}

impl Response {
    /// Create a network response.
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
                .to_string(),
            headers: HashMap::new(),
            body: body.into(),
            url,
            redirected: false,
            from_cache: false,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Classify against the application origin.
    pub fn response_type(&self, origin: &Url) -> ResponseType {
        if self.url.origin() == origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Opaque
        }
    }

    /// Rebuild a response from a stored entry.
    pub fn from_entry(entry: &CacheEntry) -> Result<Self, SwError> {
        let url = Url::parse(&entry.url).map_err(|e| SwError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers: entry.headers.clone(),
            body: Bytes::from(entry.body.clone()),
            url,
            redirected: false,
            from_cache: true,
        })
    }

    /// Capture this response for storage under `request`.
    pub fn to_entry(&self, request: &Request) -> CacheEntry {
        CacheEntry {
            url: self.url.to_string(),
            method: request.method.to_string(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.to_vec(),
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}
