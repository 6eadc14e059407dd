//! Runtime cacheability rule.
//!
//! Only same-origin `200` responses to `GET` requests that never left the
//! origin are written to a generation. Everything else is handed back to the
//! caller untouched.

use http::Method;
use url::Url;

use crate::request::{Request, Response, ResponseType};

/// Why a response was not written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonCacheableReason {
    /// The request method is not GET.
    Method,
    /// The request targets another origin.
    CrossOrigin,
    /// A redirect moved the response off the application origin.
    CrossOriginRedirect,
    /// The status is not 200.
    Status(u16),
}

/// Result of a cache decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cacheable,
    NonCacheable(NonCacheableReason),
}

impl CachePolicy {
    /// Decide whether `response` to `request` may be stored.
    pub fn evaluate(origin: &Url, request: &Request, response: &Response) -> Self {
        if request.method != Method::GET {
            return CachePolicy::NonCacheable(NonCacheableReason::Method);
        }
        if request.url.origin() != origin.origin() {
            return CachePolicy::NonCacheable(NonCacheableReason::CrossOrigin);
        }
        if response.response_type(origin) == ResponseType::Opaque {
            let reason = if response.redirected {
                NonCacheableReason::CrossOriginRedirect
            } else {
                NonCacheableReason::CrossOrigin
            };
            return CachePolicy::NonCacheable(reason);
        }
        if response.status != 200 {
            return CachePolicy::NonCacheable(NonCacheableReason::Status(response.status));
        }
        CachePolicy::Cacheable
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, CachePolicy::Cacheable)
    }
}
