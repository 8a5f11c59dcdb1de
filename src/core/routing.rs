//! Request classification: which policy governs a request.

use regex::Regex;
use url::Url;

use super::models::{FetchRequest, same_origin};

/// The policy chosen for a request. Decided once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cross-origin: not governed by the worker.
    Passthrough,
    /// API path: try the network, fall back to the cache.
    NetworkFirst,
    /// Everything else same-origin: try the cache, fall back to the network.
    CacheFirst,
}

/// Routing rules for one origin.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    api_prefix: String,
    write_pattern: Regex,
}

impl Router {
    /// Create a router.
    #[must_use]
    pub fn new(origin: Url, api_prefix: impl Into<String>, write_pattern: Regex) -> Self {
        Self {
            origin,
            api_prefix: api_prefix.into(),
            write_pattern,
        }
    }

    /// The governed origin.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Classify a request: origin check first, then path.
    #[must_use]
    pub fn classify(&self, request: &FetchRequest) -> Route {
        if !same_origin(&self.origin, &request.url) {
            Route::Passthrough
        } else if request.url.path().starts_with(&self.api_prefix) {
            Route::NetworkFirst
        } else {
            Route::CacheFirst
        }
    }

    /// Whether a request is a message write eligible for deferred replay.
    #[must_use]
    pub fn is_pending_write(&self, request: &FetchRequest) -> bool {
        !request.is_read() && self.write_pattern.is_match(request.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn router() -> Router {
        Router::new(
            Url::parse("https://app.test").unwrap(),
            "/api/",
            Regex::new("/messages").unwrap(),
        )
    }

    fn req(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn cross_origin_passes_through_even_on_api_path() {
        assert_eq!(router().classify(&req("https://cdn.test/api/x")), Route::Passthrough);
    }

    #[test]
    fn api_prefix_is_network_first() {
        assert_eq!(router().classify(&req("https://app.test/api/chats?page=2")), Route::NetworkFirst);
    }

    #[test]
    fn other_paths_are_cache_first() {
        let router = router();
        assert_eq!(router.classify(&req("https://app.test/")), Route::CacheFirst);
        assert_eq!(router.classify(&req("https://app.test/apix")), Route::CacheFirst);
        assert_eq!(router.classify(&req("https://app.test/static/app.js")), Route::CacheFirst);
    }

    #[test]
    fn pending_write_needs_write_method_and_pattern() {
        let router = router();
        let url = Url::parse("https://app.test/api/messages").unwrap();
        assert!(router.is_pending_write(&FetchRequest::with_body(Method::POST, url.clone(), "{}")));
        assert!(!router.is_pending_write(&FetchRequest::get(url)));
        let other = Url::parse("https://app.test/api/profile").unwrap();
        assert!(!router.is_pending_write(&FetchRequest::with_body(Method::POST, other, "{}")));
    }
}
