//! Request and response snapshots exchanged between the page, the worker,
//! the network, and the cache store.

use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{OffcacheError, Result};

/// Ordered header list. Names keep their original case; lookups ignore it.
pub type HeaderList = Vec<(String, String)>;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    /// Same-origin subresource.
    SameOrigin,
    /// Cross-origin request with CORS.
    Cors,
    /// Opaque cross-origin request.
    #[default]
    NoCors,
}

impl RequestMode {
    /// Stable string form, used by the `SQLite` store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::Cors => "cors",
            Self::NoCors => "no-cors",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "cors" => Some(Self::Cors),
            "no-cors" => Some(Self::NoCors),
            _ => None,
        }
    }
}

/// Response type, following the fetch model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response with CORS.
    Cors,
    /// Opaque cross-origin response.
    Opaque,
    /// Synthesized by the worker (offline placeholders) or a network error.
    Error,
}

impl ResponseType {
    /// Stable string form, used by the `SQLite` store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::Error => "error",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "cors" => Some(Self::Cors),
            "opaque" => Some(Self::Opaque),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderList,
    /// Request body (empty for GET).
    pub body: Bytes,
    /// Request mode.
    pub mode: RequestMode,
}

impl FetchRequest {
    /// Build a GET request for a same-origin subresource.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            mode: RequestMode::SameOrigin,
        }
    }

    /// Build a navigation request.
    #[must_use]
    pub const fn navigate(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            mode: RequestMode::Navigate,
        }
    }

    /// Build a request with an explicit method and body.
    #[must_use]
    pub fn with_body(method: Method, url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: body.into(),
            mode: RequestMode::SameOrigin,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether this is a page navigation.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether the method only reads (GET or HEAD).
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Cache key for this request.
    ///
    /// Method and URL (fragment stripped). Requests with a body also carry a
    /// SHA-256 digest of it, so two different writes to one URL never share
    /// an entry.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        if self.body.is_empty() {
            format!("{} {}", self.method, url)
        } else {
            let digest = Sha256::digest(&self.body);
            format!("{} {}#{}", self.method, url, hex::encode(digest))
        }
    }
}

/// A response snapshot: status, headers, body, and response type.
///
/// The body is a cheap reference-counted buffer, so a response can be split
/// into independent read handles with [`FetchResponse::tee`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderList,
    /// Response body.
    pub body: Bytes,
    /// Response type.
    pub kind: ResponseType,
}

impl FetchResponse {
    /// Build a same-origin response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseType::Basic,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the response type.
    #[must_use]
    pub const fn with_kind(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    /// Status is in the 2xx range.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Eligible for the runtime cache on the cache-first path:
    /// exactly 200 and same-origin.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseType::Basic
    }

    /// First header value with the given name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Split into two independent read handles: one for the caller, one
    /// for the cache. Neither consumer can observe the other's reads.
    #[must_use]
    pub fn tee(self) -> (Self, Self) {
        let copy = self.clone();
        (self, copy)
    }
}

/// Resolve a root-relative (or absolute) URL against an origin.
///
/// # Errors
///
/// Returns [`OffcacheError::InvalidUrl`] if the URL cannot be parsed.
pub fn resolve_url(origin: &Url, path: &str) -> Result<Url> {
    origin.join(path).map_err(|e| OffcacheError::InvalidUrl {
        url: path.to_string(),
        message: e.to_string(),
    })
}

/// Whether two URLs share scheme, host and port.
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn cache_key_ignores_fragment() {
        let a = FetchRequest::get(url("https://app.test/page#top"));
        let b = FetchRequest::get(url("https://app.test/page"));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "GET https://app.test/page");
    }

    #[test]
    fn cache_key_distinguishes_bodies() {
        let a = FetchRequest::with_body(Method::POST, url("https://app.test/api/messages"), "one");
        let b = FetchRequest::with_body(Method::POST, url("https://app.test/api/messages"), "two");
        assert_ne!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with("POST https://app.test/api/messages#"));
    }

    #[test]
    fn cache_key_distinguishes_methods() {
        let get = FetchRequest::get(url("https://app.test/api/messages"));
        let head = FetchRequest {
            method: Method::HEAD,
            ..get.clone()
        };
        assert_ne!(get.cache_key(), head.cache_key());
    }

    #[test]
    fn tee_yields_independent_equal_handles() {
        let response = FetchResponse::new(200, "hello").header("Content-Type", "text/plain");
        let (live, cached) = response.tee();
        assert_eq!(live, cached);
        drop(live);
        assert_eq!(cached.text(), "hello");
    }

    #[test]
    fn cacheable_requires_200_basic() {
        assert!(FetchResponse::new(200, "").is_cacheable());
        assert!(!FetchResponse::new(204, "").is_cacheable());
        assert!(!FetchResponse::new(200, "").with_kind(ResponseType::Cors).is_cacheable());
        assert!(!FetchResponse::new(200, "").with_kind(ResponseType::Opaque).is_cacheable());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = FetchResponse::new(200, "").header("Content-Type", "application/json");
        assert_eq!(response.header_value("content-type"), Some("application/json"));
        assert_eq!(response.header_value("x-missing"), None);
    }

    #[test]
    fn read_methods() {
        assert!(FetchRequest::get(url("https://app.test/")).is_read());
        assert!(!FetchRequest::with_body(Method::PUT, url("https://app.test/"), "x").is_read());
    }

    #[test]
    fn resolve_and_origin() {
        let origin = url("https://app.test");
        let resolved = resolve_url(&origin, "/index.html").unwrap();
        assert_eq!(resolved.as_str(), "https://app.test/index.html");
        assert!(same_origin(&origin, &resolved));
        assert!(!same_origin(&origin, &url("https://cdn.test/x.js")));
        assert!(!same_origin(&origin, &url("http://app.test/")));
    }

    #[test]
    fn mode_and_kind_strings_round_trip() {
        for mode in [
            RequestMode::Navigate,
            RequestMode::SameOrigin,
            RequestMode::Cors,
            RequestMode::NoCors,
        ] {
            assert_eq!(RequestMode::from_str_opt(mode.as_str()), Some(mode));
        }
        assert_eq!(ResponseType::from_str_opt("opaque"), Some(ResponseType::Opaque));
        assert_eq!(ResponseType::from_str_opt("bogus"), None);
    }
}
