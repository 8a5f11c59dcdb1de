//! HTTP client utilities.
//!
//! Provides the shared `reqwest` client and the [`Network`] implementation
//! backed by it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};

use super::models::{FetchRequest, FetchResponse, ResponseType, same_origin};
use super::network::Network;
use crate::error::{OffcacheError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("offcache/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OffcacheError::Network(e.to_string()))
}

/// Get or create a default HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// [`Network`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    timeout: Duration,
}

impl HttpNetwork {
    /// Create a network with its own client.
    ///
    /// # Errors
    ///
    /// Returns error if client construction fails.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.as_str();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OffcacheError::from_reqwest(&e, url, self.timeout.as_secs()))?;

        let status = response.status().as_u16();
        let kind = if same_origin(&request.url, response.url()) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let headers = response
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
            .map_err(|e| OffcacheError::from_reqwest(&e, url, self.timeout.as_secs()))?;

        tracing::debug!(method = %request.method, url, status, bytes = body.len(), "network response");

        Ok(FetchResponse {
            status,
            headers,
            body,
            kind,
        })
    }
}
