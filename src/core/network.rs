//! The network seam.

use async_trait::async_trait;

use super::models::{FetchRequest, FetchResponse};
use crate::error::Result;

/// Performs live requests.
///
/// `Err` means the network could not produce a response at all. Any HTTP
/// status, including 4xx and 5xx, is an `Ok` response.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send `request` and return the response snapshot.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}
