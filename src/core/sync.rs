//! Background sync: replay of pending message writes.
//!
//! Writes that failed while offline sit in the runtime cache. A sync pass
//! replays each one against the network, deletes it once delivered, and
//! leaves it for the next pass otherwise. Delivery is at-least-once: a
//! write that reached the server but whose deletion did not stick is sent
//! again on the next pass.

use serde::Serialize;

use super::network::Network;
use super::routing::Router;
use crate::error::Result;
use crate::storage::cache::CacheStore;

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Pending writes found.
    pub attempted: usize,
    /// Delivered and removed.
    pub delivered: usize,
    /// Still pending.
    pub retained: usize,
}

/// A replay counts as delivered once the server answered without a 5xx.
/// A 4xx will not improve with retries.
const fn is_delivered(status: u16) -> bool {
    status < 500
}

/// Replay every pending write stored in `cache`, oldest first.
///
/// One failed replay never stops the pass.
///
/// # Errors
///
/// Returns an error only if the cache cannot be listed.
pub async fn replay_pending(
    network: &dyn Network,
    store: &dyn CacheStore,
    cache: &str,
    router: &Router,
) -> Result<SyncReport> {
    let pending: Vec<_> = store
        .entries(cache)?
        .into_iter()
        .filter(|entry| router.is_pending_write(&entry.request))
        .collect();

    let mut report = SyncReport {
        attempted: pending.len(),
        ..SyncReport::default()
    };

    for entry in pending {
        let request = &entry.request;
        let url = request.url.as_str();
        match network.fetch(request).await {
            Ok(response) if is_delivered(response.status) => match store.remove(cache, request) {
                Ok(_) => {
                    tracing::debug!(method = %request.method, url, status = response.status, "pending write delivered");
                    report.delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(url, error = %err, "delivered write could not be removed; it will be replayed again");
                    report.retained += 1;
                }
            },
            Ok(response) => {
                tracing::warn!(url, status = response.status, "replay rejected by server, keeping write");
                report.retained += 1;
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "replay failed, keeping write");
                report.retained += 1;
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        delivered = report.delivered,
        retained = report.retained,
        "sync pass finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_threshold() {
        assert!(is_delivered(200));
        assert!(is_delivered(201));
        assert!(is_delivered(409));
        assert!(!is_delivered(500));
        assert!(!is_delivered(503));
    }
}
