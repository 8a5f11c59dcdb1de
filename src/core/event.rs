//! Deferred completion for worker events.
//!
//! A hook that starts asynchronous work registers it with
//! [`ExtendableEvent::wait_until`]. The host must [`settle`](ExtendableEvent::settle)
//! the event before treating it as finished; otherwise in-flight cache writes
//! or notification display could be dropped.

use std::fmt;
use std::future::Future;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, join_all};

use crate::error::{OffcacheError, Result};

/// Event kinds dispatched to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Push,
    NotificationClick,
    Message,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch => "fetch",
            Self::Sync => "sync",
            Self::Push => "push",
            Self::NotificationClick => "notificationclick",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}

/// An event whose lifetime can be extended by the futures registered on it.
pub struct ExtendableEvent {
    kind: EventKind,
    pending: Mutex<Vec<BoxFuture<'static, Result<()>>>>,
}

impl ExtendableEvent {
    /// Create an event with nothing pending.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Extend the event until `work` completes.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        match self.pending.lock() {
            Ok(mut pending) => pending.push(work.boxed()),
            Err(poisoned) => poisoned.into_inner().push(work.boxed()),
        }
    }

    /// Number of futures registered and not yet settled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().map_or(0, |p| p.len())
    }

    /// Await every registered future.
    ///
    /// All futures run to completion even if one fails; the first failure
    /// (in registration order) is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a registered future.
    pub async fn settle(self) -> Result<()> {
        let pending = self
            .pending
            .into_inner()
            .map_err(|_| OffcacheError::Other(anyhow::anyhow!("event state poisoned")))?;
        let count = pending.len();
        let results = join_all(pending).await;
        tracing::trace!(event = %self.kind, count, "event settled");
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }
}

impl fmt::Debug for ExtendableEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendableEvent")
            .field("kind", &self.kind)
            .field("pending", &self.pending())
            .finish()
    }
}
