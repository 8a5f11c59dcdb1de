//! The offline cache worker.
//!
//! [`CacheWorker`] owns the routing policy and the lifecycle of one worker
//! version. Each `on_*` hook receives the event's [`ExtendableEvent`] and
//! registers its asynchronous work on it; the matching `dispatch_*` method
//! is the host side, which runs the hook and settles the event before the
//! event counts as finished.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use http::Method;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use url::Url;

use super::event::{EventKind, ExtendableEvent};
use super::lifecycle::{Lifecycle, WorkerState};
use super::messages::{ControlMessage, MessageEvent, MessageReply};
use super::models::{FetchRequest, FetchResponse, ResponseType, resolve_url};
use super::network::Network;
use super::push::{
    Clients, HeadlessClients, LogNotifier, NotificationClick, NotificationDefaults,
    NotificationIntent, Notifier, PushPayload,
};
use super::routing::{Route, Router};
use super::sync::{SyncReport, replay_pending};
use crate::error::{OffcacheError, Result};
use crate::storage::cache::{CacheEntry, CacheStore};
use crate::storage::config::Config;

/// Everything the worker needs to know about the origin it governs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub origin: Url,
    /// Current precache generation.
    pub precache_name: String,
    /// Current runtime cache generation.
    pub runtime_name: String,
    /// Root-relative URLs fetched at install time.
    pub manifest: Vec<String>,
    /// Document served to offline navigations.
    pub shell_document: String,
    pub api_prefix: String,
    pub sync_tag: String,
    /// Matches the URLs of message writes kept for replay.
    pub sync_pattern: Regex,
    pub notifications: NotificationDefaults,
}

impl WorkerSettings {
    /// Default settings for `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default sync pattern fails to compile.
    pub fn for_origin(origin: Url) -> Result<Self> {
        let config = Config::default();
        let sync_pattern = Regex::new(&config.sync.pattern)
            .map_err(|e| OffcacheError::Config(format!("sync pattern: {e}")))?;
        Ok(Self {
            origin,
            precache_name: config.caches.precache_name,
            runtime_name: config.caches.runtime_name,
            manifest: config.caches.manifest,
            shell_document: config.caches.shell_document,
            api_prefix: config.routing.api_prefix,
            sync_tag: config.sync.tag,
            sync_pattern,
            notifications: config.notifications,
        })
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Synthesized because neither the network nor the cache could answer.
    Offline,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Cache => f.write_str("cache"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// What the worker decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDisposition {
    /// Not governed by the worker; the host sends it to the network itself.
    Passthrough,
    /// The worker answered.
    Respond {
        response: FetchResponse,
        source: ResponseSource,
    },
}

impl FetchDisposition {
    const fn respond(response: FetchResponse, source: ResponseSource) -> Self {
        Self::Respond { response, source }
    }
}

/// Response for an API request when neither network nor cache can answer.
#[must_use]
pub fn offline_api_response() -> FetchResponse {
    FetchResponse::new(503, json!({ "error": "Offline", "offline": true }).to_string())
        .header("Content-Type", "application/json")
        .with_kind(ResponseType::Error)
}

/// Response for any other request that cannot be served.
#[must_use]
pub fn offline_response() -> FetchResponse {
    FetchResponse::new(503, "Offline")
        .header("Content-Type", "text/plain")
        .with_kind(ResponseType::Error)
}

struct WorkerInner {
    settings: WorkerSettings,
    router: Router,
    lifecycle: Lifecycle,
    network: Arc<dyn Network>,
    store: Arc<dyn CacheStore>,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
}

/// Handle to the worker. Clones share one worker.
#[derive(Clone)]
pub struct CacheWorker {
    inner: Arc<WorkerInner>,
}

/// Builder for [`CacheWorker`].
pub struct CacheWorkerBuilder {
    settings: WorkerSettings,
    network: Arc<dyn Network>,
    store: Arc<dyn CacheStore>,
    clients: Option<Arc<dyn Clients>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CacheWorkerBuilder {
    /// Use `clients` for claiming, focusing and opening pages.
    #[must_use]
    pub fn clients(mut self, clients: Arc<dyn Clients>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Use `notifier` to show notifications.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the worker in the `Parsed` state.
    #[must_use]
    pub fn build(self) -> CacheWorker {
        let router = Router::new(
            self.settings.origin.clone(),
            self.settings.api_prefix.clone(),
            self.settings.sync_pattern.clone(),
        );
        CacheWorker {
            inner: Arc::new(WorkerInner {
                settings: self.settings,
                router,
                lifecycle: Lifecycle::new(),
                network: self.network,
                store: self.store,
                clients: self.clients.unwrap_or_else(|| Arc::new(HeadlessClients)),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            }),
        }
    }
}

impl CacheWorker {
    /// Start building a worker. Pages and notifications default to the
    /// headless and logging implementations.
    #[must_use]
    pub fn builder(
        settings: WorkerSettings,
        network: Arc<dyn Network>,
        store: Arc<dyn CacheStore>,
    ) -> CacheWorkerBuilder {
        CacheWorkerBuilder {
            settings,
            network,
            store,
            clients: None,
            notifier: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &WorkerSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.inner.store
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.inner.lifecycle.state()
    }

    /// Whether open pages have been claimed.
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.inner.lifecycle.clients_claimed()
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Install: precache the manifest all-or-nothing, then skip waiting.
    pub fn on_install(&self, event: &ExtendableEvent) {
        let worker = self.clone();
        event.wait_until(async move { worker.precache().await });
    }

    /// Activate: delete stale generations, then claim open pages.
    pub fn on_activate(&self, event: &ExtendableEvent) {
        let worker = self.clone();
        event.wait_until(async move { worker.evict_stale().await });
    }

    /// Decide how to answer `request`. Cache writes are registered on `event`.
    pub async fn on_fetch(&self, event: &ExtendableEvent, request: FetchRequest) -> FetchDisposition {
        let route = self.inner.router.classify(&request);
        tracing::debug!(method = %request.method, url = %request.url, ?route, "fetch routed");
        match route {
            Route::Passthrough => FetchDisposition::Passthrough,
            Route::NetworkFirst => self.network_first(event, request).await,
            Route::CacheFirst => self.cache_first(event, request).await,
        }
    }

    /// Sync: replay pending writes when `tag` is the configured sync tag.
    ///
    /// Returns the receiver of the pass's report, or `None` for other tags.
    pub fn on_sync(&self, event: &ExtendableEvent, tag: &str) -> Option<oneshot::Receiver<SyncReport>> {
        if tag != self.inner.settings.sync_tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let worker = self.clone();
        event.wait_until(async move {
            let inner = &worker.inner;
            let report = replay_pending(
                inner.network.as_ref(),
                inner.store.as_ref(),
                &inner.settings.runtime_name,
                &inner.router,
            )
            .await?;
            tx.send(report).ok();
            Ok(())
        });
        Some(rx)
    }

    /// Push: show a notification built from `data`. Absent data is ignored.
    pub fn on_push(&self, event: &ExtendableEvent, data: Option<&[u8]>) -> Option<NotificationIntent> {
        let Some(payload) = PushPayload::parse(data) else {
            tracing::debug!("push without data ignored");
            return None;
        };
        let intent = NotificationIntent::from_payload(payload, &self.inner.settings.notifications);
        let notifier = Arc::clone(&self.inner.notifier);
        let shown = intent.clone();
        event.wait_until(async move { notifier.show(&shown).await });
        Some(intent)
    }

    /// Notification click: close it, then focus or open its target page.
    pub fn on_notification_click(&self, event: &ExtendableEvent, click: NotificationClick) {
        let worker = self.clone();
        event.wait_until(async move { worker.route_click(click).await });
    }

    /// Control message from a page.
    pub fn on_message(&self, event: &ExtendableEvent, message: MessageEvent) {
        let MessageEvent { message, reply } = message;
        match message {
            ControlMessage::SkipWaiting => {
                self.inner.lifecycle.skip_waiting();
                let worker = self.clone();
                event.wait_until(async move { worker.activate_if_waiting().await });
            }
            ControlMessage::CacheClear => {
                let store = Arc::clone(&self.inner.store);
                event.wait_until(async move {
                    let success = match clear_all(store.as_ref()) {
                        Ok(count) => {
                            tracing::info!(count, "all cache generations cleared");
                            true
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "cache clear failed");
                            false
                        }
                    };
                    if let Some(reply) = reply {
                        reply.send(MessageReply { success }).ok();
                    }
                    Ok(())
                });
            }
            ControlMessage::Unknown => tracing::debug!("ignoring unknown control message"),
        }
    }

    // ------------------------------------------------------------------
    // Host side
    // ------------------------------------------------------------------

    /// Run the install event. On success the worker is `Installed`, and
    /// activates at once if waiting was skipped.
    ///
    /// # Errors
    ///
    /// Returns [`OffcacheError::InstallFailed`] if precaching failed (the
    /// worker is then `Redundant`) or a lifecycle error if install is not
    /// allowed from the current state.
    pub async fn dispatch_install(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        lifecycle.transition(WorkerState::Installing)?;
        let event = ExtendableEvent::new(EventKind::Install);
        self.on_install(&event);
        if let Err(err) = event.settle().await {
            lifecycle.transition(WorkerState::Redundant)?;
            tracing::error!(error = %err, "install failed");
            return Err(match err {
                e @ OffcacheError::InstallFailed { .. } => e,
                other => OffcacheError::InstallFailed {
                    reason: other.to_string(),
                },
            });
        }
        lifecycle.transition(WorkerState::Installed)?;
        self.activate_if_waiting().await
    }

    /// Run the activate event.
    ///
    /// # Errors
    ///
    /// Returns [`OffcacheError::ActivateFailed`] if eviction or claiming
    /// failed (the worker is then `Redundant`).
    pub async fn dispatch_activate(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        lifecycle.transition(WorkerState::Activating)?;
        let event = ExtendableEvent::new(EventKind::Activate);
        self.on_activate(&event);
        match event.settle().await {
            Ok(()) => {
                lifecycle.transition(WorkerState::Activated)?;
                Ok(())
            }
            Err(err) => {
                lifecycle.transition(WorkerState::Redundant)?;
                Err(OffcacheError::ActivateFailed {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Bring the worker up: resume a version whose precache is already
    /// stored, or install it from the network.
    ///
    /// # Errors
    ///
    /// Returns an error if install or activation fails.
    pub async fn start(&self) -> Result<WorkerState> {
        let precache = &self.inner.settings.precache_name;
        if self.inner.store.has(precache)? {
            tracing::info!(cache = %precache, "precache present, resuming installed version");
            let lifecycle = &self.inner.lifecycle;
            lifecycle.transition(WorkerState::Installing)?;
            lifecycle.transition(WorkerState::Installed)?;
            lifecycle.skip_waiting();
            self.activate_if_waiting().await?;
        } else {
            self.dispatch_install().await?;
        }
        Ok(self.state())
    }

    /// Run a fetch event. Before activation every request passes through.
    pub async fn dispatch_fetch(&self, request: FetchRequest) -> FetchDisposition {
        if !self.state().can_intercept_fetch() {
            return FetchDisposition::Passthrough;
        }
        let event = ExtendableEvent::new(EventKind::Fetch);
        let disposition = self.on_fetch(&event, request).await;
        if let Err(err) = event.settle().await {
            tracing::warn!(error = %err, "runtime cache write failed");
        }
        disposition
    }

    /// Run a sync event for `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cache cannot be read.
    pub async fn dispatch_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        let event = ExtendableEvent::new(EventKind::Sync);
        let report = self.on_sync(&event, tag);
        event.settle().await?;
        match report {
            Some(rx) => Ok(rx.await.ok()),
            None => Ok(None),
        }
    }

    /// Run a push event.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be shown.
    pub async fn dispatch_push(&self, data: Option<&[u8]>) -> Result<Option<NotificationIntent>> {
        let event = ExtendableEvent::new(EventKind::Push);
        let intent = self.on_push(&event, data);
        event.settle().await?;
        Ok(intent)
    }

    /// Run a notification click event.
    ///
    /// # Errors
    ///
    /// Returns an error if closing, focusing or opening failed.
    pub async fn dispatch_notification_click(&self, click: NotificationClick) -> Result<()> {
        let event = ExtendableEvent::new(EventKind::NotificationClick);
        self.on_notification_click(&event, click);
        event.settle().await
    }

    /// Run a message event and collect its reply, if the message has one.
    ///
    /// # Errors
    ///
    /// Returns an error if a skip-waiting activation failed.
    pub async fn dispatch_message(&self, message: ControlMessage) -> Result<Option<MessageReply>> {
        let (message, reply) = MessageEvent::with_reply(message);
        let event = ExtendableEvent::new(EventKind::Message);
        self.on_message(&event, message);
        event.settle().await?;
        Ok(reply.await.ok())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn precache(&self) -> Result<()> {
        let settings = &self.inner.settings;
        let requests = settings
            .manifest
            .iter()
            .map(|path| resolve_url(&settings.origin, path).map(FetchRequest::get))
            .collect::<Result<Vec<_>>>()?;

        let network = &self.inner.network;
        let responses = join_all(requests.iter().map(|request| network.fetch(request))).await;

        let mut entries = Vec::with_capacity(requests.len());
        for (request, response) in requests.into_iter().zip(responses) {
            let response = response.map_err(|e| OffcacheError::InstallFailed {
                reason: format!("{}: {e}", request.url),
            })?;
            if !response.ok() {
                let status = OffcacheError::HttpStatus {
                    url: request.url.to_string(),
                    status: response.status,
                };
                return Err(OffcacheError::InstallFailed {
                    reason: status.to_string(),
                });
            }
            entries.push(CacheEntry::new(request, response));
        }

        let count = entries.len();
        self.inner.store.put_all(&settings.precache_name, entries)?;
        tracing::info!(cache = %settings.precache_name, count, "precache populated");
        self.inner.lifecycle.skip_waiting();
        Ok(())
    }

    async fn evict_stale(&self) -> Result<()> {
        let settings = &self.inner.settings;
        let store = &self.inner.store;
        for name in store.keys()? {
            if name != settings.precache_name && name != settings.runtime_name {
                store.delete(&name)?;
                tracing::info!(cache = %name, "stale cache generation deleted");
            }
        }
        store.open(&settings.runtime_name)?;
        self.inner.clients.claim().await?;
        self.inner.lifecycle.mark_claimed();
        Ok(())
    }

    async fn activate_if_waiting(&self) -> Result<()> {
        if self.state() == WorkerState::Installed && self.inner.lifecycle.waiting_skipped() {
            self.dispatch_activate().await
        } else {
            Ok(())
        }
    }

    async fn network_first(&self, event: &ExtendableEvent, request: FetchRequest) -> FetchDisposition {
        match self.inner.network.fetch(&request).await {
            Ok(response) => {
                if request.method == Method::GET && response.ok() {
                    let (live, stored) = response.tee();
                    self.cache_later(event, request, stored);
                    FetchDisposition::respond(live, ResponseSource::Network)
                } else {
                    FetchDisposition::respond(response, ResponseSource::Network)
                }
            }
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "network failed, trying cache");
                if let Some(entry) = self.cached(&request) {
                    return FetchDisposition::respond(entry.response, ResponseSource::Cache);
                }
                let offline = offline_api_response();
                if self.inner.router.is_pending_write(&request) {
                    tracing::info!(method = %request.method, url = %request.url, "write kept for background sync");
                    self.cache_later(event, request, offline.clone());
                }
                FetchDisposition::respond(offline, ResponseSource::Offline)
            }
        }
    }

    async fn cache_first(&self, event: &ExtendableEvent, request: FetchRequest) -> FetchDisposition {
        if let Some(entry) = self.cached(&request) {
            tracing::debug!(url = %request.url, "cache hit");
            return FetchDisposition::respond(entry.response, ResponseSource::Cache);
        }
        match self.inner.network.fetch(&request).await {
            Ok(response) => {
                if request.method == Method::GET && response.is_cacheable() {
                    let (live, stored) = response.tee();
                    self.cache_later(event, request, stored);
                    FetchDisposition::respond(live, ResponseSource::Network)
                } else {
                    FetchDisposition::respond(response, ResponseSource::Network)
                }
            }
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "network failed on cache miss");
                if request.is_navigation() {
                    if let Some(shell) = self.shell() {
                        return FetchDisposition::respond(shell.response, ResponseSource::Cache);
                    }
                }
                FetchDisposition::respond(offline_response(), ResponseSource::Offline)
            }
        }
    }

    /// Look a request up in the current generations. Read failures count as misses.
    fn cached(&self, request: &FetchRequest) -> Option<CacheEntry> {
        let settings = &self.inner.settings;
        let caches = [settings.precache_name.as_str(), settings.runtime_name.as_str()];
        self.inner
            .store
            .lookup_in(&caches, request)
            .unwrap_or_else(|err| {
                tracing::warn!(url = %request.url, error = %err, "cache lookup failed");
                None
            })
    }

    fn shell(&self) -> Option<CacheEntry> {
        let settings = &self.inner.settings;
        let url = resolve_url(&settings.origin, &settings.shell_document).ok()?;
        self.cached(&FetchRequest::get(url))
    }

    fn cache_later(&self, event: &ExtendableEvent, request: FetchRequest, response: FetchResponse) {
        let store = Arc::clone(&self.inner.store);
        let cache = self.inner.settings.runtime_name.clone();
        event.wait_until(async move { store.put(&cache, CacheEntry::new(request, response)) });
    }

    async fn route_click(&self, click: NotificationClick) -> Result<()> {
        let inner = &self.inner;
        inner.notifier.close(&click.notification.tag).await?;
        if click.is_dismiss() {
            return Ok(());
        }

        let target = resolve_url(&inner.settings.origin, &click.notification.url)?;
        let windows = inner.clients.match_all_windows().await?;
        let existing = windows
            .iter()
            .find(|window| Url::parse(&window.url).is_ok_and(|url| url == target));

        match existing {
            Some(window) => {
                tracing::debug!(id = %window.id, url = %target, "focusing open window");
                inner.clients.focus(&window.id).await
            }
            None => {
                tracing::debug!(url = %target, "opening new window");
                inner.clients.open_window(target.as_str()).await
            }
        }
    }
}

impl fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWorker")
            .field("origin", &self.inner.settings.origin.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Delete every cache generation. Returns how many were deleted.
///
/// # Errors
///
/// Returns an error if the store cannot be listed or a delete fails.
pub fn clear_all(store: &dyn CacheStore) -> Result<usize> {
    let mut deleted = 0;
    for name in store.keys()? {
        if store.delete(&name)? {
            deleted += 1;
        }
    }
    Ok(deleted)
}
