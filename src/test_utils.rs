//! Test utilities for offcache.
//!
//! Provides scripted stand-ins for the worker's seams (network, pages,
//! notifications), worker factories, and assertion macros for use across
//! all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use offcache::test_utils::*;
//!
//! let network = ScriptedNetwork::new();
//! network.respond(Method::GET, "/", FetchResponse::new(200, "<html>"));
//! let worker = make_test_worker(network.clone());
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::Method;
use url::Url;

use crate::core::models::{FetchRequest, FetchResponse};
use crate::core::network::Network;
use crate::core::push::{Clients, NotificationIntent, Notifier, WindowClient};
use crate::core::worker::{CacheWorker, WorkerSettings};
use crate::error::{OffcacheError, Result};
use crate::storage::cache::{CacheStore, MemoryCacheStore};

/// Origin used by every test factory.
pub const TEST_ORIGIN: &str = "https://app.test";

// =============================================================================
// Test Data Factories
// =============================================================================

/// The test origin as a parsed URL.
#[must_use]
pub fn test_origin() -> Url {
    Url::parse(TEST_ORIGIN).expect("test origin is valid")
}

/// Absolute URL for a root-relative path on the test origin.
///
/// # Panics
///
/// Panics if `path` cannot be joined onto the origin.
#[must_use]
pub fn test_url(path: &str) -> Url {
    test_origin().join(path).expect("valid test path")
}

/// Default worker settings for the test origin.
///
/// # Panics
///
/// Panics if the default sync pattern fails to compile.
#[must_use]
pub fn make_test_settings() -> WorkerSettings {
    WorkerSettings::for_origin(test_origin()).expect("default settings")
}

/// A `200 text/html` response.
#[must_use]
pub fn make_test_page(body: &str) -> FetchResponse {
    FetchResponse::new(200, body.to_string()).header("Content-Type", "text/html")
}

/// Script a `200` for every path in the default manifest.
pub fn script_manifest(network: &ScriptedNetwork) {
    for path in make_test_settings().manifest {
        network.respond(Method::GET, &path, make_test_page(&format!("precached {path}")));
    }
}

/// A worker over `network` with an in-memory store and the default
/// headless pages and log notifier.
#[must_use]
pub fn make_test_worker(network: ScriptedNetwork) -> CacheWorker {
    make_test_worker_with_store(network, Arc::new(MemoryCacheStore::new()))
}

/// A worker over `network` and `store`.
#[must_use]
pub fn make_test_worker_with_store(
    network: ScriptedNetwork,
    store: Arc<dyn CacheStore>,
) -> CacheWorker {
    CacheWorker::builder(make_test_settings(), Arc::new(network), store).build()
}

/// Create sample config TOML content for testing.
#[must_use]
pub fn make_test_config_toml() -> String {
    format!(
        r#"[general]
origin = "{TEST_ORIGIN}"
timeout_seconds = 5

[caches]
precache_name = "test-precache-v2"
runtime_name = "test-runtime-v2"
manifest = ["/", "/app.js"]

[storage]
backend = "memory"
"#
    )
}

// =============================================================================
// Scripted Network
// =============================================================================

#[derive(Default)]
struct NetworkScript {
    responses: HashMap<(Method, String), FetchResponse>,
    failures: HashMap<(Method, String), String>,
    calls: Vec<FetchRequest>,
}

/// [`Network`] answering from a script keyed by method and path.
///
/// Unscripted requests fail with a connection error, as does every request
/// while the network is [offline](ScriptedNetwork::set_offline). Clones
/// share one script.
#[derive(Clone, Default)]
pub struct ScriptedNetwork {
    script: Arc<Mutex<NetworkScript>>,
    offline: Arc<AtomicBool>,
}

impl ScriptedNetwork {
    /// An empty script: every request fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut NetworkScript) -> T) -> T {
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Answer `method path` with `response`. Replaces an earlier script.
    pub fn respond(&self, method: Method, path: &str, response: FetchResponse) {
        self.with_script(|s| {
            let key = (method, path.to_string());
            s.failures.remove(&key);
            s.responses.insert(key, response);
        });
    }

    /// Fail `method path` with a connection error.
    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.with_script(|s| {
            let key = (method, path.to_string());
            s.responses.remove(&key);
            s.failures.insert(key, message.to_string());
        });
    }

    /// Take the whole network down or bring it back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FetchRequest> {
        self.with_script(|s| s.calls.clone())
    }

    /// Number of requests seen for `method path`.
    #[must_use]
    pub fn call_count(&self, method: &Method, path: &str) -> usize {
        self.with_script(|s| {
            s.calls
                .iter()
                .filter(|r| r.method == *method && r.url.path() == path)
                .count()
        })
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let offline = self.offline.load(Ordering::SeqCst);
        let url = request.url.to_string();
        self.with_script(|s| {
            s.calls.push(request.clone());
            if offline {
                return Err(OffcacheError::ConnectionFailed {
                    url,
                    message: "network offline".to_string(),
                });
            }
            let key = (request.method.clone(), request.url.path().to_string());
            if let Some(message) = s.failures.get(&key) {
                return Err(OffcacheError::ConnectionFailed {
                    url,
                    message: message.clone(),
                });
            }
            s.responses
                .get(&key)
                .cloned()
                .ok_or_else(|| OffcacheError::ConnectionFailed {
                    url,
                    message: "no scripted response".to_string(),
                })
        })
    }
}

// =============================================================================
// Recording Notifier and Fake Clients
// =============================================================================

/// [`Notifier`] that records what it was asked to show and close.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    shown: Arc<Mutex<Vec<NotificationIntent>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications shown so far.
    ///
    /// # Panics
    ///
    /// Panics if the record lock is poisoned.
    #[must_use]
    pub fn shown(&self) -> Vec<NotificationIntent> {
        self.shown.lock().expect("shown lock").clone()
    }

    /// Tags closed so far.
    ///
    /// # Panics
    ///
    /// Panics if the record lock is poisoned.
    #[must_use]
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().expect("closed lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, intent: &NotificationIntent) -> Result<()> {
        self.shown.lock().expect("shown lock").push(intent.clone());
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        self.closed.lock().expect("closed lock").push(tag.to_string());
        Ok(())
    }
}

/// [`Clients`] over a fixed set of windows, recording every call.
#[derive(Clone, Default)]
pub struct FakeClients {
    windows: Arc<Mutex<Vec<WindowClient>>>,
    focused: Arc<Mutex<Vec<String>>>,
    opened: Arc<Mutex<Vec<String>>>,
    claimed: Arc<AtomicBool>,
}

impl FakeClients {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an open, unfocused window at `url`.
    ///
    /// # Panics
    ///
    /// Panics if the window lock is poisoned.
    #[must_use]
    pub fn with_window(self, id: &str, url: &str) -> Self {
        self.windows.lock().expect("windows lock").push(WindowClient {
            id: id.to_string(),
            url: url.to_string(),
            focused: false,
        });
        self
    }

    /// Window ids focused so far.
    ///
    /// # Panics
    ///
    /// Panics if the record lock is poisoned.
    #[must_use]
    pub fn focused(&self) -> Vec<String> {
        self.focused.lock().expect("focused lock").clone()
    }

    /// URLs opened so far.
    ///
    /// # Panics
    ///
    /// Panics if the record lock is poisoned.
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("opened lock").clone()
    }

    /// Whether `claim` was called.
    #[must_use]
    pub fn claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clients for FakeClients {
    async fn claim(&self) -> Result<()> {
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn match_all_windows(&self) -> Result<Vec<WindowClient>> {
        Ok(self.windows.lock().expect("windows lock").clone())
    }

    async fn focus(&self, id: &str) -> Result<()> {
        self.focused.lock().expect("focused lock").push(id.to_string());
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.opened.lock().expect("opened lock").push(url.to_string());
        Ok(())
    }
}

// =============================================================================
// Temporary Directory Helper
// =============================================================================

/// A temporary directory that is automatically cleaned up on drop.
///
/// # Examples
///
/// ```rust,ignore
/// use offcache::test_utils::TestDir;
///
/// let dir = TestDir::new();
/// dir.create_file("config.toml", "[general]\ntimeout_seconds = 5");
/// assert!(dir.file_exists("config.toml"));
/// ```
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file in the temporary directory with the given content.
    ///
    /// Creates parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    /// Check if a file exists in the temporary directory.
    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

// =============================================================================
// Tests for Test Utilities
// =============================================================================
