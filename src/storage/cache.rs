//! Named cache generations of request/response pairs.
//!
//! A [`CacheStore`] holds any number of named caches. Each cache maps a
//! request's [`cache_key`](FetchRequest::cache_key) to a [`CacheEntry`].
//! Every operation is an atomic per-key put or delete; entries are
//! overwritten, never patched in place.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::core::models::{FetchRequest, FetchResponse};
use crate::error::{OffcacheError, Result};

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The request as originally issued.
    pub request: FetchRequest,
    /// The stored response snapshot.
    pub response: FetchResponse,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(request: FetchRequest, response: FetchResponse) -> Self {
        Self {
            request,
            response,
            cached_at: Utc::now(),
        }
    }
}

/// Storage for named cache generations.
pub trait CacheStore: Send + Sync {
    /// Create the named cache if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn open(&self, cache: &str) -> Result<()>;

    /// Whether the named cache exists.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn has(&self, cache: &str) -> Result<bool>;

    /// Delete a cache and all of its entries. Returns whether it existed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn delete(&self, cache: &str) -> Result<bool>;

    /// Names of all caches, sorted.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn keys(&self) -> Result<Vec<String>>;

    /// Store one entry, creating the cache if needed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn put(&self, cache: &str, entry: CacheEntry) -> Result<()>;

    /// Store a batch of entries all-or-nothing, creating the cache if needed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written; nothing is stored then.
    fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<()>;

    /// Look up a request in one cache.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn lookup(&self, cache: &str, request: &FetchRequest) -> Result<Option<CacheEntry>>;

    /// All entries of one cache, oldest first. Empty if the cache is missing.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn entries(&self, cache: &str) -> Result<Vec<CacheEntry>>;

    /// Delete one entry. Returns whether it existed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn remove(&self, cache: &str, request: &FetchRequest) -> Result<bool>;

    /// Look up a request across several caches, first hit wins.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn lookup_in(&self, caches: &[&str], request: &FetchRequest) -> Result<Option<CacheEntry>> {
        for cache in caches {
            if let Some(entry) = self.lookup(cache, request)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Number of entries in a cache.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn entry_count(&self, cache: &str) -> Result<usize> {
        Ok(self.entries(cache)?.len())
    }
}

type Generations = BTreeMap<String, BTreeMap<String, CacheEntry>>;

/// In-process cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: RwLock<Generations>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Generations) -> T) -> Result<T> {
        self.caches
            .read()
            .map(|guard| f(&guard))
            .map_err(|_| OffcacheError::Storage("memory cache lock poisoned".to_string()))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Generations) -> T) -> Result<T> {
        self.caches
            .write()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| OffcacheError::Storage("memory cache lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCacheStore {
    fn open(&self, cache: &str) -> Result<()> {
        self.write(|caches| {
            caches.entry(cache.to_string()).or_default();
        })
    }

    fn has(&self, cache: &str) -> Result<bool> {
        self.read(|caches| caches.contains_key(cache))
    }

    fn delete(&self, cache: &str) -> Result<bool> {
        self.write(|caches| caches.remove(cache).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.read(|caches| caches.keys().cloned().collect())
    }

    fn put(&self, cache: &str, entry: CacheEntry) -> Result<()> {
        let key = entry.request.cache_key();
        self.write(|caches| {
            caches.entry(cache.to_string()).or_default().insert(key, entry);
        })
    }

    fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let keyed: Vec<_> = entries
            .into_iter()
            .map(|entry| (entry.request.cache_key(), entry))
            .collect();
        self.write(|caches| {
            caches.entry(cache.to_string()).or_default().extend(keyed);
        })
    }

    fn lookup(&self, cache: &str, request: &FetchRequest) -> Result<Option<CacheEntry>> {
        let key = request.cache_key();
        self.read(|caches| caches.get(cache).and_then(|c| c.get(&key)).cloned())
    }

    fn entries(&self, cache: &str) -> Result<Vec<CacheEntry>> {
        self.read(|caches| {
            let mut entries: Vec<CacheEntry> = caches
                .get(cache)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default();
            entries.sort_by_key(|e| e.cached_at);
            entries
        })
    }

    fn remove(&self, cache: &str, request: &FetchRequest) -> Result<bool> {
        let key = request.cache_key();
        self.write(|caches| {
            caches
                .get_mut(cache)
                .is_some_and(|c| c.remove(&key).is_some())
        })
    }
}
