//! `SQLite`-backed cache store.
//!
//! Survives restarts, so precached shell assets and pending writes are
//! still there the next time the proxy starts offline.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Method;
use rusqlite::{Connection, OptionalExtension, Row, params};
use url::Url;

use super::cache::{CacheEntry, CacheStore};
use super::schema::run_migrations;
use crate::core::models::{FetchRequest, FetchResponse, HeaderList, RequestMode, ResponseType};
use crate::error::{OffcacheError, Result};

const ENTRY_COLUMNS: &str = "method, url, request_mode, request_headers, request_body, \
     status, response_type, response_headers, response_body, cached_at";

/// Cache store persisted in a `SQLite` database.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Create or open a cache database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| OffcacheError::Storage(format!("open cache db: {e}")))?;
        Self::init(conn)
    }

    /// Open an in-memory cache database (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OffcacheError::Storage(format!("open in-memory db: {e}")))?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| OffcacheError::Storage("cache db lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore").finish_non_exhaustive()
    }
}

fn ensure_cache(conn: &Connection, cache: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![cache, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn insert_entry(conn: &Connection, cache: &str, entry: &CacheEntry) -> Result<()> {
    let request = &entry.request;
    let response = &entry.response;
    conn.execute(
        "INSERT OR REPLACE INTO cache_entries (cache_name, cache_key, method, url, request_mode, \
         request_headers, request_body, status, response_type, response_headers, response_body, \
         cached_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            cache,
            request.cache_key(),
            request.method.as_str(),
            request.url.as_str(),
            request.mode.as_str(),
            serde_json::to_string(&request.headers)?,
            &request.body[..],
            response.status,
            response.kind.as_str(),
            serde_json::to_string(&response.headers)?,
            &response.body[..],
            entry.cached_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Row as stored, before decoding.
struct RawEntry {
    method: String,
    url: String,
    mode: String,
    request_headers: String,
    request_body: Vec<u8>,
    status: u16,
    kind: String,
    response_headers: String,
    response_body: Vec<u8>,
    cached_at: String,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        method: row.get(0)?,
        url: row.get(1)?,
        mode: row.get(2)?,
        request_headers: row.get(3)?,
        request_body: row.get(4)?,
        status: row.get(5)?,
        kind: row.get(6)?,
        response_headers: row.get(7)?,
        response_body: row.get(8)?,
        cached_at: row.get(9)?,
    })
}

fn decode(raw: RawEntry) -> Result<CacheEntry> {
    let corrupt = |what: &str, value: &str| {
        OffcacheError::Storage(format!("corrupt cache entry: bad {what} '{value}'"))
    };
    let method = Method::from_bytes(raw.method.as_bytes()).map_err(|_| corrupt("method", &raw.method))?;
    let url = Url::parse(&raw.url).map_err(|_| corrupt("url", &raw.url))?;
    let mode = RequestMode::from_str_opt(&raw.mode).ok_or_else(|| corrupt("mode", &raw.mode))?;
    let kind = ResponseType::from_str_opt(&raw.kind).ok_or_else(|| corrupt("response type", &raw.kind))?;
    let request_headers: HeaderList = serde_json::from_str(&raw.request_headers)?;
    let response_headers: HeaderList = serde_json::from_str(&raw.response_headers)?;
    let cached_at = DateTime::parse_from_rfc3339(&raw.cached_at)
        .map_err(|_| corrupt("timestamp", &raw.cached_at))?
        .with_timezone(&Utc);

    Ok(CacheEntry {
        request: FetchRequest {
            method,
            url,
            headers: request_headers,
            body: Bytes::from(raw.request_body),
            mode,
        },
        response: FetchResponse {
            status: raw.status,
            headers: response_headers,
            body: Bytes::from(raw.response_body),
            kind,
        },
        cached_at,
    })
}

impl CacheStore for SqliteCacheStore {
    fn open(&self, cache: &str) -> Result<()> {
        let conn = self.conn()?;
        ensure_cache(&conn, cache)
    }

    fn has(&self, cache: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM caches WHERE name = ?1", [cache], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn delete(&self, cache: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cache_entries WHERE cache_name = ?1", [cache])?;
        let deleted = tx.execute("DELETE FROM caches WHERE name = ?1", [cache])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn put(&self, cache: &str, entry: CacheEntry) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_cache(&tx, cache)?;
        insert_entry(&tx, cache, &entry)?;
        tx.commit()?;
        Ok(())
    }

    fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_cache(&tx, cache)?;
        for entry in &entries {
            insert_entry(&tx, cache, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn lookup(&self, cache: &str, request: &FetchRequest) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2"
                ),
                params![cache, request.cache_key()],
                map_row,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn entries(&self, cache: &str) -> Result<Vec<CacheEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE cache_name = ?1 \
             ORDER BY cached_at, rowid"
        ))?;
        let raws = stmt
            .query_map([cache], map_row)?
            .collect::<rusqlite::Result<Vec<RawEntry>>>()?;
        raws.into_iter().map(decode).collect()
    }

    fn remove(&self, cache: &str, request: &FetchRequest) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
            params![cache, request.cache_key()],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: Method, path: &str, body: &str) -> CacheEntry {
        let url = Url::parse("https://app.test").unwrap().join(path).unwrap();
        let request = FetchRequest::with_body(method, url, body.to_string())
            .header("Content-Type", "application/json");
        let response = FetchResponse::new(200, "stored").header("X-Test", "1");
        CacheEntry::new(request, response)
    }

    #[test]
    fn put_and_lookup_preserve_entry() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let e = entry(Method::POST, "/api/messages", r#"{"text":"hi"}"#);
        store.put("runtime", e.clone()).unwrap();

        let found = store.lookup("runtime", &e.request).unwrap().unwrap();
        assert_eq!(found.request, e.request);
        assert_eq!(found.response, e.response);
        assert_eq!(found.cached_at.timestamp(), e.cached_at.timestamp());
    }

    #[test]
    fn delete_cascades_entries() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store.put("old-v0", entry(Method::GET, "/a", "")).unwrap();
        store.put("runtime", entry(Method::GET, "/b", "")).unwrap();
        assert!(store.delete("old-v0").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["runtime".to_string()]);
        assert!(store.entries("old-v0").unwrap().is_empty());
        assert_eq!(store.entry_count("runtime").unwrap(), 1);
    }

    #[test]
    fn open_creates_empty_generation() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        store.open("runtime").unwrap();
        store.open("runtime").unwrap();
        assert!(store.has("runtime").unwrap());
        assert!(!store.has("precache").unwrap());
        assert_eq!(store.entry_count("runtime").unwrap(), 0);
    }

    #[test]
    fn remove_deletes_single_entry() {
        let store = SqliteCacheStore::open_in_memory().unwrap();
        let a = entry(Method::POST, "/api/messages", "a");
        let b = entry(Method::POST, "/api/messages", "b");
        store.put_all("runtime", vec![a.clone(), b.clone()]).unwrap();
        assert!(store.remove("runtime", &a.request).unwrap());
        let left = store.entries("runtime").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].request.body, b.request.body);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.sqlite");
        let e = entry(Method::GET, "/index.html", "");
        {
            let store = SqliteCacheStore::open(&path).unwrap();
            store.put("precache", e.clone()).unwrap();
        }
        let store = SqliteCacheStore::open(&path).unwrap();
        assert!(store.lookup("precache", &e.request).unwrap().is_some());
    }
}
