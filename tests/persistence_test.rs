//! The SQLite cache store behind the worker: precache and pending writes
//! survive a restart, and a restarted worker serves offline.

mod common;

use std::sync::Arc;

use http::Method;
use tempfile::TempDir;

use offcache::core::{FetchDisposition, FetchRequest, FetchResponse, ResponseSource, WorkerState};
use offcache::storage::{CacheStore, SqliteCacheStore};
use offcache::test_utils::{
    ScriptedNetwork, make_test_settings, make_test_worker_with_store, script_manifest, test_url,
};

use common::logger::TestLogger;

#[tokio::test]
async fn restarted_worker_serves_precache_offline() {
    let log = TestLogger::new("restarted_worker_serves_precache_offline");
    log.phase("setup");
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cache.sqlite");

    {
        let network = ScriptedNetwork::new();
        script_manifest(&network);
        let store = Arc::new(SqliteCacheStore::open(&db).unwrap());
        let worker = make_test_worker_with_store(network, store);
        worker.dispatch_install().await.unwrap();
    }

    log.phase("restart offline");
    let network = ScriptedNetwork::new();
    network.set_offline(true);
    let store = Arc::new(SqliteCacheStore::open(&db).unwrap());
    let worker = make_test_worker_with_store(network.clone(), store);
    assert_eq!(worker.start().await.unwrap(), WorkerState::Activated);

    log.phase("verify");
    let disposition = worker
        .dispatch_fetch(FetchRequest::navigate(test_url("/settings")))
        .await;
    let FetchDisposition::Respond { response, source } = disposition else {
        panic!("expected a response");
    };
    assert_eq!(source, ResponseSource::Cache);
    assert_eq!(response.text(), "precached /");
    assert_eq!(
        response.header_value("content-type"),
        Some("text/html"),
        "headers survive the round trip"
    );
    log.finish_ok();
}

#[tokio::test]
async fn pending_write_survives_restart_and_replays() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cache.sqlite");
    let write = FetchRequest::with_body(Method::POST, test_url("/api/messages"), r#"{"text":"later"}"#);

    {
        let network = ScriptedNetwork::new();
        script_manifest(&network);
        let store = Arc::new(SqliteCacheStore::open(&db).unwrap());
        let worker = make_test_worker_with_store(network.clone(), store);
        worker.dispatch_install().await.unwrap();
        network.set_offline(true);
        worker.dispatch_fetch(write.clone()).await;
    }

    let network = ScriptedNetwork::new();
    network.respond(Method::POST, "/api/messages", FetchResponse::new(201, "stored"));
    let store = Arc::new(SqliteCacheStore::open(&db).unwrap());
    let worker = make_test_worker_with_store(network.clone(), store.clone());
    worker.start().await.unwrap();

    let report = worker.dispatch_sync("sync-messages").await.unwrap().unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(network.call_count(&Method::POST, "/api/messages"), 1);
    assert_eq!(network.calls()[0].body, write.body);
    let runtime = make_test_settings().runtime_name;
    assert!(store.lookup(&runtime, &write).unwrap().is_none());
}
