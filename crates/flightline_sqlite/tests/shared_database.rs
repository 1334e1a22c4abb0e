// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two stores opened on the same database file behave like two processes sharing the cache.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flightline::{CacheStore, RequestGuard, SerialQueue, Source};
use flightline_sqlite::SqliteStore;
use serde_json::{Value, json};

struct TempDatabase(PathBuf);

impl TempDatabase {
    fn new(name: &str) -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        Self(std::env::temp_dir().join(format!("{name}-{}-{nanos}.sqlite", std::process::id())))
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[tokio::test]
async fn entries_are_visible_across_handles() {
    let db = TempDatabase::new("shared-entries");
    let writer = SqliteStore::<Value>::open(&db.0).unwrap();
    let reader = SqliteStore::<Value>::open(&db.0).unwrap();
    let key = "shroud".to_string();

    writer
        .put(key.clone(), json!({"message": "player not found"}), Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(reader.get(&key).await.unwrap(), Some(json!({"message": "player not found"})));
}

#[tokio::test]
async fn concurrent_upserts_for_one_key_all_succeed() {
    let db = TempDatabase::new("concurrent-upserts");
    let a = SqliteStore::<Value>::open(&db.0).unwrap();
    let b = SqliteStore::<Value>::open(&db.0).unwrap();
    let key = "device".to_string();

    let writes = (0..10).map(|i| {
        let store = if i % 2 == 0 { a.clone() } else { b.clone() };
        let key = key.clone();
        tokio::spawn(async move { store.put(key, json!(i), Duration::from_secs(30)).await })
    });

    for write in writes.collect::<Vec<_>>() {
        write.await.unwrap().unwrap();
    }
    assert_eq!(a.count().await.unwrap(), 1);
    assert_eq!(b.count().await.unwrap(), 1);
}

#[tokio::test]
async fn guard_uses_persistent_store_as_cache() {
    let db = TempDatabase::new("guard-cache");
    let store = SqliteStore::<Value>::open(&db.0).unwrap();
    let guard: RequestGuard<String, Value, String, _, _> =
        RequestGuard::new(store, SerialQueue::new(Duration::from_millis(10)), Duration::from_secs(30));

    let first = guard.get("zywoo".to_string(), || async { Ok(json!({"isLive": false})) }).await.unwrap();
    assert_eq!(first.source(), Source::Upstream);

    // A second guard over the same file, as another process would have.
    let other: RequestGuard<String, Value, String, _, _> = RequestGuard::new(
        SqliteStore::<Value>::open(&db.0).unwrap(),
        SerialQueue::new(Duration::from_millis(10)),
        Duration::from_secs(30),
    );
    let second = other
        .get("zywoo".to_string(), || async { Err("must be cached".to_string()) })
        .await
        .unwrap();
    assert_eq!(second.source(), Source::Cache);
    assert_eq!(second.into_value(), json!({"isLive": false}));
}
