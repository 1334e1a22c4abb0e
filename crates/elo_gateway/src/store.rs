// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use flightline::cache::Result;
use flightline::{CacheStore, MemoryStore};
use flightline_sqlite::SqliteStore;
use serde_json::Value;

use crate::config::CacheBackend;

/// The cache backend selected by configuration.
#[derive(Debug, Clone)]
pub enum GatewayStore {
    /// In-process cache.
    Memory(MemoryStore<String, Value>),

    /// SQLite cache shared across processes.
    Sqlite(SqliteStore<Value>),
}

impl GatewayStore {
    /// Opens the backend described by `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite database cannot be opened.
    pub fn open(backend: &CacheBackend) -> Result<Self> {
        match backend {
            CacheBackend::Memory => Ok(Self::Memory(MemoryStore::new())),
            CacheBackend::Sqlite { path } => SqliteStore::open(path).map(Self::Sqlite),
        }
    }

    /// Removes expired entries and returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite purge fails.
    pub async fn purge_expired(&self) -> Result<usize> {
        match self {
            Self::Memory(store) => Ok(store.purge_expired()),
            Self::Sqlite(store) => store.purge_expired().await,
        }
    }

    /// Counts the live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite count fails.
    pub async fn count(&self) -> Result<usize> {
        match self {
            Self::Memory(store) => Ok(store.len().unwrap_or_default()),
            Self::Sqlite(store) => store.count().await,
        }
    }
}

impl CacheStore<String, Value> for GatewayStore {
    async fn get(&self, key: &String) -> Result<Option<Value>> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Sqlite(store) => store.get(key).await,
        }
    }

    async fn put(&self, key: String, value: Value, ttl: Duration) -> Result<()> {
        match self {
            Self::Memory(store) => store.put(key, value, ttl).await,
            Self::Sqlite(store) => store.put(key, value, ttl).await,
        }
    }

    async fn invalidate(&self, key: &String) -> Result<()> {
        match self {
            Self::Memory(store) => store.invalidate(key).await,
            Self::Sqlite(store) => store.invalidate(key).await,
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Self::Memory(store) => store.len(),
            Self::Sqlite(store) => store.len(),
        }
    }
}

/// Purges expired entries from `store` every `interval` until the runtime shuts down.
pub fn spawn_purge_task(store: GatewayStore, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "purged expired cache entries"),
                Err(error) => tracing::warn!(%error, "cache purge failed"),
            }
        }
    })
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn purge_task_drops_expired_memory_entries() {
        let store = GatewayStore::open(&CacheBackend::Memory).unwrap();
        store
            .put("shroud".to_owned(), json!({"isLive": true}), Duration::from_secs(30))
            .await
            .unwrap();
        let task = spawn_purge_task(store.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;

        let GatewayStore::Memory(memory) = &store else {
            panic!("expected the memory backend");
        };
        assert_eq!(memory.len(), Some(0));
        task.abort();
    }

    #[tokio::test]
    async fn sqlite_backend_dispatches() {
        let store = GatewayStore::Sqlite(SqliteStore::open_in_memory().unwrap());
        let key = "ropz".to_owned();

        store.put(key.clone(), json!({"elo": 3100}), Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"elo": 3100})));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.len(), None);

        store.invalidate(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }
}
