// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flightline::CacheStore;
use flightline::cache::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY NOT NULL,
    payload TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS cache_entries_expires_at ON cache_entries (expires_at_ms);
";

const UPSERT: &str = "
INSERT INTO cache_entries (key, payload, expires_at_ms) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, expires_at_ms = excluded.expires_at_ms
";

type WallClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// A [`CacheStore`] keeping JSON-encoded values in a SQLite table.
///
/// Each operation runs on tokio's blocking thread pool. The connection is guarded by a mutex,
/// so operations from one `SqliteStore` (and its clones) are serialized; separate processes
/// coordinate through SQLite's own locking.
pub struct SqliteStore<V> {
    conn: Arc<Mutex<Connection>>,
    now_ms: WallClock,
    _values: PhantomData<fn() -> V>,
}

impl<V> Clone for SqliteStore<V> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            now_ms: Arc::clone(&self.now_ms),
            _values: PhantomData,
        }
    }
}

impl<V> Debug for SqliteStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl<V> SqliteStore<V> {
    /// Opens (creating if needed) the database at `path` and prepares the cache table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|error| Error::caused_by(format!("open cache database at {}", path.display()), error))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|error| Error::caused_by("enable write-ahead logging", error))?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|error| Error::caused_by("open in-memory cache database", error))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|error| Error::caused_by("set busy timeout", error))?;
        conn.execute_batch(SCHEMA)
            .map_err(|error| Error::caused_by("create cache schema", error))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            now_ms: Arc::new(system_now_ms),
            _values: PhantomData,
        })
    }

    /// Replaces the wall clock, in milliseconds since the Unix epoch, used for expiry.
    #[must_use]
    pub fn with_clock(mut self, now_ms: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.now_ms = Arc::new(now_ms);
        self
    }

    /// Deletes every expired entry and returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete statement fails.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = (self.now_ms)();
        let removed = self
            .blocking("purge expired cache entries", move |conn| {
                conn.execute("DELETE FROM cache_entries WHERE expires_at_ms <= ?1", params![now])
            })
            .await?;

        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Counts the entries that have not expired yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub async fn count(&self) -> Result<usize> {
        let now = (self.now_ms)();
        let count = self
            .blocking("count cache entries", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE expires_at_ms > ?1",
                    params![now],
                    |row| row.get::<_, i64>(0),
                )
            })
            .await?;

        usize::try_from(count).map_err(|error| Error::caused_by("count cache entries", error))
    }

    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|error| Error::caused_by(format!("{operation}: blocking task failed"), error))?
        .map_err(|error| Error::caused_by(operation, error))
    }
}

impl<V> CacheStore<String, V> for SqliteStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &String) -> Result<Option<V>> {
        let key = key.clone();
        let now = (self.now_ms)();
        let payload = self
            .blocking("read cache entry", move |conn| {
                conn.query_row(
                    "SELECT payload FROM cache_entries WHERE key = ?1 AND expires_at_ms > ?2",
                    params![key, now],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await?;

        payload
            .map(|payload| serde_json::from_str(&payload).map_err(|error| Error::caused_by("decode cached payload", error)))
            .transpose()
    }

    async fn put(&self, key: String, value: V, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(&value).map_err(|error| Error::caused_by("encode cache payload", error))?;
        let expires_at_ms = (self.now_ms)().saturating_add(duration_ms(ttl));

        self.blocking("write cache entry", move |conn| {
            conn.execute(UPSERT, params![key, payload, expires_at_ms]).map(drop)
        })
        .await
    }

    async fn invalidate(&self, key: &String) -> Result<()> {
        let key = key.clone();
        self.blocking("delete cache entry", move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key]).map(drop)
        })
        .await
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, duration_ms)
}
