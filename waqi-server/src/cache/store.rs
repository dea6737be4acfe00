//! On-disk key-value store for cached measurements.
//!
//! A single SQLite table maps string keys to JSON-encoded
//! `CachedStatus` values. The connection sits behind a mutex and every call
//! runs on tokio's blocking pool, so the store can be shared freely between
//! tasks.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::domain::Status;

/// Errors from the cache store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite failed
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not prepare the directory holding the store
    #[error("failed to create store directory: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded or decoded
    #[error("invalid cache entry: {0}")]
    Codec(#[from] serde_json::Error),

    /// `close` has already been called
    #[error("store is closed")]
    Closed,

    /// A previous operation panicked while holding the connection
    #[error("store connection poisoned")]
    Poisoned,

    /// The blocking task running the operation failed
    #[error("store task failed: {0}")]
    Task(String),
}

/// A measurement together with the time it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedStatus {
    pub captured_at: DateTime<Utc>,
    pub status: Status,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS status_cache (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

/// Persistent store for cached measurements.
#[derive(Debug, Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl CacheStore {
    /// Open (or create) the store at `path`.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open a store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            let conn = guard.as_mut().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Read the entry stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<CachedStatus>, StoreError> {
        let key = key.to_string();
        let raw = self
            .run(move |conn| {
                let raw = conn
                    .prepare_cached("SELECT value FROM status_cache WHERE key = ?1")?
                    .query_row(params![key], |row| row.get::<_, String>(0))
                    .optional()?;
                Ok(raw)
            })
            .await?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
            .transpose()
    }

    /// Store `entry` under each of `keys`, atomically.
    pub async fn put(&self, keys: Vec<String>, entry: &CachedStatus) -> Result<(), StoreError> {
        let value = serde_json::to_string(entry)?;
        self.run(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO status_cache (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )?;
                for key in &keys {
                    stmt.execute(params![key, value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Number of stored keys.
    pub async fn len(&self) -> Result<usize, StoreError> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM status_cache", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Close the connection. Later operations fail with `StoreError::Closed`;
    /// closing twice is a no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        }
        Ok(())
    }
}
