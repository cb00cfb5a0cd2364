use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use strata_core::error::{Result, StrataError};
use strata_core::traits::CacheBackend;
use strata_core::types::CacheKey;

/// SQLite-backed key/value store behind the response cache.
pub struct SqliteCacheBackend {
    conn: Mutex<Connection>,
}

impl SqliteCacheBackend {
    /// Open or create a cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StrataError::Cache(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(|e| StrataError::Cache(e.to_string()))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StrataError::Cache(e.to_string()))?;

        Self::initialize(&conn)?;

        debug!(path = %path.display(), "Cache database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StrataError::Cache(e.to_string()))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(|e| StrataError::Cache(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StrataError::Cache(e.to_string()))
    }
}

impl CacheBackend for SqliteCacheBackend {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM response_cache WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StrataError::Cache(e.to_string()))
    }

    fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO response_cache (key, value, created_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StrataError::Cache(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM response_cache WHERE key = ?1", params![key])
            .map_err(|e| StrataError::Cache(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM response_cache", [])
            .map_err(|e| StrataError::Cache(e.to_string()))?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))
            .map_err(|e| StrataError::Cache(e.to_string()))?;
        Ok(count as usize)
    }
}

/// Content-addressed cache over serialized analysis responses.
///
/// Reads and writes are deliberately forgiving: a broken cache must never
/// fail an analysis run, only slow it down. Manual invalidation is the only
/// way entries leave the cache.
pub struct ResponseCache {
    backend: Box<dyn CacheBackend>,
}

impl ResponseCache {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Look up a cached value. Backend failures and undecodable entries
    /// count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.backend.load(key.as_str()) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache entry undecodable, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value, logging and swallowing any failure.
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache encode failed, skipping write");
                return;
            }
        };
        if let Err(e) = self.backend.store(key.as_str(), &bytes) {
            warn!(key = %key, error = %e, "Cache write failed, continuing without");
        }
    }

    /// Drop one entry. Removing an absent key is not an error.
    pub fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.backend.remove(key.as_str())
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.clear()
    }

    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.backend.is_empty()
    }
}
