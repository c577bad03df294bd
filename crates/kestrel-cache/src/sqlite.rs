use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use kestrel_core::{CacheEntryInfo, CacheService, CacheTag, KestrelError, Result, merge_shallow};

fn db_err(e: rusqlite::Error) -> KestrelError {
    KestrelError::Cache(e.to_string())
}

/// SQLite-backed cache. Values and tags are stored as JSON text.
///
/// The connection sits behind a mutex and `update` runs its read-merge-write
/// inside one transaction, so merges on the same key never interleave.
pub struct SqliteCache {
    db: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open or create the cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening cache store");
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Volatile database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                tag TEXT,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(db_err)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM cache_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl CacheService for SqliteCache {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.db.lock();
        read_value(&conn, key)
    }

    async fn set(&self, key: &str, value: Value, tag: Option<CacheTag>) -> Result<()> {
        let value = serde_json::to_string(&value)?;
        let tag = tag.map(|t| serde_json::to_string(&t)).transpose()?;
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO cache_entries (key, value, tag, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value, tag = excluded.tag, updated_at = excluded.updated_at",
            params![key, value, tag, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(&self, key: &str, partial: Value) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let merged = match read_value(&tx, key)? {
            Some(base) => merge_shallow(base, partial),
            None => partial,
        };
        // Tag column is left untouched on conflict.
        tx.execute(
            "INSERT INTO cache_entries (key, value, tag, updated_at) VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value, updated_at = excluded.updated_at",
            params![key, serde_json::to_string(&merged)?, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.db.lock();
        let n = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(db_err)?;
        Ok(n > 0)
    }

    async fn entries(&self) -> Result<Vec<CacheEntryInfo>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare("SELECT key, tag, updated_at FROM cache_entries ORDER BY key")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (key, tag, updated_at) = row.map_err(db_err)?;
            let tag = tag.map(|t| serde_json::from_str::<CacheTag>(&t)).transpose()?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| KestrelError::Cache(format!("bad timestamp for {key}: {e}")))?;
            out.push(CacheEntryInfo {
                key,
                tag,
                updated_at,
            });
        }
        Ok(out)
    }
}
