// ABOUTME: Durable key-value store for raw provider payloads backed by a SQLite database.
// ABOUTME: Every write is committed to disk before returning; values are stored as JSON text.

use crate::error::{PuppetError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const DB_FILE_NAME: &str = "store.sqlite3";

/// On-disk key/value store keyed by provider-assigned id.
///
/// Opening takes a directory; the database lives inside it so the on-disk layout
/// stays one directory per store.
pub struct KvStore<V> {
    dir: PathBuf,
    db: Mutex<Option<Connection>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> KvStore<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join(DB_FILE_NAME))?;
        // FULL sync: a returned set() has reached stable storage
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS payloads (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        tracing::debug!(dir = %dir.display(), "Opened key-value store");

        Ok(Self {
            dir,
            db: Mutex::new(Some(conn)),
            _value: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the stored value, or None for a missing key
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        let db = self.lock();
        let conn = db.as_ref().ok_or(PuppetError::StoreClosed)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM payloads WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }

    /// Full overwrite of any previous value under `key`
    pub fn set(&self, key: &str, value: &V) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let db = self.lock();
        let conn = db.as_ref().ok_or(PuppetError::StoreClosed)?;
        conn.execute(
            "INSERT INTO payloads (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let db = self.lock();
        let conn = db.as_ref().ok_or(PuppetError::StoreClosed)?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM payloads WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All known keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let db = self.lock();
        let conn = db.as_ref().ok_or(PuppetError::StoreClosed)?;
        let mut stmt = conn.prepare("SELECT key FROM payloads ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize> {
        let db = self.lock();
        let conn = db.as_ref().ok_or(PuppetError::StoreClosed)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM payloads", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Flush and release the database. Later calls fail with `StoreClosed`.
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| PuppetError::Store(e))?;
        tracing::debug!(dir = %self.dir.display(), "Closed key-value store");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
