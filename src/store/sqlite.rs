//! `SQLite`-backed implementation of [`Store`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};

use crate::store::{Result, Store, StoreError};

/// Idempotent DDL for the key-value table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    col TEXT NOT NULL,
    key BLOB NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (col, key)
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Store for SqliteStore {
    fn put(&self, column: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO kv (col, key, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(col, key) DO UPDATE SET value = excluded.value",
            rusqlite::params![column, key, value],
        )?;
        Ok(())
    }

    fn get(&self, column: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE col = ?1 AND key = ?2",
                rusqlite::params![column, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, column: &str, key: &[u8]) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM kv WHERE col = ?1 AND key = ?2",
            rusqlite::params![column, key],
        )?;
        Ok(())
    }

    fn list(
        &self,
        column: &str,
        prefix: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        // Materialize first so the visitor never runs under the connection lock.
        let rows: Vec<(Vec<u8>, Vec<u8>)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE col = ?1 ORDER BY key")?;
            let mapped = stmt.query_map([column], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                let (key, value) = row?;
                if key.starts_with(prefix) {
                    rows.push((key, value));
                }
            }
            rows
        };

        for (key, value) in &rows {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }
}
