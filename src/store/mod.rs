//! Durable key-value storage for coordinator state.
//!
//! [`Store`] is the narrow contract the coordinator needs: whole-value
//! `put`/`get`/`delete` plus a prefix scan. Rows are grouped by column so
//! several managers can share one database without key collisions.
//!
//! - [`SqliteStore`]: file-backed, used by the server binary
//! - [`MemoryStore`]: in-process, used by tests

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors produced by [`Store`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage contract for coordinator records.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn Store>`.
/// Every write is a complete record, so no multi-row transactions are needed.
pub trait Store: Send + Sync {
    /// Insert or overwrite the value stored under `(column, key)`.
    fn put(&self, column: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Read the value stored under `(column, key)`, `Ok(None)` if absent.
    fn get(&self, column: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove `(column, key)`. Deleting a missing key is not an error.
    fn delete(&self, column: &str, key: &[u8]) -> Result<()>;

    /// Visit every row of `column` whose key starts with `prefix`, in key
    /// order. The visitor returns `false` to stop the scan early.
    fn list(
        &self,
        column: &str,
        prefix: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()>;
}
