//! Durable key-value storage for LedgerChain
//!
//! The chain only needs byte keys mapped to byte values: blocks are stored
//! under their hash, and a few reserved keys hold the chain state. Two
//! backends are provided: [`SqliteStore`] for durable storage and
//! [`MemoryStore`] for tests and ephemeral runs.

use crate::error::{ChainError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One step of an atomic [`Store::write_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl StoreOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        StoreOp::Put { key: key.into(), value: value.into() }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        StoreOp::Delete { key: key.into() }
    }
}

/// Abstraction over the durable byte store backing the chain.
///
/// `get` distinguishes a missing key ([`ChainError::StoreNotFound`]) from a
/// fault in the backend ([`ChainError::StoreIo`]). Every operation fails
/// with `StoreIo` once the store has been closed.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
    fn contains(&self, key: &[u8]) -> Result<bool>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// Apply all operations or none of them.
    fn write_batch(&self, ops: &[StoreOp]) -> Result<()>;
    fn close(&self) -> Result<()>;
}

fn closed_error() -> ChainError {
    ChainError::StoreIo("store is closed".to_string())
}

/// Render a key for error messages: reserved keys are readable text,
/// block hashes are shown as hex.
pub(crate) fn describe_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => s.to_string(),
        _ => hex::encode(key),
    }
}

/// SQLite-backed store with a single `kv` table.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Whether a database file is already present at `path`.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ChainError::StoreIo(format!("Failed to create data dir {:?}: {}", parent, e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| ChainError::StoreIo(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// A store that lives only as long as the connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChainError::StoreIo(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::StoreIo(format!("Failed to create kv table: {}", e)))?;

        info!("Opened sqlite store");
        Ok(SqliteStore { conn: Mutex::new(Some(conn)) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::StoreIo("Mutex poisoned".to_string()))?;
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        f(conn)
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(|e| ChainError::StoreIo(format!("Failed to read key: {}", e)))?
                .ok_or_else(|| ChainError::StoreNotFound(describe_key(key)))
        })
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(|e| ChainError::StoreIo(format!("Failed to look up key: {}", e)))?;
            Ok(found.is_some())
        })
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| ChainError::StoreIo(format!("Failed to write key: {}", e)))?;
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(|e| ChainError::StoreIo(format!("Failed to delete key: {}", e)))?;
            Ok(())
        })
    }

    fn write_batch(&self, ops: &[StoreOp]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(|e| {
                ChainError::StoreIo(format!("Failed to start transaction: {}", e))
            })?;

            for op in ops {
                match op {
                    StoreOp::Put { key, value } => {
                        tx.execute(
                            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                            params![key, value],
                        )
                        .map_err(|e| ChainError::StoreIo(format!("Failed to write key: {}", e)))?;
                    }
                    StoreOp::Delete { key } => {
                        tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                            .map_err(|e| ChainError::StoreIo(format!("Failed to delete key: {}", e)))?;
                    }
                }
            }

            tx.commit().map_err(|e| {
                ChainError::StoreIo(format!("Failed to commit transaction: {}", e))
            })?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::StoreIo("Mutex poisoned".to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| ChainError::StoreIo(format!("Failed to close database: {}", e)))?;
            info!("Closed sqlite store");
        }
        Ok(())
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
///
/// Handles created with [`MemoryStore::reopen`] share the same entries, which
/// lets tests simulate a process restart against the same data.
#[derive(Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, open handle over the same entries.
    pub fn reopen(&self) -> Self {
        MemoryStore {
            entries: Arc::clone(&self.entries),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<Vec<u8>, Vec<u8>>) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ChainError::StoreIo("Mutex poisoned".to_string()))?;
        f(&mut entries)
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_entries(|entries| {
            entries
                .get(key)
                .cloned()
                .ok_or_else(|| ChainError::StoreNotFound(describe_key(key)))
        })
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        self.with_entries(|entries| Ok(entries.contains_key(key)))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_vec(), value.to_vec());
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
            Ok(())
        })
    }

    fn write_batch(&self, ops: &[StoreOp]) -> Result<()> {
        // The lock is held for the whole batch, so readers never see half of it.
        self.with_entries(|entries| {
            for op in ops {
                match op {
                    StoreOp::Put { key, value } => {
                        entries.insert(key.clone(), value.clone());
                    }
                    StoreOp::Delete { key } => {
                        entries.remove(key);
                    }
                }
            }
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        debug!("Closed in-memory store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise_store(store: &dyn Store) {
        assert!(!store.contains(b"alpha").unwrap());
        assert!(store.get(b"alpha").unwrap_err().is_not_found());

        store.put(b"alpha", b"one").unwrap();
        assert!(store.contains(b"alpha").unwrap());
        assert_eq!(store.get(b"alpha").unwrap(), b"one".to_vec());

        store.put(b"alpha", b"two").unwrap();
        assert_eq!(store.get(b"alpha").unwrap(), b"two".to_vec());

        store
            .write_batch(&[StoreOp::put("beta", "b"), StoreOp::delete("alpha")])
            .unwrap();
        assert!(!store.contains(b"alpha").unwrap());
        assert_eq!(store.get(b"beta").unwrap(), b"b".to_vec());

        store.delete(b"beta").unwrap();
        assert!(!store.contains(b"beta").unwrap());
    }

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryStore::new();
        exercise_store(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sqlite_store_operations() {
        let store = SqliteStore::open_in_memory().unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_not_found_names_the_key() {
        let store = MemoryStore::new();
        let err = store.get(b"chain:head").unwrap_err();
        assert_eq!(err, ChainError::StoreNotFound("chain:head".to_string()));

        let err = store.get(&[0u8, 1, 2]).unwrap_err();
        assert_eq!(err, ChainError::StoreNotFound("000102".to_string()));
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        store.close().unwrap();
        assert!(matches!(store.get(b"k"), Err(ChainError::StoreIo(_))));
        assert!(matches!(store.put(b"k", b"v"), Err(ChainError::StoreIo(_))));

        let reopened = store.reopen();
        assert_eq!(reopened.get(b"k").unwrap(), b"v".to_vec());

        let sqlite = SqliteStore::open_in_memory().unwrap();
        sqlite.close().unwrap();
        assert!(matches!(sqlite.contains(b"k"), Err(ChainError::StoreIo(_))));
        sqlite.close().unwrap();
    }

    #[test]
    fn test_sqlite_store_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        assert!(!SqliteStore::exists(&path));

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(b"persist", b"value").unwrap();
            store.close().unwrap();
        }

        assert!(SqliteStore::exists(&path));
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(b"persist").unwrap(), b"value".to_vec());
    }
}
