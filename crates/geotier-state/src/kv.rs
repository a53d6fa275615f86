//! Key-value persistence backing the association store.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::COLLECTIONS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Byte-level persistence: whole values in, whole values out.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> StateResult<()>;
}

/// Thread-safe key-value store backed by redb.
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let kv = Self { db: Arc::new(db) };
        kv.ensure_tables()?;
        debug!(?path, "kv store opened");
        Ok(kv)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let kv = Self { db: Arc::new(db) };
        kv.ensure_tables()?;
        debug!("in-memory kv store opened");
        Ok(kv)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(COLLECTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl KvStore for RedbKv {
    fn get(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(COLLECTIONS).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(COLLECTIONS).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, bytes = value.len(), "collection stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_is_none() {
        let kv = RedbKv::open_in_memory().unwrap();
        assert!(kv.get("nothing").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_whole_value() {
        let kv = RedbKv::open_in_memory().unwrap();
        kv.put("k", b"first value").unwrap();
        kv.put("k", b"2nd").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some(&b"2nd"[..]));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let kv = RedbKv::open(&db_path).unwrap();
            kv.put("k", b"v").unwrap();
        }

        let kv = RedbKv::open(&db_path).unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }
}
