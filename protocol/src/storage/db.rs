//! # BftxDb: sled-backed transaction store
//!
//! One named tree holds every record:
//!
//! | Tree           | Key                    | Value                  |
//! |----------------|------------------------|------------------------|
//! | `transactions` | transaction id (UTF-8) | canonical record bytes |
//!
//! Every write is flushed before returning, so "persisted" means on disk,
//! not in sled's page cache. `put_many` goes through a single `Batch` and is
//! therefore atomic: an append either lands both records or neither.

use sled::{Batch, Db, Tree};
use std::path::Path;
use tracing::debug;

use super::{StoreError, StoreResult, TxStore};

const TRANSACTIONS_TREE: &str = "transactions";

/// Persistent storage engine for BF_TX records.
///
/// sled is thread-safe; `BftxDb` can be shared through an `Arc` without
/// further locking.
#[derive(Debug, Clone)]
pub struct BftxDb {
    db: Db,
    transactions: Tree,
}

impl BftxDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database, removed when the last handle drops. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let transactions = db.open_tree(TRANSACTIONS_TREE)?;
        Ok(Self { db, transactions })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl TxStore for BftxDb {
    fn put(&self, id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.transactions.insert(id.as_bytes(), bytes)?;
        self.transactions.flush()?;
        debug!(id, len = bytes.len(), "stored transaction");
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Vec<u8>> {
        self.transactions
            .get(id.as_bytes())?
            .map(|value| value.to_vec())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.transactions.contains_key(id.as_bytes())?)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.transactions.len())
    }

    fn scan(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.transactions
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                let id = String::from_utf8(key.to_vec()).map_err(|e| StoreError::Corrupt {
                    id: hex::encode(&key),
                    reason: e.to_string(),
                })?;
                Ok((id, value.to_vec()))
            })
            .collect()
    }

    fn put_many(&self, entries: &[(String, Vec<u8>)]) -> StoreResult<()> {
        let mut batch = Batch::default();
        for (id, bytes) in entries {
            batch.insert(id.as_bytes(), bytes.as_slice());
        }
        self.transactions.apply_batch(batch)?;
        self.transactions.flush()?;
        debug!(records = entries.len(), "stored transaction batch");
        Ok(())
    }
}
