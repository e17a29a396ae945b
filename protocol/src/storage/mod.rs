//! # Storage Module
//!
//! Durable key-value persistence for BF_TX records. The store is the only
//! source of truth between calls: an operation that mutates a record has
//! not succeeded until the store says the write landed.
//!
//! ## Contract
//!
//! | Operation  | Semantics                                                  |
//! |------------|------------------------------------------------------------|
//! | `put`      | idempotent upsert, last write wins, no version check       |
//! | `get`      | stored bytes, or [`StoreError::NotFound`]                  |
//! | `exists`   | presence check                                             |
//! | `count`    | number of records                                          |
//! | `scan`     | every `(id, bytes)` pair, in key order                     |
//! | `put_many` | several upserts; atomic only where the backend says so     |
//!
//! Keys are transaction identifiers. Values are canonical record bytes; the
//! store does not interpret them.

pub mod db;

pub use db::BftxDb;

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Backend(#[from] sled::Error),

    /// Reported by `TxStore` backends other than sled when they cannot be
    /// reached. `BftxDb` surfaces its failures as `Backend`.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("stored record {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for the transaction service.
///
/// Implementations must be safe to share across tasks; the service holds
/// one behind an `Arc` and calls it from every request.
pub trait TxStore: Send + Sync {
    fn put(&self, id: &str, bytes: &[u8]) -> StoreResult<()>;

    fn get(&self, id: &str) -> StoreResult<Vec<u8>>;

    fn exists(&self, id: &str) -> StoreResult<bool>;

    fn count(&self) -> StoreResult<usize>;

    fn scan(&self) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Write several records in order.
    ///
    /// The default writes them one at a time, so a failure part way leaves
    /// the earlier entries persisted and the later ones not. Backends that
    /// can commit a multi-key write atomically should override this.
    fn put_many(&self, entries: &[(String, Vec<u8>)]) -> StoreResult<()> {
        for (id, bytes) in entries {
            self.put(id, bytes)?;
        }
        Ok(())
    }
}
