//! # In-process consensus engine
//!
//! A single-validator stand-in for the real engine that implements
//! [`ConsensusGateway`] without a network. Every admitted transaction is
//! committed immediately in its own block:
//!
//! 1. the tx hash is the upper-case hex SHA-256 of its bytes, as on a real
//!    engine;
//! 2. a hash already seen is refused with [`DUPLICATE_TX_CODE`];
//! 3. the bytes must parse as a record with an `Id`, which is indexed under
//!    `bftx.id`;
//! 4. the app hash advances to `BLAKE3(prev_app_hash || tx_hash)`.
//!
//! Tests get knobs the real engine does not have: pin the anchor, take
//! the engine offline, and count calls per method.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    BroadcastReceipt, ConsensusGateway, EngineInfo, EqualityQuery, GatewayError, SearchHit,
};
use crate::config::SEARCH_ID_KEY;
use crate::crypto::{blake3_hash, sha256};

/// `CheckTx` code for a transaction whose hash is already known.
pub const DUPLICATE_TX_CODE: u32 = 19;

/// `CheckTx` code for bytes that are not a BF_TX record.
pub const MALFORMED_TX_CODE: u32 = 2;

#[derive(Debug, Default)]
struct EngineState {
    app_hash: Vec<u8>,
    height: u64,
    offline: bool,
    seen: HashSet<String>,
    /// Committed transactions with their indexed `(key, value)` tags.
    committed: Vec<(SearchHit, Vec<(String, String)>)>,
}

#[derive(Debug, Default)]
pub struct LocalEngine {
    state: Mutex<EngineState>,
    anchor_calls: AtomicUsize,
    broadcast_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the current app hash.
    pub fn set_anchor(&self, anchor: Vec<u8>) {
        self.state.lock().app_hash = anchor;
    }

    /// While offline every call fails `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    pub fn anchor_calls(&self) -> usize {
        self.anchor_calls.load(Ordering::SeqCst)
    }

    /// Broadcast attempts, including refused ones.
    pub fn broadcast_calls(&self) -> usize {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn ensure_online(state: &EngineState) -> Result<(), GatewayError> {
        if state.offline {
            return Err(GatewayError::Unavailable("local engine is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConsensusGateway for LocalEngine {
    async fn anchor(&self) -> Result<Vec<u8>, GatewayError> {
        self.anchor_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(state.app_hash.clone())
    }

    async fn broadcast_sync(&self, tx: &[u8]) -> Result<BroadcastReceipt, GatewayError> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        Self::ensure_online(&state)?;

        let tx_hash = sha256(tx);
        let hash = hex::encode_upper(tx_hash);
        if state.seen.contains(&hash) {
            return Err(GatewayError::Rejected {
                code: DUPLICATE_TX_CODE,
                log: "tx already exists in cache".into(),
            });
        }

        let id = serde_json::from_slice::<serde_json::Value>(tx)
            .ok()
            .and_then(|v| v.get("Id").and_then(|id| id.as_str()).map(str::to_string))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Rejected {
                code: MALFORMED_TX_CODE,
                log: "tx is not a BF_TX record".into(),
            })?;

        state.seen.insert(hash.clone());
        state.height += 1;
        let mut chained = state.app_hash.clone();
        chained.extend_from_slice(&tx_hash);
        state.app_hash = blake3_hash(&chained).to_vec();

        let hit = SearchHit {
            hash: hash.clone(),
            height: state.height,
            index: 0,
            tx: tx.to_vec(),
        };
        state
            .committed
            .push((hit, vec![(SEARCH_ID_KEY.to_string(), id.clone())]));
        debug!(id = %id, height = state.height, "local engine committed transaction");

        Ok(BroadcastReceipt {
            hash,
            log: String::new(),
        })
    }

    async fn search(&self, query: &EqualityQuery) -> Result<Vec<SearchHit>, GatewayError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(state
            .committed
            .iter()
            .filter(|(_, tags)| {
                tags.iter()
                    .any(|(k, v)| k == query.key() && v == query.value())
            })
            .map(|(hit, _)| hit.clone())
            .collect())
    }

    async fn info(&self) -> Result<EngineInfo, GatewayError> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(EngineInfo {
            data: "bftx-local".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            last_block_height: state.height,
            last_block_app_hash: hex::encode(&state.app_hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_commits_and_advances_anchor() {
        let engine = LocalEngine::new();
        let before = engine.anchor().await.unwrap();
        let receipt = engine.broadcast_sync(br#"{"Id":"abc"}"#).await.unwrap();
        assert_eq!(receipt.hash.len(), 64);
        assert_eq!(engine.height(), 1);
        assert_ne!(engine.anchor().await.unwrap(), before);
    }

    #[tokio::test]
    async fn duplicate_bytes_rejected() {
        let engine = LocalEngine::new();
        engine.broadcast_sync(br#"{"Id":"abc"}"#).await.unwrap();
        let err = engine.broadcast_sync(br#"{"Id":"abc"}"#).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: DUPLICATE_TX_CODE, .. }));
        assert_eq!(engine.broadcast_calls(), 2);
    }

    #[tokio::test]
    async fn non_record_rejected() {
        let engine = LocalEngine::new();
        let err = engine.broadcast_sync(b"not json").await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { code: MALFORMED_TX_CODE, .. }));
        assert_eq!(engine.height(), 0);
    }

    #[tokio::test]
    async fn search_is_exact_and_ordered() {
        let engine = LocalEngine::new();
        engine
            .broadcast_sync(br#"{"Id":"abc","Verified":true}"#)
            .await
            .unwrap();
        engine.broadcast_sync(br#"{"Id":"abd"}"#).await.unwrap();
        engine
            .broadcast_sync(br#"{"Id":"abc","Transmitted":true}"#)
            .await
            .unwrap();

        let hits = engine
            .search(&EqualityQuery::by_id("abc").unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].height < hits[1].height);

        let none = engine
            .search(&EqualityQuery::by_id("ABC").unwrap())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn offline_engine_is_unavailable() {
        let engine = LocalEngine::new();
        engine.set_offline(true);
        assert!(matches!(
            engine.anchor().await,
            Err(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            engine.broadcast_sync(br#"{"Id":"x"}"#).await,
            Err(GatewayError::Unavailable(_))
        ));
    }
}
