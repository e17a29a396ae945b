//! # Transaction Service
//!
//! The orchestrator. Every external operation enters here, and every one
//! follows the same shape:
//!
//! ```text
//! lock id ─► load from store ─► lifecycle guard ─► apply leaf component ─► persist ─► (consensus)
//! ```
//!
//! The store is the source of truth. An operation reports success only
//! after its write landed, and it reports the first failure it hit with
//! no rollback beyond what an operation documents for itself.
//!
//! ## Broadcast ordering
//!
//! Broadcast persists `Transmitted = true` *before* the network call. If the
//! call then fails, the local record already says transmitted and a second
//! broadcast is refused. That is the at-most-once side of an ambiguous
//! timeout: the engine may well have admitted the bytes, and blindly sending
//! them again could double-submit. Use [`TransactionService::query`] to find
//! out which happened.
//!
//! ## Append
//!
//! The child records `Amends = parent` and the parent gets
//! `Amendment = child`. Both writes go through [`TxStore::put_many`].
//! That is atomic on sled, and [`TransactionService::reconcile_amendments`]
//! repairs the gap on stores where it is not.

pub mod locks;

pub use locks::IdLocks;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::consensus::{BroadcastReceipt, ConsensusGateway, EngineInfo, EqualityQuery};
use crate::encoding::EncodingPipeline;
use crate::error::{BftxError, BftxResult};
use crate::storage::{StoreError, TxStore};
use crate::transaction::canonical::record_bytes;
use crate::transaction::lifecycle::{check, Action, LifecycleState};
use crate::transaction::{BfTx, EncodingState, IdentityDeriver, SigningService};

/// Log an operation's outcome. Purely observational: the result passes
/// through untouched.
fn observe<T>(operation: &'static str, id: &str, result: BftxResult<T>) -> BftxResult<T> {
    match &result {
        Ok(_) => debug!(operation, id, "operation succeeded"),
        Err(err) => warn!(
            operation,
            id,
            kind = %err.kind(),
            error = %err,
            "operation failed"
        ),
    }
    result
}

pub struct TransactionService {
    store: Arc<dyn TxStore>,
    gateway: Arc<dyn ConsensusGateway>,
    deriver: IdentityDeriver,
    signer: SigningService,
    pipeline: EncodingPipeline,
    locks: IdLocks,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn TxStore>,
        gateway: Arc<dyn ConsensusGateway>,
        signer: SigningService,
        pipeline: EncodingPipeline,
    ) -> Self {
        Self {
            deriver: IdentityDeriver::new(Arc::clone(&gateway)),
            store,
            gateway,
            signer,
            pipeline,
            locks: IdLocks::new(),
        }
    }

    pub fn signer(&self) -> &SigningService {
        &self.signer
    }

    // -- Operations ---------------------------------------------------------

    /// Check that `payload` could be constructed: a non-empty JSON object.
    pub fn validate(&self, payload: &Value) -> BftxResult<()> {
        observe("validate", "-", validate_payload(payload))
    }

    /// Build, identify and persist a new record. Returns its id.
    pub async fn construct(&self, payload: Value) -> BftxResult<String> {
        let result = async {
            validate_payload(&payload)?;
            let tx = self.identify(BfTx::new(payload)).await?;
            let _guard = self.locks.lock(&tx.id).await;
            self.refuse_existing(&tx.id)?;
            self.persist(&tx)?;
            info!(id = %tx.id, "transaction constructed");
            Ok(tx.id)
        }
        .await;
        observe("construct", "-", result)
    }

    /// Sign the stored record, flipping `Verified` to true.
    pub async fn sign(&self, id: &str) -> BftxResult<BfTx> {
        let result = async {
            let _guard = self.locks.lock(id).await;
            let tx = self.load(id)?;
            check(&tx, Action::Sign)?;
            let signed = self.signer.sign(&tx)?;
            self.persist(&signed)?;
            info!(id, signer = ?signed.signer, "transaction signed");
            Ok(signed)
        }
        .await;
        observe("sign", id, result)
    }

    /// Seal the stored payload under `params` (default set when `None`).
    pub async fn encode(&self, id: &str, params: Option<&str>) -> BftxResult<BfTx> {
        let result = async {
            let _guard = self.locks.lock(id).await;
            let tx = self.load(id)?;
            let encoded = self.pipeline.encode(&tx, params)?;
            self.persist(&encoded)?;
            Ok(encoded)
        }
        .await;
        observe("encode", id, result)
    }

    /// Open the stored sealed payload. Inverse of [`encode`](Self::encode)
    /// for the same parameter set.
    pub async fn decode(&self, id: &str, params: Option<&str>) -> BftxResult<BfTx> {
        let result = async {
            let _guard = self.locks.lock(id).await;
            let tx = self.load(id)?;
            let decoded = self.pipeline.decode(&tx, params)?;
            self.persist(&decoded)?;
            Ok(decoded)
        }
        .await;
        observe("decode", id, result)
    }

    /// Mark the record transmitted, persist, then submit it to the engine.
    ///
    /// The guard runs before any network traffic: an unsigned or already
    /// transmitted record never reaches the gateway.
    pub async fn broadcast(&self, id: &str) -> BftxResult<BroadcastReceipt> {
        let result = async {
            let _guard = self.locks.lock(id).await;
            let mut tx = self.load(id)?;
            check(&tx, Action::Broadcast)?;

            tx.transmitted = true;
            let bytes = record_bytes(&tx)?;
            self.store.put(&tx.id, &bytes)?;

            let receipt = self.gateway.broadcast_sync(&bytes).await.map_err(|err| {
                warn!(
                    id,
                    "broadcast failed after local commit; record stays transmitted"
                );
                BftxError::from(err)
            })?;
            info!(id, hash = %receipt.hash, "transaction broadcast");
            Ok(receipt)
        }
        .await;
        observe("broadcast", id, result)
    }

    /// The stored record.
    pub async fn get(&self, id: &str) -> BftxResult<BfTx> {
        observe("get", id, self.load(id))
    }

    /// The stored bytes, exactly as persisted.
    pub async fn get_raw(&self, id: &str) -> BftxResult<Vec<u8>> {
        observe("get", id, self.store.get(id).map_err(BftxError::from))
    }

    /// The record as indexed by the consensus engine. First match wins.
    pub async fn query(&self, id: &str) -> BftxResult<BfTx> {
        let result = async {
            let query = EqualityQuery::by_id(id)?;
            let hits = self.gateway.search(&query).await?;
            let first = hits
                .into_iter()
                .next()
                .ok_or_else(|| BftxError::NotFound(format!("{id} is not indexed by the engine")))?;
            let tx: BfTx = serde_json::from_slice(&first.tx)?;
            Ok(tx)
        }
        .await;
        observe("query", id, result)
    }

    /// Construct a record that supersedes `old_id` and point the old record
    /// at it. Returns the new id.
    pub async fn append(&self, payload: Value, old_id: &str) -> BftxResult<String> {
        let result = async {
            validate_payload(&payload)?;
            let _old_guard = self.locks.lock(old_id).await;
            let mut parent = match self.load(old_id) {
                Err(BftxError::NotFound(_)) => {
                    return Err(BftxError::InvalidState(format!(
                        "cannot amend {old_id}: no such transaction"
                    )))
                }
                other => other?,
            };
            check(&parent, Action::Amend)?;

            let child = self.identify(BfTx::amending(payload, old_id)).await?;
            if child.id == parent.id {
                return Err(BftxError::InvalidState(
                    "amendment derives the parent's own id".into(),
                ));
            }
            let _new_guard = self.locks.lock(&child.id).await;
            self.refuse_existing(&child.id)?;

            parent.amendment = Some(child.id.clone());
            self.store.put_many(&[
                (child.id.clone(), record_bytes(&child)?),
                (parent.id.clone(), record_bytes(&parent)?),
            ])?;
            info!(id = %child.id, amends = old_id, "amendment appended");
            Ok(child.id)
        }
        .await;
        observe("append", old_id, result)
    }

    /// Number of persisted records.
    pub async fn total(&self) -> BftxResult<usize> {
        observe("total", "-", self.store.count().map_err(BftxError::from))
    }

    pub async fn state(&self, id: &str) -> BftxResult<LifecycleState> {
        observe("state", id, self.load(id).map(|tx| LifecycleState::of(&tx)))
    }

    /// Id of the stored plain record whose `Properties` equal `payload`.
    pub async fn locate(&self, payload: &Value) -> BftxResult<String> {
        let result = (|| -> BftxResult<String> {
            for (id, bytes) in self.store.scan()? {
                let tx = decode_record(&id, &bytes)?;
                if tx.encoding == EncodingState::Plain && &tx.properties == payload {
                    return Ok(id);
                }
            }
            Err(BftxError::NotFound(
                "no stored transaction carries this payload".into(),
            ))
        })();
        observe("locate", "-", result)
    }

    /// Latest height and anchor of the consensus engine.
    pub async fn info(&self) -> BftxResult<EngineInfo> {
        let result = self.gateway.info().await.map_err(BftxError::from);
        observe("info", "-", result)
    }

    /// Point every parent at the child that amends it where the parent's
    /// write never landed. Returns how many parents were repaired.
    pub async fn reconcile_amendments(&self) -> BftxResult<usize> {
        let result = async {
            let children: Vec<(String, String)> = self
                .store
                .scan()?
                .into_iter()
                .map(|(id, bytes)| decode_record(&id, &bytes))
                .collect::<BftxResult<Vec<_>>>()?
                .into_iter()
                .filter_map(|tx| tx.amends.map(|parent| (tx.id, parent)))
                .collect();

            let mut repaired = 0;
            for (child_id, parent_id) in children {
                let _guard = self.locks.lock(&parent_id).await;
                let mut parent = match self.load(&parent_id) {
                    Ok(parent) => parent,
                    Err(BftxError::NotFound(_)) => {
                        warn!(child = %child_id, parent = %parent_id, "amended parent is missing");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                match &parent.amendment {
                    None => {
                        parent.amendment = Some(child_id.clone());
                        self.persist(&parent)?;
                        info!(child = %child_id, parent = %parent_id, "repaired amendment link");
                        repaired += 1;
                    }
                    Some(existing) if *existing != child_id => {
                        warn!(
                            child = %child_id,
                            parent = %parent_id,
                            amendment = %existing,
                            "parent already amended by another transaction"
                        );
                    }
                    Some(_) => {}
                }
            }
            Ok(repaired)
        }
        .await;
        observe("reconcile", "-", result)
    }

    // -- Internals ----------------------------------------------------------

    async fn identify(&self, mut tx: BfTx) -> BftxResult<BfTx> {
        tx.id = self.deriver.derive(&tx).await?;
        Ok(tx)
    }

    fn refuse_existing(&self, id: &str) -> BftxResult<()> {
        if self.store.exists(id)? {
            return Err(BftxError::InvalidState(format!(
                "transaction {id} already exists"
            )));
        }
        Ok(())
    }

    fn load(&self, id: &str) -> BftxResult<BfTx> {
        let bytes = self.store.get(id)?;
        decode_record(id, &bytes)
    }

    fn persist(&self, tx: &BfTx) -> BftxResult<()> {
        let bytes = record_bytes(tx)?;
        self.store.put(&tx.id, &bytes)?;
        Ok(())
    }
}

fn validate_payload(payload: &Value) -> BftxResult<()> {
    match payload {
        Value::Object(map) if !map.is_empty() => Ok(()),
        Value::Object(_) => Err(BftxError::InvalidPayload("payload is an empty object".into())),
        other => Err(BftxError::InvalidPayload(format!(
            "payload must be a JSON object, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode_record(id: &str, bytes: &[u8]) -> BftxResult<BfTx> {
    serde_json::from_slice(bytes).map_err(|e| {
        StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::LocalEngine;
    use crate::crypto::NodeKeypair;
    use crate::error::ErrorKind;
    use crate::storage::BftxDb;
    use serde_json::json;

    // -- Helpers --

    fn service() -> (TransactionService, Arc<LocalEngine>, Arc<BftxDb>) {
        let engine = Arc::new(LocalEngine::new());
        let db = Arc::new(BftxDb::open_temporary().unwrap());
        let svc = TransactionService::new(
            db.clone(),
            engine.clone(),
            SigningService::new(NodeKeypair::from_seed(&[3u8; 32])),
            EncodingPipeline::ephemeral(),
        );
        (svc, engine, db)
    }

    #[tokio::test]
    async fn construct_persists_unsigned_record() {
        let (svc, _, db) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        let tx = svc.get(&id).await.unwrap();
        assert_eq!(tx.id, id);
        assert!(!tx.verified && !tx.transmitted);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn construct_rejects_non_objects() {
        let (svc, engine, _) = service();
        for bad in [json!([1, 2]), json!("cargo"), json!({}), json!(null)] {
            let err = svc.construct(bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        }
        assert_eq!(engine.anchor_calls(), 0);
    }

    #[tokio::test]
    async fn construct_refuses_existing_id() {
        let (svc, engine, _) = service();
        engine.set_anchor(vec![0x01]);
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.sign(&id).await.unwrap();

        let err = svc.construct(json!({"cargo": "steel"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(svc.get(&id).await.unwrap().verified);
    }

    #[tokio::test]
    async fn sign_is_guarded() {
        let (svc, _, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        let signed = svc.sign(&id).await.unwrap();
        assert!(SigningService::verify_recorded(&signed));

        let err = svc.sign(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(svc.get(&id).await.unwrap(), signed);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let (svc, _, _) = service();
        assert_eq!(svc.sign("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(svc.get("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(svc.state("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(svc.query("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn encode_decode_persist_and_alternate() {
        let (svc, _, _) = service();
        let payload = json!({"cargo": "steel", "weight": 1200});
        let id = svc.construct(payload.clone()).await.unwrap();

        svc.encode(&id, None).await.unwrap();
        let stored = svc.get(&id).await.unwrap();
        assert_eq!(stored.encoding, EncodingState::Encoded);
        assert_eq!(svc.state(&id).await.unwrap(), LifecycleState::Encoded);
        assert_eq!(
            svc.encode(&id, None).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        svc.decode(&id, None).await.unwrap();
        assert_eq!(svc.get(&id).await.unwrap().properties, payload);
    }

    #[tokio::test]
    async fn encode_after_sign_is_refused() {
        let (svc, _, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.sign(&id).await.unwrap();
        let before = svc.get_raw(&id).await.unwrap();

        assert_eq!(
            svc.encode(&id, None).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(svc.get_raw(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn broadcast_then_query() {
        let (svc, engine, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.sign(&id).await.unwrap();

        let receipt = svc.broadcast(&id).await.unwrap();
        assert!(!receipt.hash.is_empty());
        assert_eq!(engine.broadcast_calls(), 1);
        assert_eq!(svc.state(&id).await.unwrap(), LifecycleState::Transmitted);

        let indexed = svc.query(&id).await.unwrap();
        assert_eq!(indexed, svc.get(&id).await.unwrap());

        let err = svc.broadcast(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(engine.broadcast_calls(), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_leaves_record_transmitted() {
        let (svc, engine, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.sign(&id).await.unwrap();

        engine.set_offline(true);
        let err = svc.broadcast(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnavailableDependency);
        assert!(svc.get(&id).await.unwrap().transmitted);
    }

    #[tokio::test]
    async fn append_links_both_records() {
        let (svc, _, _) = service();
        let old = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        let new = svc
            .append(json!({"cargo": "steel", "weight": 900}), &old)
            .await
            .unwrap();

        assert_eq!(svc.get(&old).await.unwrap().amendment.as_deref(), Some(new.as_str()));
        assert_eq!(svc.get(&new).await.unwrap().amends.as_deref(), Some(old.as_str()));
        assert_eq!(svc.total().await.unwrap(), 2);

        let err = svc.append(json!({"cargo": "copper"}), &old).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn append_to_missing_parent_is_invalid_state() {
        let (svc, _, _) = service();
        let err = svc.append(json!({"cargo": "steel"}), "ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(svc.total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn locate_finds_plain_payload() {
        let (svc, _, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.construct(json!({"cargo": "grain"})).await.unwrap();

        assert_eq!(svc.locate(&json!({"cargo": "steel"})).await.unwrap(), id);
        assert_eq!(
            svc.locate(&json!({"cargo": "gold"})).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn reconcile_repairs_missing_parent_link() {
        let (svc, _, db) = service();
        let old = svc.construct(json!({"cargo": "steel"})).await.unwrap();

        // A child whose parent write never landed.
        let mut child = BfTx::amending(json!({"cargo": "steel", "v": 2}), &old);
        child.id = "1".repeat(64);
        db.put(&child.id, &record_bytes(&child).unwrap()).unwrap();

        assert_eq!(svc.reconcile_amendments().await.unwrap(), 1);
        assert_eq!(
            svc.get(&old).await.unwrap().amendment.as_deref(),
            Some(child.id.as_str())
        );
        assert_eq!(svc.reconcile_amendments().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn info_reports_engine_height() {
        let (svc, _, _) = service();
        let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
        svc.sign(&id).await.unwrap();
        svc.broadcast(&id).await.unwrap();
        assert_eq!(svc.info().await.unwrap().last_block_height, 1);
    }

    #[tokio::test]
    async fn corrupt_record_is_serialization_failure() {
        let (svc, _, db) = service();
        db.put("broken", b"{not json").unwrap();
        assert_eq!(
            svc.get("broken").await.unwrap_err().kind(),
            ErrorKind::SerializationFailure
        );
    }
}
