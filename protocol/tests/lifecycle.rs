//! End-to-end lifecycle tests.
//!
//! Each test wires a real sled store (temporary) and the in-process
//! consensus engine into a `TransactionService`, then drives records
//! through construct, sign, encode, broadcast, query and append exactly as
//! a caller would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use bftx_protocol::crypto::NodeKeypair;
use bftx_protocol::storage::{StoreError, StoreResult};
use bftx_protocol::{
    BftxDb, EncodingPipeline, ErrorKind, LifecycleState, LocalEngine, SigningService,
    TransactionService, TxStore,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn service_over(store: Arc<dyn TxStore>, engine: Arc<LocalEngine>) -> TransactionService {
    TransactionService::new(
        store,
        engine,
        SigningService::new(NodeKeypair::generate()),
        EncodingPipeline::ephemeral(),
    )
}

fn setup() -> (Arc<TransactionService>, Arc<LocalEngine>) {
    let engine = Arc::new(LocalEngine::new());
    let db = Arc::new(BftxDb::open_temporary().expect("temp db"));
    (Arc::new(service_over(db, engine.clone())), engine)
}

/// Store that refuses every write after the first `allowed` succeed, as if
/// the process died mid-operation. Uses the one-at-a-time `put_many`.
struct CrashingStore {
    inner: BftxDb,
    allowed: usize,
    writes: AtomicUsize,
}

impl CrashingStore {
    fn new(allowed: usize) -> Self {
        Self {
            inner: BftxDb::open_temporary().expect("temp db"),
            allowed,
            writes: AtomicUsize::new(0),
        }
    }

    fn heal(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }
}

impl TxStore for CrashingStore {
    fn put(&self, id: &str, bytes: &[u8]) -> StoreResult<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(StoreError::Unavailable("simulated crash".into()));
        }
        self.inner.put(id, bytes)
    }

    fn get(&self, id: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(id)
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        self.inner.exists(id)
    }

    fn count(&self) -> StoreResult<usize> {
        self.inner.count()
    }

    fn scan(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.inner.scan()
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_payload_at_different_anchors_gets_different_ids() {
    let (svc, engine) = setup();

    engine.set_anchor(vec![0xAA]);
    let first = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    engine.set_anchor(vec![0xBB]);
    let second = svc.construct(json!({"cargo": "steel"})).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(first.len(), 64);
    assert_eq!(svc.total().await.unwrap(), 2);
}

#[tokio::test]
async fn offline_engine_blocks_construct_without_writing() {
    let (svc, engine) = setup();
    engine.set_offline(true);

    let err = svc.construct(json!({"cargo": "steel"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnavailableDependency);
    assert_eq!(svc.total().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_sign_is_refused_and_record_stays_signed() {
    let (svc, _) = setup();
    let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();

    let signed = svc.sign(&id).await.unwrap();
    assert!(signed.verified);
    assert!(SigningService::verify_recorded(&signed));

    let err = svc.sign(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(svc.get(&id).await.unwrap().verified);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signs_succeed_exactly_once() {
    let (svc, _) = setup();
    let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tokio::spawn(async move { svc.sign(&id).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidState),
        }
    }
    assert_eq!(succeeded, 1);
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encode_then_decode_restores_payload() {
    let (svc, _) = setup();
    let payload = json!({
        "Shipper": {"Name": "ACME Freight", "Port": "Santos"},
        "Consignee": "Port of Rotterdam",
        "Containers": [{"No": "MSCU1234567", "Weight": 21.5}]
    });
    let id = svc.construct(payload.clone()).await.unwrap();

    for params in [None, Some("kyber512"), Some("kyber1024")] {
        let encoded = svc.encode(&id, params).await.unwrap();
        assert_ne!(encoded.properties, payload);
        let decoded = svc.decode(&id, params).await.unwrap();
        assert_eq!(decoded.properties, payload);
    }
    assert_eq!(svc.state(&id).await.unwrap(), LifecycleState::Constructed);
}

#[tokio::test]
async fn encoded_record_can_be_signed_and_broadcast() {
    let (svc, engine) = setup();
    let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    svc.encode(&id, None).await.unwrap();
    svc.sign(&id).await.unwrap();
    svc.broadcast(&id).await.unwrap();

    assert_eq!(engine.broadcast_calls(), 1);
    let indexed = svc.query(&id).await.unwrap();
    assert!(indexed.is_encoded());
    assert!(indexed.transmitted);
}

// ---------------------------------------------------------------------------
// Broadcast & query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsigned_broadcast_never_reaches_engine() {
    let (svc, engine) = setup();
    let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();

    let err = svc.broadcast(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(engine.broadcast_calls(), 0);
    assert!(!svc.get(&id).await.unwrap().transmitted);
}

#[tokio::test]
async fn broadcast_is_at_most_once() {
    let (svc, engine) = setup();
    let id = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    svc.sign(&id).await.unwrap();

    svc.broadcast(&id).await.unwrap();
    let err = svc.broadcast(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(engine.broadcast_calls(), 1);
}

#[tokio::test]
async fn query_returns_what_was_broadcast() {
    let (svc, engine) = setup();
    let id = svc.construct(json!({"cargo": "grain", "tons": 40})).await.unwrap();
    svc.sign(&id).await.unwrap();

    assert_eq!(svc.query(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
    svc.broadcast(&id).await.unwrap();

    let indexed = svc.query(&id).await.unwrap();
    assert_eq!(indexed, svc.get(&id).await.unwrap());
    assert_eq!(engine.height(), 1);
}

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_links_parent_to_amendment() {
    let (svc, _) = setup();
    let old = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    let new = svc
        .append(json!({"cargo": "steel", "tons": 12}), &old)
        .await
        .unwrap();

    assert_eq!(svc.get(&old).await.unwrap().amendment, Some(new.clone()));
    assert_eq!(svc.get(&new).await.unwrap().amends, Some(old));
}

#[tokio::test]
async fn crash_between_append_writes_leaves_parent_unlinked() {
    let store = Arc::new(CrashingStore::new(1));
    let engine = Arc::new(LocalEngine::new());
    let svc = service_over(store.clone(), engine);

    let old = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    store.heal();
    // First write of the append (the child) lands, the parent's does not.
    let err = svc
        .append(json!({"cargo": "steel", "tons": 12}), &old)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnavailableDependency);

    let records = store.scan().unwrap();
    assert_eq!(records.len(), 2);
    let child = records
        .iter()
        .map(|(_, bytes)| serde_json::from_slice::<bftx_protocol::BfTx>(bytes).unwrap())
        .find(|tx| tx.amends.as_deref() == Some(old.as_str()))
        .expect("child persisted");
    assert_eq!(svc.get(&old).await.unwrap().amendment, None);

    store.heal();
    assert_eq!(svc.reconcile_amendments().await.unwrap(), 1);
    assert_eq!(svc.get(&old).await.unwrap().amendment, Some(child.id));
}

#[tokio::test]
async fn sled_append_is_atomic() {
    let (svc, _) = setup();
    let old = svc.construct(json!({"cargo": "steel"})).await.unwrap();
    svc.append(json!({"cargo": "copper"}), &old).await.unwrap();
    assert_eq!(svc.reconcile_amendments().await.unwrap(), 0);
}
