//! Anchor-salted transaction identifiers.
//!
//! ```text
//! id = hex( SHA-256( SHA-256(identity_bytes) || anchor ) )
//! ```
//!
//! `anchor` is the consensus engine's latest committed application hash.
//! The same payload constructed at two ledger heights gets two ids, which
//! is the point: identical freight submitted twice is two shipments, not a
//! silent collision. The price is that ids are not reproducible offline.

use std::sync::Arc;

use tracing::debug;

use super::canonical::identity_bytes;
use super::types::BfTx;
use crate::consensus::ConsensusGateway;
use crate::crypto::{sha256, sha256_multi};
use crate::error::BftxResult;

/// Pure derivation from content bytes and an anchor. Deterministic.
pub fn derive_with_anchor(content: &[u8], anchor: &[u8]) -> String {
    let content_hash = sha256(content);
    hex::encode(sha256_multi(&[content_hash.as_slice(), anchor]))
}

/// Derives identifiers against the live anchor of a consensus engine.
#[derive(Clone)]
pub struct IdentityDeriver {
    gateway: Arc<dyn ConsensusGateway>,
}

impl IdentityDeriver {
    pub fn new(gateway: Arc<dyn ConsensusGateway>) -> Self {
        Self { gateway }
    }

    /// Compute the id `tx` would receive right now.
    ///
    /// Fails `SerializationFailure` if the record cannot be serialized
    /// canonically and `UnavailableDependency` if the anchor is unreachable.
    /// Serialization runs first so a malformed record never costs a round
    /// trip.
    pub async fn derive(&self, tx: &BfTx) -> BftxResult<String> {
        let content = identity_bytes(tx)?;
        let anchor = self.gateway.anchor().await?;
        let id = derive_with_anchor(&content, &anchor);
        debug!(id = %id, anchor = %hex::encode(&anchor), "derived transaction id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ID_HEX_LENGTH;
    use crate::consensus::LocalEngine;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn different_anchors_different_ids() {
        let content = br#"{"Properties":{"cargo":"steel"}}"#;
        let a = derive_with_anchor(content, &[0xAA]);
        let b = derive_with_anchor(content, &[0xBB]);
        assert_ne!(a, b);
        assert_eq!(a, derive_with_anchor(content, &[0xAA]));
        assert_eq!(a.len(), ID_HEX_LENGTH);
    }

    #[test]
    fn empty_anchor_is_accepted() {
        // A fresh engine reports an empty app hash; derivation must still work.
        let id = derive_with_anchor(b"{}", &[]);
        assert_eq!(id, hex::encode(sha256(&sha256(b"{}"))));
    }

    #[tokio::test]
    async fn derive_uses_live_anchor() {
        let engine = Arc::new(LocalEngine::new());
        let deriver = IdentityDeriver::new(engine.clone());
        let tx = BfTx::new(json!({"cargo": "steel"}));

        engine.set_anchor(vec![0xAA]);
        let first = deriver.derive(&tx).await.unwrap();
        assert_eq!(first, deriver.derive(&tx).await.unwrap());

        engine.set_anchor(vec![0xBB]);
        assert_ne!(first, deriver.derive(&tx).await.unwrap());
    }

    #[tokio::test]
    async fn offline_engine_is_unavailable() {
        let engine = Arc::new(LocalEngine::new());
        engine.set_offline(true);
        let deriver = IdentityDeriver::new(engine);
        let err = deriver
            .derive(&BfTx::new(json!({"cargo": "steel"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnavailableDependency);
    }
}
