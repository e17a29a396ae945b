//! Node signing of BF_TX records.
//!
//! The signature covers [`signable_bytes`]: the identifier, the type tag,
//! the payload in whatever encoding it currently holds, and the amendment
//! back-reference. Flags that move after signing (`Transmitted`,
//! `Amendment`) are deliberately outside it.

use thiserror::Error;

use super::canonical::signable_bytes;
use super::types::BfTx;
use crate::crypto::{NodeKeypair, NodePublicKey, TxSignature};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("transaction already signed")]
    AlreadySigned,

    #[error("cannot serialize signable content: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Signs and verifies records with the node's Ed25519 identity.
#[derive(Debug, Clone)]
pub struct SigningService {
    keypair: NodeKeypair,
}

impl SigningService {
    pub fn new(keypair: NodeKeypair) -> Self {
        Self { keypair }
    }

    pub fn public_key(&self) -> NodePublicKey {
        self.keypair.public_key()
    }

    /// Return a signed copy of `tx`.
    ///
    /// Fails [`SigningError::AlreadySigned`] if `tx.verified` is already set;
    /// the input is never touched either way.
    pub fn sign(&self, tx: &BfTx) -> Result<BfTx, SigningError> {
        if tx.verified {
            return Err(SigningError::AlreadySigned);
        }
        let signature = self.keypair.sign(&signable_bytes(tx)?);

        let mut signed = tx.clone();
        signed.verified = true;
        signed.signature = Some(signature.to_hex());
        signed.signer = Some(self.keypair.public_key().to_hex());
        Ok(signed)
    }

    /// Check `signature` against `tx` under this node's key.
    pub fn verify(&self, tx: &BfTx, signature: &TxSignature) -> bool {
        Self::verify_with_key(&self.keypair.public_key(), tx, signature)
    }

    /// Check `signature` against `tx` under an arbitrary key.
    pub fn verify_with_key(key: &NodePublicKey, tx: &BfTx, signature: &TxSignature) -> bool {
        match signable_bytes(tx) {
            Ok(message) => key.verify(&message, signature),
            Err(_) => false,
        }
    }

    /// Check the signature and signer recorded on `tx` itself. `false` for an
    /// unsigned record or one whose recorded fields do not parse.
    pub fn verify_recorded(tx: &BfTx) -> bool {
        let (Some(sig_hex), Some(signer_hex)) = (&tx.signature, &tx.signer) else {
            return false;
        };
        let (Ok(signature), Ok(key)) = (
            TxSignature::from_hex(sig_hex),
            NodePublicKey::from_hex(signer_hex),
        ) else {
            return false;
        };
        Self::verify_with_key(&key, tx, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> SigningService {
        SigningService::new(NodeKeypair::from_seed(&[9u8; 32]))
    }

    fn constructed() -> BfTx {
        let mut tx = BfTx::new(json!({"cargo": "steel", "containers": 4}));
        tx.id = "a".repeat(64);
        tx
    }

    #[test]
    fn sign_sets_verified_and_signature() {
        let signed = service().sign(&constructed()).unwrap();
        assert!(signed.verified);
        assert_eq!(signed.signature.as_ref().map(|s| s.len()), Some(128));
        assert_eq!(signed.signer, Some(service().public_key().to_hex()));
        assert!(SigningService::verify_recorded(&signed));
    }

    #[test]
    fn second_sign_is_refused() {
        let svc = service();
        let signed = svc.sign(&constructed()).unwrap();
        let err = svc.sign(&signed).unwrap_err();
        assert!(matches!(err, SigningError::AlreadySigned));
    }

    #[test]
    fn signing_is_deterministic() {
        let svc = service();
        assert_eq!(
            svc.sign(&constructed()).unwrap().signature,
            svc.sign(&constructed()).unwrap().signature
        );
    }

    #[test]
    fn verify_does_not_mutate_and_detects_tampering() {
        let svc = service();
        let signed = svc.sign(&constructed()).unwrap();
        let sig = TxSignature::from_hex(signed.signature.as_deref().unwrap()).unwrap();

        let snapshot = signed.clone();
        assert!(svc.verify(&signed, &sig));
        assert_eq!(signed, snapshot);

        let mut tampered = signed.clone();
        tampered.properties = json!({"cargo": "gold"});
        assert!(!svc.verify(&tampered, &sig));
        assert!(!SigningService::verify_recorded(&tampered));
    }

    #[test]
    fn transmission_does_not_invalidate_signature() {
        let mut signed = service().sign(&constructed()).unwrap();
        signed.transmitted = true;
        signed.amendment = Some("b".repeat(64));
        assert!(SigningService::verify_recorded(&signed));
    }

    #[test]
    fn other_key_rejects() {
        let signed = service().sign(&constructed()).unwrap();
        let sig = TxSignature::from_hex(signed.signature.as_deref().unwrap()).unwrap();
        let other = NodeKeypair::generate().public_key();
        assert!(!SigningService::verify_with_key(&other, &signed, &sig));
    }

    #[test]
    fn unsigned_record_does_not_verify() {
        assert!(!SigningService::verify_recorded(&constructed()));
    }
}
