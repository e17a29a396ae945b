//! # Encoding Pipeline
//!
//! Reversible post-quantum re-encoding of a record's payload.
//!
//! ```text
//! encode:  Properties ─(a)─► PlainEnvelope ─(b)─► seal ─(c)─► SealedEnvelope ─(d)─► Properties
//! decode:  Properties ─(a)─► SealedEnvelope ─(b)─► open ─(c)─► PlainEnvelope ─(d)─► Properties
//! ```
//!
//! (a) and (c) are schema adaptation and fail [`EncodingError::Conversion`];
//! (b) is the KEM + AEAD primitive and fails with the primitive's own
//! error. Only unsigned records may be encoded or decoded, and the two must
//! alternate, so `decode(encode(tx)) == tx` holds on every payload field.
//! Persisting the result is the service's job.

pub mod envelope;
pub mod params;

pub use envelope::{PlainEnvelope, SealedEnvelope};
pub use params::{KemKeyring, ParameterRegistry, ParameterSet};

use thiserror::Error;
use tracing::debug;

use crate::crypto::{EncryptionError, KemError, KemScheme};
use crate::error::BftxResult;
use crate::transaction::lifecycle::{check, Action};
use crate::transaction::{BfTx, EncodingState};

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("unknown parameter set: {0}")]
    UnknownParameterSet(String),

    #[error("no {0} keypair in the node keyring")]
    MissingKey(KemScheme),

    #[error("schema conversion failed: {0}")]
    Conversion(String),

    #[error("encoding primitive rejected input: {0}")]
    Primitive(String),

    #[error("key encapsulation failed: {0}")]
    Kem(#[from] KemError),

    #[error("payload sealing failed: {0}")]
    Seal(#[from] EncryptionError),

    #[error("keyring I/O failed: {0}")]
    Keyring(#[from] std::io::Error),
}

/// Parameter registry plus keyring. Stateless between calls.
#[derive(Debug, Clone)]
pub struct EncodingPipeline {
    registry: ParameterRegistry,
    keyring: KemKeyring,
}

impl EncodingPipeline {
    pub fn new(registry: ParameterRegistry, keyring: KemKeyring) -> Self {
        Self { registry, keyring }
    }

    /// Standard registry with freshly generated, unpersisted keys.
    pub fn ephemeral() -> Self {
        Self::new(ParameterRegistry::standard(), KemKeyring::generate())
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// A copy of `tx` with `Properties` sealed under `params` (or the
    /// default set).
    pub fn encode(&self, tx: &BfTx, params: Option<&str>) -> BftxResult<BfTx> {
        check(tx, Action::Encode)?;
        let set = self.registry.resolve(params)?;
        let key = self.keyring.get(set.scheme)?;

        let plain = PlainEnvelope::from_record(tx)?;
        let sealed = envelope::seal(&plain, key)?;

        let mut encoded = tx.clone();
        encoded.properties = sealed.to_properties()?;
        encoded.encoding = EncodingState::Encoded;
        debug!(id = %tx.id, params = %set.name, scheme = %set.scheme, "payload encoded");
        Ok(encoded)
    }

    /// A copy of `tx` with its sealed `Properties` opened.
    pub fn decode(&self, tx: &BfTx, params: Option<&str>) -> BftxResult<BfTx> {
        check(tx, Action::Decode)?;
        let set = self.registry.resolve(params)?;
        let key = self.keyring.get(set.scheme)?;

        let sealed = SealedEnvelope::from_properties(&tx.properties)?;
        let plain = envelope::open(&sealed, &tx.id, key)?;

        let mut decoded = tx.clone();
        decoded.properties = plain.into_properties()?;
        decoded.encoding = EncodingState::Plain;
        debug!(id = %tx.id, params = %set.name, scheme = %set.scheme, "payload decoded");
        Ok(decoded)
    }
}
