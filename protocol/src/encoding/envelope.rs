//! Plain and sealed payload envelopes.
//!
//! The encoding primitive works on bytes, records carry JSON. These two
//! envelopes are the schemas on either side of that boundary:
//!
//! - [`PlainEnvelope`]: the record id and the canonical bytes of its
//!   `Properties`. This is what gets sealed.
//! - [`SealedEnvelope`]: what `Properties` holds while the record is
//!   encoded. Scheme, KEM encapsulation, GCM nonce and ciphertext.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EncodingError;
use crate::config::SEAL_KDF_CONTEXT;
use crate::crypto::encryption::{decrypt_with_aad, encrypt_with_aad, nonce_from_slice};
use crate::crypto::{derive_key, KemKeypair, KemScheme};
use crate::transaction::canonical::to_canonical_bytes;
use crate::transaction::BfTx;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainEnvelope {
    pub id: String,
    pub content: Vec<u8>,
}

impl PlainEnvelope {
    pub fn from_record(tx: &BfTx) -> Result<Self, EncodingError> {
        let content = to_canonical_bytes(&tx.properties)
            .map_err(|e| EncodingError::Conversion(format!("payload is not serializable: {e}")))?;
        Ok(Self {
            id: tx.id.clone(),
            content,
        })
    }

    /// Parse the content back into a `Properties` value.
    pub fn into_properties(self) -> Result<Value, EncodingError> {
        serde_json::from_slice(&self.content)
            .map_err(|e| EncodingError::Conversion(format!("decoded payload is not JSON: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SealedEnvelope {
    pub scheme: KemScheme,
    /// Hex KEM ciphertext.
    pub encapsulation: String,
    /// Hex AES-GCM nonce.
    pub nonce: String,
    /// Hex AES-GCM ciphertext and tag.
    pub sealed: String,
}

impl SealedEnvelope {
    pub fn from_properties(properties: &Value) -> Result<Self, EncodingError> {
        serde_json::from_value(properties.clone()).map_err(|e| {
            EncodingError::Conversion(format!("payload is not a sealed envelope: {e}"))
        })
    }

    pub fn to_properties(&self) -> Result<Value, EncodingError> {
        serde_json::to_value(self)
            .map_err(|e| EncodingError::Conversion(format!("cannot write sealed envelope: {e}")))
    }

    fn decode_field(&self, name: &str, value: &str) -> Result<Vec<u8>, EncodingError> {
        hex::decode(value)
            .map_err(|e| EncodingError::Conversion(format!("sealed envelope {name} is not hex: {e}")))
    }
}

/// Encapsulate to `key`, stretch the shared secret into an AES key and seal
/// the content with the id as associated data.
pub fn seal(plain: &PlainEnvelope, key: &KemKeypair) -> Result<SealedEnvelope, EncodingError> {
    let (shared, encapsulation) = key.encapsulate()?;
    let aes_key = derive_key(SEAL_KDF_CONTEXT, &shared);
    let (nonce, sealed) = encrypt_with_aad(&aes_key, &plain.content, plain.id.as_bytes())?;
    Ok(SealedEnvelope {
        scheme: key.scheme(),
        encapsulation: hex::encode(encapsulation),
        nonce: hex::encode(nonce),
        sealed: hex::encode(sealed),
    })
}

/// Reverse [`seal`]. `id` must be the id the envelope was sealed under.
pub fn open(sealed: &SealedEnvelope, id: &str, key: &KemKeypair) -> Result<PlainEnvelope, EncodingError> {
    if sealed.scheme != key.scheme() {
        return Err(EncodingError::Primitive(format!(
            "envelope sealed with {}, decoding with {}",
            sealed.scheme,
            key.scheme()
        )));
    }
    let encapsulation = sealed.decode_field("Encapsulation", &sealed.encapsulation)?;
    let nonce = nonce_from_slice(&sealed.decode_field("Nonce", &sealed.nonce)?)?;
    let ciphertext = sealed.decode_field("Sealed", &sealed.sealed)?;

    let shared = key.decapsulate(&encapsulation)?;
    let aes_key = derive_key(SEAL_KDF_CONTEXT, &shared);
    let content = decrypt_with_aad(&aes_key, &nonce, &ciphertext, id.as_bytes())?;
    Ok(PlainEnvelope {
        id: id.to_string(),
        content,
    })
}
