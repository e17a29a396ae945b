//! The BF_TX record and its small value types.
//!
//! Field names on the wire are PascalCase (`Id`, `Properties`, `Verified`,
//! ...) because that is what the consensus indexer and the existing query
//! tooling already expect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record type tag carried by every transaction this core produces.
pub const BFTX_TYPE: &str = "BF_TX";

// ---------------------------------------------------------------------------
// EncodingState
// ---------------------------------------------------------------------------

/// Which representation `Properties` currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncodingState {
    /// `Properties` is the caller's freight payload as submitted.
    #[default]
    Plain,
    /// `Properties` is a sealed envelope produced by the encoding pipeline.
    Encoded,
}

impl fmt::Display for EncodingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "Plain"),
            Self::Encoded => write!(f, "Encoded"),
        }
    }
}

// ---------------------------------------------------------------------------
// BfTx
// ---------------------------------------------------------------------------

/// A freight ledger transaction.
///
/// Mutable fields only move forward:
///
/// - `id` is assigned once at construction and never changes.
/// - `verified` goes `false -> true` once, through signing.
/// - `transmitted` goes `false -> true` once, through broadcast, and only
///   after `verified`.
/// - `amendment` is set at most once, through append.
/// - `encoding` toggles only while `verified` is `false`.
///
/// None of that is enforced by this struct on its own; the lifecycle guards
/// in [`super::lifecycle`] and the service are what hold the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BfTx {
    /// Anchor-salted content identifier. Empty until construction assigns it.
    #[serde(default)]
    pub id: String,

    /// Record type tag, always [`BFTX_TYPE`] for records built here.
    #[serde(default = "default_type")]
    pub r#type: String,

    /// Opaque freight payload, or the sealed envelope while encoded.
    pub properties: serde_json::Value,

    #[serde(default)]
    pub verified: bool,

    #[serde(default)]
    pub transmitted: bool,

    /// Id of the transaction that supersedes this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amendment: Option<String>,

    /// Id of the transaction this one supersedes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amends: Option<String>,

    #[serde(default)]
    pub encoding: EncodingState,

    /// Hex Ed25519 signature over the signable content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Hex public key of the node that produced `signature`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
}

fn default_type() -> String {
    BFTX_TYPE.to_string()
}

impl BfTx {
    /// A fresh, unidentified record wrapping `properties`.
    pub fn new(properties: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            r#type: default_type(),
            properties,
            verified: false,
            transmitted: false,
            amendment: None,
            amends: None,
            encoding: EncodingState::Plain,
            signature: None,
            signer: None,
        }
    }

    /// A fresh record that declares itself the successor of `parent_id`.
    pub fn amending(properties: serde_json::Value, parent_id: &str) -> Self {
        Self {
            amends: Some(parent_id.to_string()),
            ..Self::new(properties)
        }
    }

    pub fn is_encoded(&self) -> bool {
        self.encoding == EncodingState::Encoded
    }
}
