//! # Node Signing Keys
//!
//! The node holds exactly one Ed25519 keypair. Its signature over a record's
//! signable bytes is what flips `Verified` from `false` to `true`, so the key
//! file is the one piece of node state that must survive a reinstall.
//!
//! ## Security considerations
//!
//! - Secret key bytes are never logged, never printed by `Debug`, and never
//!   serialized implicitly. Persisting them is an explicit [`NodeKeypair::save`].
//! - Generation uses `OsRng`.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{SIGNATURE_LENGTH, SIGNING_KEY_LENGTH};

/// Errors from key parsing and key-file handling. Messages say what kind of
/// input was wrong, never what the input was.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected {SIGNING_KEY_LENGTH} bytes of hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected {SIGNATURE_LENGTH} bytes of hex")]
    InvalidSignature,

    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The node's Ed25519 identity.
///
/// Deliberately not `Serialize`: writing a secret key to disk happens through
/// [`save`](Self::save) and nowhere else.
///
/// # Examples
///
/// ```
/// use bftx_protocol::crypto::NodeKeypair;
///
/// let kp = NodeKeypair::generate();
/// let sig = kp.sign(b"bill of lading 77-A");
/// assert!(kp.public_key().verify(b"bill of lading 77-A", &sig));
/// ```
pub struct NodeKeypair {
    signing_key: SigningKey,
}

/// Public half of the node identity. Recorded on every signed BF_TX as
/// `Signer` so anyone can check the signature later.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature over a record's signable bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    bytes: Vec<u8>,
}

impl NodeKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Tests and fixtures only
    /// want this; a production node generates.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    /// Load the key stored at `path`, or generate one and write it there.
    pub fn load_or_generate(path: &Path) -> Result<Self, KeyError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            return Self::from_hex(contents.trim());
        }
        let kp = Self::generate();
        kp.save(path)?;
        info!(path = %path.display(), signer = %kp.public_key(), "generated node signing key");
        Ok(kp)
    }

    /// Write the secret key as hex to `path`, creating parent directories.
    /// Owner-only permissions on Unix.
    pub fn save(&self, path: &Path) -> Result<(), KeyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_secret_file(path, hex::encode(self.signing_key.to_bytes()).as_bytes())?;
        Ok(())
    }

    pub fn public_key(&self) -> NodePublicKey {
        NodePublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Deterministic: same key and message, same signature.
    pub fn sign(&self, message: &[u8]) -> TxSignature {
        TxSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }
}

impl Clone for NodeKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for NodeKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKeypair(pub={})", self.public_key().to_hex())
    }
}

/// Write secret key material to `path`. On Unix the file is created 0600,
/// and an existing file is narrowed to 0600 before it is truncated.
pub(crate) fn write_secret_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.set_len(0)?;
    file.write_all(contents)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// NodePublicKey
// ---------------------------------------------------------------------------

impl NodePublicKey {
    /// Parse and validate a hex public key. Rejects bytes that are not a
    /// valid curve point.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// `true` iff `signature` is a valid signature over `message` by this key.
    pub fn verify(&self, message: &[u8], signature: &TxSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl fmt::Display for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// TxSignature
// ---------------------------------------------------------------------------

impl TxSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "TxSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "TxSignature({})", hex_str)
        }
    }
}
