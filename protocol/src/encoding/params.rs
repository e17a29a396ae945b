//! Named parameter sets and the node's KEM keyring.
//!
//! Callers name a parameter set (or omit one and get `"default"`). The
//! registry maps names to a Kyber level; the keyring holds one keypair per
//! level so any set can encode and decode.
//!
//! Keyring files live in `<data-dir>/kem/<scheme>.json`:
//!
//! ```json
//! { "scheme": "kyber768", "public": "<hex>", "secret": "<hex>" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::EncodingError;
use crate::config::DEFAULT_PARAMETER_SET;
use crate::crypto::keys::write_secret_file;
use crate::crypto::{KemKeypair, KemScheme};

/// A resolved parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub name: String,
    pub scheme: KemScheme,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    sets: BTreeMap<String, KemScheme>,
}

impl ParameterRegistry {
    /// `"default"` (Kyber-768) plus one set per Kyber level under its own
    /// name.
    pub fn standard() -> Self {
        let mut sets = BTreeMap::new();
        sets.insert(DEFAULT_PARAMETER_SET.to_string(), KemScheme::Kyber768);
        for scheme in KemScheme::ALL {
            sets.insert(scheme.as_str().to_string(), scheme);
        }
        Self { sets }
    }

    /// Add or replace a named set. `"default"` may be repointed but never
    /// removed, so an omitted name always resolves.
    pub fn register(&mut self, name: impl Into<String>, scheme: KemScheme) {
        self.sets.insert(name.into(), scheme);
    }

    pub fn resolve(&self, name: Option<&str>) -> Result<ParameterSet, EncodingError> {
        let name = name.unwrap_or(DEFAULT_PARAMETER_SET);
        self.sets
            .get(name)
            .map(|&scheme| ParameterSet {
                name: name.to_string(),
                scheme,
            })
            .ok_or_else(|| EncodingError::UnknownParameterSet(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Keyring
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct StoredKemKey {
    scheme: KemScheme,
    public: String,
    secret: String,
}

/// One KEM keypair per Kyber level.
#[derive(Debug, Clone, Default)]
pub struct KemKeyring {
    keys: HashMap<KemScheme, KemKeypair>,
}

impl KemKeyring {
    /// Fresh keypairs for every level. Nothing is written to disk.
    pub fn generate() -> Self {
        let keys = KemScheme::ALL
            .into_iter()
            .map(|scheme| (scheme, KemKeypair::generate(scheme)))
            .collect();
        Self { keys }
    }

    /// Load every level's keypair from `dir`, generating and saving any that
    /// are missing.
    pub fn load_or_generate(dir: &Path) -> Result<Self, EncodingError> {
        std::fs::create_dir_all(dir)?;
        let mut keys = HashMap::new();
        for scheme in KemScheme::ALL {
            let path = dir.join(format!("{scheme}.json"));
            let keypair = if path.exists() {
                read_key(&path, scheme)?
            } else {
                let keypair = KemKeypair::generate(scheme);
                write_key(&path, &keypair)?;
                info!(path = %path.display(), %scheme, "generated KEM keypair");
                keypair
            };
            keys.insert(scheme, keypair);
        }
        Ok(Self { keys })
    }

    /// Write every keypair to `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), EncodingError> {
        std::fs::create_dir_all(dir)?;
        for (scheme, keypair) in &self.keys {
            write_key(&dir.join(format!("{scheme}.json")), keypair)?;
        }
        Ok(())
    }

    pub fn get(&self, scheme: KemScheme) -> Result<&KemKeypair, EncodingError> {
        self.keys.get(&scheme).ok_or(EncodingError::MissingKey(scheme))
    }

    pub fn insert(&mut self, keypair: KemKeypair) {
        self.keys.insert(keypair.scheme(), keypair);
    }
}

fn read_key(path: &Path, expected: KemScheme) -> Result<KemKeypair, EncodingError> {
    let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

    let raw = std::fs::read(path)?;
    let stored: StoredKemKey = serde_json::from_slice(&raw)
        .map_err(|e| invalid(format!("{}: {e}", path.display())))?;
    if stored.scheme != expected {
        return Err(invalid(format!(
            "{}: holds a {} key, expected {expected}",
            path.display(),
            stored.scheme
        ))
        .into());
    }
    let public = hex::decode(&stored.public).map_err(|e| invalid(e.to_string()))?;
    let secret = hex::decode(&stored.secret).map_err(|e| invalid(e.to_string()))?;
    Ok(KemKeypair::from_parts(expected, public, secret)?)
}

fn write_key(path: &Path, keypair: &KemKeypair) -> Result<(), EncodingError> {
    let stored = StoredKemKey {
        scheme: keypair.scheme(),
        public: hex::encode(keypair.public_bytes()),
        secret: hex::encode(keypair.secret_bytes()),
    };
    let bytes = serde_json::to_vec_pretty(&stored)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    write_secret_file(path, &bytes)?;
    Ok(())
}
