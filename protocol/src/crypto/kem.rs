//! # Post-Quantum Key Encapsulation
//!
//! Thin wrapper over the CRYSTALS-Kyber implementations in `pqcrypto-kyber`.
//! The encoding pipeline only ever needs three things from a KEM: make a
//! keypair, encapsulate to a public key, decapsulate with the secret key.
//! Everything else (which set, where keys live) is decided one layer up in
//! [`crate::encoding::params`].
//!
//! Kyber decapsulation never fails outright. A ciphertext aimed at a
//! different key decapsulates to an unrelated secret, and the AEAD layer on
//! top is what notices.

use pqcrypto_kyber::{kyber1024, kyber512, kyber768};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KemError {
    #[error("{scheme} {part} has the wrong length")]
    InvalidLength {
        scheme: KemScheme,
        part: &'static str,
    },

    #[error("unknown KEM scheme: {0}")]
    UnknownScheme(String),
}

/// Kyber security level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KemScheme {
    Kyber512,
    Kyber768,
    Kyber1024,
}

impl KemScheme {
    pub const ALL: [KemScheme; 3] = [
        KemScheme::Kyber512,
        KemScheme::Kyber768,
        KemScheme::Kyber1024,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KemScheme::Kyber512 => "kyber512",
            KemScheme::Kyber768 => "kyber768",
            KemScheme::Kyber1024 => "kyber1024",
        }
    }

    pub fn ciphertext_len(self) -> usize {
        match self {
            KemScheme::Kyber512 => kyber512::ciphertext_bytes(),
            KemScheme::Kyber768 => kyber768::ciphertext_bytes(),
            KemScheme::Kyber1024 => kyber1024::ciphertext_bytes(),
        }
    }
}

impl fmt::Display for KemScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KemScheme {
    type Err = KemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KemScheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| KemError::UnknownScheme(s.to_string()))
    }
}

/// A KEM keypair held as raw bytes, tagged with its scheme.
///
/// Bytes are validated against the scheme's sizes on construction, so the
/// encapsulate/decapsulate paths never see a malformed key.
#[derive(Clone)]
pub struct KemKeypair {
    scheme: KemScheme,
    public: Vec<u8>,
    secret: Vec<u8>,
}

/// Expands to one arm per Kyber level, binding `$m` to that level's module.
macro_rules! per_scheme {
    ($scheme:expr, $m:ident => $body:expr) => {
        match $scheme {
            KemScheme::Kyber512 => {
                use pqcrypto_kyber::kyber512 as $m;
                $body
            }
            KemScheme::Kyber768 => {
                use pqcrypto_kyber::kyber768 as $m;
                $body
            }
            KemScheme::Kyber1024 => {
                use pqcrypto_kyber::kyber1024 as $m;
                $body
            }
        }
    };
}

impl KemKeypair {
    pub fn generate(scheme: KemScheme) -> Self {
        let (public, secret) = per_scheme!(scheme, m => {
            let (pk, sk) = m::keypair();
            (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
        });
        Self {
            scheme,
            public,
            secret,
        }
    }

    /// Rebuild a keypair from stored bytes.
    pub fn from_parts(scheme: KemScheme, public: Vec<u8>, secret: Vec<u8>) -> Result<Self, KemError> {
        per_scheme!(scheme, m => {
            m::PublicKey::from_bytes(&public).map_err(|_| KemError::InvalidLength {
                scheme,
                part: "public key",
            })?;
            m::SecretKey::from_bytes(&secret).map_err(|_| KemError::InvalidLength {
                scheme,
                part: "secret key",
            })?;
        });
        Ok(Self {
            scheme,
            public,
            secret,
        })
    }

    pub fn scheme(&self) -> KemScheme {
        self.scheme
    }

    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }

    /// Encapsulate to this keypair's public key. Returns
    /// `(shared_secret, ciphertext)`.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, Vec<u8>), KemError> {
        let scheme = self.scheme;
        per_scheme!(scheme, m => {
            let pk = m::PublicKey::from_bytes(&self.public).map_err(|_| KemError::InvalidLength {
                scheme,
                part: "public key",
            })?;
            let (ss, ct) = m::encapsulate(&pk);
            Ok((ss.as_bytes().to_vec(), ct.as_bytes().to_vec()))
        })
    }

    /// Recover the shared secret from `ciphertext`.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KemError> {
        let scheme = self.scheme;
        per_scheme!(scheme, m => {
            let ct = m::Ciphertext::from_bytes(ciphertext).map_err(|_| KemError::InvalidLength {
                scheme,
                part: "ciphertext",
            })?;
            let sk = m::SecretKey::from_bytes(&self.secret).map_err(|_| KemError::InvalidLength {
                scheme,
                part: "secret key",
            })?;
            Ok(m::decapsulate(&ct, &sk).as_bytes().to_vec())
        })
    }
}

impl fmt::Debug for KemKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KemKeypair({}, pub={}..)",
            self.scheme,
            hex::encode(&self.public[..8.min(self.public.len())])
        )
    }
}
