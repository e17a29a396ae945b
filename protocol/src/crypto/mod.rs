//! # Cryptographic Primitives for BF_TX
//!
//! Every identifier, signature and sealed payload in the ledger core flows
//! through here. The choices are boring on purpose:
//!
//! - **SHA-256** for identifiers, because the consensus indexer and every
//!   external tool already speak it.
//! - **Ed25519** for the node signature that marks a record verified.
//! - **Kyber** (512/768/1024) as the post-quantum KEM behind payload encoding.
//! - **AES-256-GCM** to seal the payload under the KEM-derived key.
//! - **BLAKE3** `derive_key` to turn a KEM secret into an AES key.
//!
//! None of it is home-grown. These are type-safe wrappers around audited
//! implementations, and they should stay that thin.

pub mod encryption;
pub mod hash;
pub mod kem;
pub mod keys;

pub use encryption::{decrypt_with_aad, encrypt_with_aad, EncryptionError};
pub use hash::{blake3_hash, derive_key, sha256, sha256_multi};
pub use kem::{KemError, KemKeypair, KemScheme};
pub use keys::{KeyError, NodeKeypair, NodePublicKey, TxSignature};
