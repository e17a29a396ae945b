//! # AES-256-GCM Sealing
//!
//! Symmetric half of the payload encoding pipeline. The KEM produces a
//! shared secret, BLAKE3 stretches it into a 256-bit key, and this module
//! seals the canonical payload under that key with the transaction id bound
//! in as additional authenticated data.
//!
//! ## Nonce management
//!
//! Every key sealed here comes from a fresh encapsulation, so each key sees
//! exactly one message. Nonces are still drawn from `OsRng`; a random 96-bit
//! nonce costs nothing and keeps the module safe to reuse elsewhere.
//!
//! ## AAD
//!
//! Binding the id means a sealed envelope lifted off one record and pasted
//! onto another fails authentication instead of decoding into someone else's
//! shipment.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Deliberately coarse. Wrong key and corrupted ciphertext look identical
/// from the outside.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong record, or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid nonce length: expected {AES_NONCE_LENGTH} bytes")]
    InvalidNonceLength,
}

/// Seal `plaintext` under `key`, authenticating `aad` alongside it.
///
/// Returns `(nonce, ciphertext)`; the ciphertext carries the 16-byte tag.
///
/// # Example
///
/// ```
/// use bftx_protocol::crypto::encryption::{decrypt_with_aad, encrypt_with_aad};
///
/// let key = [0x42u8; 32];
/// let (nonce, sealed) = encrypt_with_aad(&key, b"40 pallets", b"tx-id").unwrap();
/// let opened = decrypt_with_aad(&key, &nonce, &sealed, b"tx-id").unwrap();
/// assert_eq!(opened, b"40 pallets");
/// ```
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; AES_NONCE_LENGTH], Vec<u8>), EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    Ok((nonce_bytes, ciphertext))
}

/// Open a ciphertext produced by [`encrypt_with_aad`]. Nonce and AAD must
/// match what sealing used.
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Convert a decoded nonce slice into the fixed-size array GCM wants.
pub fn nonce_from_slice(bytes: &[u8]) -> Result<[u8; AES_NONCE_LENGTH], EncryptionError> {
    bytes
        .try_into()
        .map_err(|_| EncryptionError::InvalidNonceLength)
}
