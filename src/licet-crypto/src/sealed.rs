//! ChaCha20-Poly1305 sealing of signing-key seeds at rest.
//!
//! The keystore stores only the sealed seed. The 12-byte record salt doubles
//! as the AEAD nonce: each salt is drawn fresh per record and only ever
//! encrypts that record's seed, so the nonce-uniqueness requirement holds.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::CryptoError;
use crate::kdf::CredentialKey;
use crate::signing::SEED_LEN;

/// Nonce length for ChaCha20-Poly1305 (96 bits).
pub const NONCE_LEN: usize = 12;
/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;
/// Length of a sealed 32-byte seed (ciphertext plus tag).
pub const SEALED_SEED_LEN: usize = SEED_LEN + TAG_LEN;

/// Seal a 32-byte seed under a credential-derived key.
///
/// Returns the 48-byte ciphertext (seed plus tag).
///
/// # Errors
///
/// Returns an error if the seed length is wrong or encryption fails.
pub fn seal_seed(
    key: &CredentialKey,
    nonce: &[u8; NONCE_LEN],
    seed: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if seed.len() != SEED_LEN {
        return Err(CryptoError::invalid_private_key(format!(
            "seed must be {} bytes, got {}",
            SEED_LEN,
            seed.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(nonce), seed)
        .map_err(|_| CryptoError::SealFailed)
}

/// Open a sealed seed, authenticating the ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::OpenFailed`] when authentication fails (wrong
/// credentials or tampered record), or an invalid-key error when the
/// ciphertext has the wrong length.
pub fn open_seed(
    key: &CredentialKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() != SEALED_SEED_LEN {
        return Err(CryptoError::invalid_private_key(format!(
            "sealed seed must be {} bytes, got {}",
            SEALED_SEED_LEN,
            ciphertext.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::OpenFailed)
}
