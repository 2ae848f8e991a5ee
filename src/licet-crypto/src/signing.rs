//! Ed25519 signature operations.
//!
//! License records and keypair self-attestations are signed with Ed25519.
//! The persisted "signing key" form is the 64-byte seed‖public concatenation,
//! so both halves are recoverable from a single field.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Length of an Ed25519 seed (raw private key material).
pub const SEED_LEN: usize = 32;
/// Length of an Ed25519 verifying (public) key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length of the persisted seed‖public signing-key form.
pub const KEYPAIR_LEN: usize = 64;

/// Ed25519 signer owning a seed-derived signing key.
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Create a new signer from a fresh CSPRNG seed.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a signer from raw seed bytes (32 bytes, used verbatim).
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is not exactly 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; SEED_LEN] = seed.try_into().map_err(|_| {
            CryptoError::invalid_private_key(format!(
                "Ed25519 seed must be {} bytes, got {}",
                SEED_LEN,
                seed.len()
            ))
        })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Reconstruct a signer from the 64-byte seed‖public form.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is wrong or the trailing public half
    /// does not match the seed-derived verifying key.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEYPAIR_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::invalid_private_key(format!(
                "Ed25519 signing key must be {} bytes, got {}",
                KEYPAIR_LEN,
                bytes.len()
            ))
        })?;

        let signing_key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// The 32-byte seed (raw private key material).
    #[must_use]
    pub fn seed(&self) -> Zeroizing<[u8; SEED_LEN]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// The 32-byte verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The persisted 64-byte seed‖public signing-key form.
    #[must_use]
    pub fn to_keypair_bytes(&self) -> Zeroizing<[u8; KEYPAIR_LEN]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Sign arbitrary bytes, returning the 64-byte signature.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(data).to_bytes()
    }
}

/// Verify an Ed25519 signature.
///
/// Returns `Ok(false)` when the signature simply does not verify, reserving
/// `Err` for malformed key or signature material.
///
/// # Errors
///
/// Returns an error if the public key or signature has the wrong length, or
/// the public key is not a valid curve point.
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
    let pk_bytes: [u8; PUBLIC_KEY_LEN] = public_key.try_into().map_err(|_| {
        CryptoError::invalid_public_key(format!(
            "Ed25519 public key must be {} bytes, got {}",
            PUBLIC_KEY_LEN,
            public_key.len()
        ))
    })?;

    let vk = VerifyingKey::from_bytes(&pk_bytes)
        .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

    let sig_bytes: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
        CryptoError::invalid_signature(format!(
            "Ed25519 signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        ))
    })?;

    let sig = Signature::from_bytes(&sig_bytes);

    Ok(vk.verify(data, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let signer = Ed25519Signer::random();
        let data = b"test message";

        let signature = signer.sign(data);
        let public_key = signer.verifying_key();

        assert!(verify(&public_key, data, &signature).unwrap());
    }

    #[test]
    fn same_seed_same_key() {
        let seed = [42u8; 32];
        let a = Ed25519Signer::from_seed(&seed).unwrap();
        let b = Ed25519Signer::from_seed(&seed).unwrap();

        assert_eq!(a.verifying_key(), b.verifying_key());
    }

    #[test]
    fn keypair_bytes_roundtrip() {
        let signer = Ed25519Signer::random();
        let bytes = signer.to_keypair_bytes();

        let restored = Ed25519Signer::from_keypair_bytes(bytes.as_slice()).unwrap();
        assert_eq!(signer.verifying_key(), restored.verifying_key());
    }

    #[test]
    fn keypair_bytes_layout_is_seed_then_public() {
        let signer = Ed25519Signer::random();
        let bytes = signer.to_keypair_bytes();

        assert_eq!(&bytes[..32], signer.seed().as_slice());
        assert_eq!(&bytes[32..], signer.verifying_key().as_slice());
    }

    #[test]
    fn wrong_seed_length_rejected() {
        assert!(matches!(
            Ed25519Signer::from_seed(&[0u8; 16]),
            Err(CryptoError::InvalidPrivateKey { .. })
        ));
    }
}
