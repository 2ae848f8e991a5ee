//! # licet-crypto
//!
//! Cryptographic primitives for the licet license authority:
//!
//! - **Ed25519** signing and verification for license and keypair records
//! - **ChaCha20-Poly1305** sealing of signing-key seeds at rest
//! - **scrypt** derivation of the sealing key from user credentials
//!
//! Every license and keypair record is signed over its canonical byte form;
//! this crate only deals in raw bytes and leaves serialization to
//! `licet-codec`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod kdf;
mod sealed;
mod signing;

pub use error::CryptoError;
pub use kdf::{derive_credential_key, CredentialKey, CREDENTIAL_KEY_LEN, SCRYPT_LOG_N, SCRYPT_P, SCRYPT_R};
pub use sealed::{open_seed, seal_seed, NONCE_LEN, SEALED_SEED_LEN, TAG_LEN};
pub use signing::{verify, Ed25519Signer, KEYPAIR_LEN, PUBLIC_KEY_LEN, SEED_LEN, SIGNATURE_LEN};

/// Constant-time byte comparison.
///
/// Returns `true` if the slices are equal. The length check still returns
/// early, but lengths of keys and signatures are not secret here.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
