//! Credential key derivation.
//!
//! Derives the seed-sealing key from a username and password with scrypt.
//! The username is an identity label (often an email address) and compares
//! case-insensitively; the password is byte-exact.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Length of a derived sealing key (256 bits for ChaCha20).
pub const CREDENTIAL_KEY_LEN: usize = 32;

/// scrypt cost parameter: log2(N) for N = 16384.
pub const SCRYPT_LOG_N: u8 = 14;
/// scrypt block size parameter.
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelism parameter.
pub const SCRYPT_P: u32 = 1;

/// A derived sealing key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey {
    bytes: [u8; CREDENTIAL_KEY_LEN],
}

impl CredentialKey {
    /// The raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a sealing key from credentials and a record salt.
///
/// Computes `scrypt(lowercase(username) ‖ password, salt)` with N=16384,
/// r=8, p=1 and a 32-byte output.
///
/// # Errors
///
/// Returns an error if the scrypt parameters are rejected (cannot happen for
/// the constants above, but the fallible path is kept explicit).
pub fn derive_credential_key(
    username: &str,
    password: &str,
    salt: &[u8],
) -> Result<CredentialKey, CryptoError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, CREDENTIAL_KEY_LEN)
        .map_err(|e| CryptoError::KeyDerivationFailed {
            reason: e.to_string(),
        })?;

    let mut input = Zeroizing::new(Vec::with_capacity(username.len() + password.len()));
    input.extend_from_slice(username.to_lowercase().as_bytes());
    input.extend_from_slice(password.as_bytes());

    let mut bytes = [0u8; CREDENTIAL_KEY_LEN];
    scrypt::scrypt(&input, salt, &params, &mut bytes).map_err(|e| {
        CryptoError::KeyDerivationFailed {
            reason: e.to_string(),
        }
    })?;

    Ok(CredentialKey { bytes })
}
