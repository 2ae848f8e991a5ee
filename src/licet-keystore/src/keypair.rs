//! Keypair records: in-memory keypairs and their persisted forms.

use licet_crypto::{
    derive_credential_key, open_seed, seal_seed, verify, CryptoError, Ed25519Signer, NONCE_LEN,
    PUBLIC_KEY_LEN, SEALED_SEED_LEN, SEED_LEN, SIGNATURE_LEN,
};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::credentials::Credential;
use crate::error::KeystoreError;

/// An opened (in-memory) Ed25519 keypair.
///
/// Never persisted as-is; see [`PlaintextKeypair`] and [`EncryptedKeypair`]
/// for the on-disk forms.
pub struct Keypair {
    signer: Ed25519Signer,
}

impl Keypair {
    /// Generate a fresh keypair from the CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signer: Ed25519Signer::random(),
        }
    }

    /// Build a keypair from a 32-byte seed, used verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed length is wrong.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            signer: Ed25519Signer::from_seed(seed)?,
        })
    }

    /// Build a keypair from persisted signing-key bytes: either the 32-byte
    /// seed or the 64-byte seed‖public form.
    ///
    /// # Errors
    ///
    /// Returns an error on any other length, or when the 64-byte form's
    /// public half does not match its seed.
    pub fn from_sk_bytes(sk: &[u8]) -> Result<Self, CryptoError> {
        let signer = match sk.len() {
            SEED_LEN => Ed25519Signer::from_seed(sk)?,
            len if len == SEED_LEN + PUBLIC_KEY_LEN => Ed25519Signer::from_keypair_bytes(sk)?,
            len => {
                return Err(CryptoError::invalid_private_key(format!(
                    "signing key must be {} or {} bytes, got {}",
                    SEED_LEN,
                    SEED_LEN + PUBLIC_KEY_LEN,
                    len
                )))
            }
        };
        Ok(Self { signer })
    }

    /// The 32-byte verifying key.
    #[must_use]
    pub fn vk(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signer.verifying_key()
    }

    /// The 32-byte seed.
    #[must_use]
    pub fn seed(&self) -> Zeroizing<[u8; SEED_LEN]> {
        self.signer.seed()
    }

    /// Sign arbitrary bytes with this keypair.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signer.sign(data)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("vk", &licet_codec::b64::encode(self.vk()))
            .finish_non_exhaustive()
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        licet_crypto::constant_time_eq(self.seed().as_slice(), other.seed().as_slice())
    }
}

/// Plaintext persisted keypair: `{vk, sk}` with `sk` as the 64-byte
/// seed‖public form.
///
/// Only ever written to explicitly permitted files.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaintextKeypair {
    /// Signing key bytes (32-byte seed or 64-byte seed‖public on input;
    /// always 64 bytes when produced here).
    #[serde(with = "licet_codec::b64")]
    pub sk: Vec<u8>,
    /// Verifying key.
    #[serde(with = "licet_codec::b64")]
    pub vk: [u8; PUBLIC_KEY_LEN],
}

impl PlaintextKeypair {
    /// Capture an opened keypair as a plaintext record.
    #[must_use]
    pub fn from_keypair(keypair: &Keypair) -> Self {
        Self {
            sk: keypair.signer.to_keypair_bytes().to_vec(),
            vk: keypair.vk(),
        }
    }

    /// Recover the keypair, checking sk/vk consistency.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` when the stored vk does not match the
    /// seed-derived one.
    pub fn into_keypair(&self) -> Result<Keypair, KeystoreError> {
        let keypair = Keypair::from_sk_bytes(&self.sk)
            .map_err(|e| KeystoreError::corrupt(e.to_string()))?;
        if keypair.vk() != self.vk {
            return Err(KeystoreError::corrupt(
                "stored vk does not match signing key",
            ));
        }
        Ok(keypair)
    }
}

impl std::fmt::Debug for PlaintextKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaintextKeypair")
            .field("vk", &licet_codec::b64::encode(self.vk))
            .field("sk", &"[REDACTED]")
            .finish()
    }
}

/// Encrypted persisted keypair.
///
/// The 32-byte seed is sealed with ChaCha20-Poly1305 under a key derived by
/// scrypt from `lowercase(username) ‖ password` and the 12-byte salt; the
/// salt doubles as the AEAD nonce. `vk_signature` is `sign(sk, vk)` captured
/// at creation, so the record attests to its own vk without credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedKeypair {
    /// Sealed seed (32-byte seed plus 16-byte tag).
    #[serde(with = "licet_codec::b64")]
    pub ciphertext: Vec<u8>,
    /// Per-record salt, also the AEAD nonce.
    #[serde(with = "licet_codec::b64")]
    pub salt: [u8; NONCE_LEN],
    /// Verifying key of the sealed seed.
    #[serde(with = "licet_codec::b64")]
    pub vk: [u8; PUBLIC_KEY_LEN],
    /// Self-signature: `sign(sk, vk)`.
    #[serde(with = "licet_codec::b64")]
    pub vk_signature: [u8; SIGNATURE_LEN],
}

impl EncryptedKeypair {
    /// Create an encrypted record for a new or seed-derived keypair.
    ///
    /// With no `seed`, 32 bytes are drawn from the CSPRNG; otherwise the
    /// seed is used verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on bad seed length or a key-derivation failure.
    pub fn create(
        seed: Option<&[u8]>,
        username: &str,
        password: &str,
    ) -> Result<Self, KeystoreError> {
        let keypair = match seed {
            Some(seed) => Keypair::from_seed(seed)?,
            None => Keypair::generate(),
        };
        Self::from_keypair(&keypair, username, password)
    }

    /// Seal an existing keypair under the supplied credentials.
    ///
    /// # Errors
    ///
    /// Returns an error when key derivation or sealing fails.
    pub fn from_keypair(
        keypair: &Keypair,
        username: &str,
        password: &str,
    ) -> Result<Self, KeystoreError> {
        let vk = keypair.vk();
        let vk_signature = keypair.sign(&vk);

        let mut salt = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = derive_credential_key(username, password, &salt)?;
        let ciphertext = seal_seed(&key, &salt, keypair.seed().as_slice())?;

        tracing::info!(
            vk = %licet_codec::b64::encode(vk),
            "Sealed keypair record"
        );

        Ok(Self {
            ciphertext,
            salt,
            vk,
            vk_signature,
        })
    }

    /// Open the record with the supplied credentials.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::BadCredentials`] when AEAD authentication
    /// fails or the decrypted seed does not re-derive the stored vk.
    pub fn open(&self, username: &str, password: &str) -> Result<Keypair, KeystoreError> {
        if self.ciphertext.len() != SEALED_SEED_LEN {
            return Err(KeystoreError::corrupt(format!(
                "sealed seed must be {} bytes, got {}",
                SEALED_SEED_LEN,
                self.ciphertext.len()
            )));
        }

        let key = derive_credential_key(username, password, &self.salt)?;
        let seed = Zeroizing::new(
            open_seed(&key, &self.salt, &self.ciphertext)
                .map_err(|_| KeystoreError::BadCredentials)?,
        );

        let keypair =
            Keypair::from_seed(&seed).map_err(|e| KeystoreError::corrupt(e.to_string()))?;
        if keypair.vk() != self.vk {
            // Decryption "succeeded" but for a different key: treat exactly
            // like a credential failure, not a corrupt record.
            return Err(KeystoreError::BadCredentials);
        }

        Ok(keypair)
    }

    /// Offline check that this record holds a keypair for its stored vk,
    /// via the creation-time self-signature. No credentials required.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` when the stored vk is not a valid key.
    pub fn attests(&self) -> Result<bool, KeystoreError> {
        verify(&self.vk, &self.vk, &self.vk_signature)
            .map_err(|e| KeystoreError::corrupt(e.to_string()))
    }
}

impl std::fmt::Debug for EncryptedKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedKeypair")
            .field("vk", &licet_codec::b64::encode(self.vk))
            .finish_non_exhaustive()
    }
}

/// A persisted keypair record, in either form.
///
/// Untagged: the encrypted shape is tried first (its field set is strictly
/// disjoint from the plaintext one), matching the loader behavior of trying
/// the most stringent interpretation first.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeypairRecord {
    /// Encrypted at rest.
    Encrypted(EncryptedKeypair),
    /// Plaintext at rest.
    Plaintext(PlaintextKeypair),
}

impl KeypairRecord {
    /// The record's verifying key, available without credentials.
    #[must_use]
    pub fn vk(&self) -> [u8; PUBLIC_KEY_LEN] {
        match self {
            Self::Encrypted(rec) => rec.vk,
            Self::Plaintext(rec) => rec.vk,
        }
    }

    /// Open the record, trying each credential candidate in order.
    ///
    /// Plaintext records ignore credentials. For encrypted records the
    /// first succeeding candidate wins.
    ///
    /// # Errors
    ///
    /// Returns `BadCredentials` when no candidate opens an encrypted
    /// record, or `CorruptRecord` for inconsistent plaintext records.
    pub fn open_with(&self, candidates: &[Credential]) -> Result<Keypair, KeystoreError> {
        match self {
            Self::Plaintext(rec) => rec.into_keypair(),
            Self::Encrypted(rec) => {
                for cred in candidates {
                    match rec.open(&cred.username, cred.password.as_str()) {
                        Ok(keypair) => return Ok(keypair),
                        Err(KeystoreError::BadCredentials) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Err(KeystoreError::BadCredentials)
            }
        }
    }
}
