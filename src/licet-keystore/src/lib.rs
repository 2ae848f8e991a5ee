//! # licet-keystore
//!
//! Agent and author keypairs at rest.
//!
//! A keypair binds a 32-byte Ed25519 seed to its verifying key. On disk it is
//! either plaintext (only in explicitly permitted files) or encrypted: the
//! seed sealed with ChaCha20-Poly1305 under a key scrypt-derived from the
//! owner's username and password. The encrypted record additionally carries a
//! self-signature of the verifying key, so "this file really holds a keypair
//! for this vk" is checkable without credentials.
//!
//! The keystore is the only component that writes to disk, and it never
//! overwrites an existing file.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod credentials;
mod error;
mod keypair;
mod paths;
mod store;

pub use credentials::{credential_candidates, Credential, ENV_PASSWORD, ENV_USERNAME};
pub use error::KeystoreError;
pub use keypair::{EncryptedKeypair, Keypair, KeypairRecord, PlaintextKeypair};
pub use paths::{SearchPath, KEYPAIR_EXTENSION, LICENSE_EXTENSION, SEED_EXTENSION};
pub use store::{load_keypair, load_seed, save_plaintext, save_record};
