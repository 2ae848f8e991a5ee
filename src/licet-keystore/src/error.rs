//! Keystore error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in keystore operations.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Refusing to overwrite an existing file.
    #[error("File already exists: {path}")]
    FileExists {
        /// The path that was not overwritten.
        path: PathBuf,
    },

    /// No supplied credential opened the record.
    #[error("Bad credentials for keypair record")]
    BadCredentials,

    /// The record could not be parsed, or its fields are inconsistent.
    #[error("Corrupt keypair record: {reason}")]
    CorruptRecord {
        /// Reason the record is unusable.
        reason: String,
    },

    /// No writable location was found on the search path.
    #[error("No writable directory on the search path for {name}")]
    NoWritableLocation {
        /// The file name being saved.
        name: String,
    },

    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Cryptographic failure unrelated to credentials.
    #[error("Crypto error: {0}")]
    Crypto(#[from] licet_crypto::CryptoError),
}

impl KeystoreError {
    /// Create a corrupt-record error.
    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with its path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<licet_codec::CodecError> for KeystoreError {
    fn from(err: licet_codec::CodecError) -> Self {
        Self::CorruptRecord {
            reason: err.to_string(),
        }
    }
}
