//! Codec error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input is not valid UTF-8.
    #[error("Record is not valid UTF-8")]
    NotUtf8,

    /// Input is not a well-formed record (bad JSON, unknown or missing
    /// fields, trailing bytes).
    #[error("Malformed record: {reason}")]
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },

    /// The same key appears twice in one object.
    #[error("Duplicate key {key:?} in record")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// A binary field is not decodable base64 or has the wrong length.
    #[error("Invalid binary field: {reason}")]
    InvalidBinary {
        /// Reason the field is invalid.
        reason: String,
    },

    /// Serialization failed (non-representable value).
    #[error("Record not serializable: {reason}")]
    Unserializable {
        /// Serializer diagnostic.
        reason: String,
    },
}
