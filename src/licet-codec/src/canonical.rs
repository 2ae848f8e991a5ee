//! Canonical encode/decode and the strict-decode checks.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Marker prefix used to smuggle the duplicate key name through serde's
/// string-typed custom errors.
const DUPLICATE_KEY_MARKER: &str = "duplicate key ";

/// Encode a record to its canonical byte form.
///
/// Serialization goes through `serde_json::Value`, whose object
/// representation is a `BTreeMap`: keys come out sorted at every level
/// regardless of struct field order. Compact output has no insignificant
/// whitespace.
///
/// # Errors
///
/// Returns an error if the record contains a non-representable value.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(record).map_err(|e| CodecError::Unserializable {
        reason: e.to_string(),
    })?;
    serde_json::to_vec(&value).map_err(|e| CodecError::Unserializable {
        reason: e.to_string(),
    })
}

/// Decode a record from bytes, enforcing the strict-decode rules.
///
/// Rejects non-UTF-8 input, duplicate keys at any level, trailing bytes,
/// and (through the record types' `deny_unknown_fields`) unrecognized
/// fields.
///
/// # Errors
///
/// Returns the corresponding [`CodecError`] for each rejection class.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?;

    // First pass walks the raw document and rejects duplicate keys, which
    // serde_json would otherwise resolve silently (last writer wins).
    serde_json::from_str::<DuplicateKeyCheck>(text).map_err(classify_parse_error)?;

    serde_json::from_str(text).map_err(classify_parse_error)
}

/// SHA-256 digest of a record's canonical byte form.
///
/// Used as the stable identity of a license (file-independent) and as the
/// key of the verified-authority cache.
///
/// # Errors
///
/// Returns an error if the record cannot be canonically encoded.
pub fn digest<T: Serialize>(record: &T) -> Result<[u8; 32], CodecError> {
    Ok(digest_bytes(&encode(record)?))
}

/// SHA-256 digest of already-canonical bytes.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn classify_parse_error(err: serde_json::Error) -> CodecError {
    let reason = err.to_string();
    if let Some(rest) = reason.strip_prefix(DUPLICATE_KEY_MARKER) {
        // Marker format: `duplicate key "<name>" ...` (serde_json appends
        // position info after our custom message).
        if let Some(key) = rest.split('"').nth(1) {
            return CodecError::DuplicateKey {
                key: key.to_string(),
            };
        }
    }
    CodecError::Malformed { reason }
}

/// Zero-sized deserialize target that walks an arbitrary JSON document and
/// errors on the first object with a repeated key.
struct DuplicateKeyCheck;

impl<'de> Deserialize<'de> for DuplicateKeyCheck {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AnyVisitor;

        impl<'de> Visitor<'de> for AnyVisitor {
            type Value = DuplicateKeyCheck;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_i64<E>(self, _: i64) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_u64<E>(self, _: u64) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_f64<E>(self, _: f64) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_str<E>(self, _: &str) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(DuplicateKeyCheck)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                while seq.next_element::<DuplicateKeyCheck>()?.is_some() {}
                Ok(DuplicateKeyCheck)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut seen = BTreeSet::new();
                while let Some(key) = map.next_key::<String>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!(
                            "{DUPLICATE_KEY_MARKER}\"{key}\""
                        )));
                    }
                    map.next_value::<DuplicateKeyCheck>()?;
                }
                Ok(DuplicateKeyCheck)
            }
        }

        deserializer.deserialize_any(AnyVisitor)
    }
}
