//! Base64 transport for binary record fields.
//!
//! Canonical output is standard-alphabet base64 **without** padding; decoding
//! accepts padded input so hand-produced records still parse (and then fail
//! the canonical round-trip, as they should).
//!
//! Usable both as a `#[serde(with = "licet_codec::b64")]` field attribute and
//! as plain [`encode`]/[`decode`] helpers.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::Deserialize;

/// Standard-alphabet engine: unpadded encode, padding-indifferent decode.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded base64 text.
#[must_use]
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    ENGINE.encode(bytes.as_ref())
}

/// Decode base64 text (padded or unpadded) to bytes.
///
/// # Errors
///
/// Returns an error when the text is not valid base64.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    ENGINE.decode(text)
}

/// Serde serializer for binary fields.
pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&encode(value))
}

/// Serde deserializer for binary fields, including fixed-length arrays.
pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<Vec<u8>>,
{
    let text = String::deserialize(deserializer)?;
    let bytes = decode(&text).map_err(|e| D::Error::custom(format!("invalid base64: {e}")))?;
    let len = bytes.len();
    T::try_from(bytes)
        .map_err(|_| D::Error::custom(format!("binary field has unexpected length {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_unpadded() {
        assert_eq!(encode([0u8; 4]), "AAAAAA");
    }

    #[test]
    fn decode_accepts_both_paddings() {
        assert_eq!(decode("AAAAAA").unwrap(), vec![0u8; 4]);
        assert_eq!(decode("AAAAAA==").unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not base64!").is_err());
    }
}
