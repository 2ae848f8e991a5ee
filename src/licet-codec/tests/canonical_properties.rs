//! Property-based tests for the canonical serialization laws.

use licet_codec::{decode, encode};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for arbitrary JSON values (finite numbers only; NaN and infinity
/// are not representable in JSON).
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<u64>().prop_map(|n| Value::Number(n.into())),
        prop::num::f64::NORMAL.prop_map(|f| {
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }),
        "[a-zA-Z0-9 _.-]{0,24}".prop_map(Value::String),
    ];

    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,12}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        ..ProptestConfig::default()
    })]

    /// `encode(decode(encode(x))) == encode(x)` unconditionally.
    #[test]
    fn encode_decode_encode_is_stable(value in json_value()) {
        let first = encode(&value).unwrap();
        let decoded: Value = decode(&first).unwrap();
        let second = encode(&decoded).unwrap();

        prop_assert_eq!(first, second);
    }

    /// Decoding canonical bytes and re-encoding is the identity on bytes.
    #[test]
    fn canonical_bytes_are_fixed_point(value in json_value()) {
        let canonical = encode(&value).unwrap();
        let decoded: Value = decode(&canonical).unwrap();

        prop_assert_eq!(encode(&decoded).unwrap(), canonical);
    }

    /// Canonical output never contains insignificant whitespace.
    #[test]
    fn canonical_bytes_have_no_extra_whitespace(value in json_value()) {
        let canonical = encode(&value).unwrap();
        let text = String::from_utf8(canonical).unwrap();

        // Strip string literals, then check the structural remainder.
        let mut in_string = false;
        let mut escaped = false;
        for c in text.chars() {
            match (in_string, escaped, c) {
                (true, false, '\\') => escaped = true,
                (true, false, '"') => in_string = false,
                (true, true, _) => escaped = false,
                (false, _, '"') => in_string = true,
                (false, _, c) => prop_assert!(!c.is_whitespace(), "whitespace outside string"),
                _ => {}
            }
        }
    }
}
