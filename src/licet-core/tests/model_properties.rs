//! Property-based tests for the license model's canonical behavior.

use std::collections::BTreeMap;

use licet_core::{service_slug, Author, Grant, GrantValue, Keypair, License, SignedLicense};
use proptest::prelude::*;

/// Strategy for grant values up to a small depth.
fn grant_value() -> impl Strategy<Value = GrantValue> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(GrantValue::Bool),
        any::<i64>().prop_map(|n| GrantValue::Number(n.into())),
        "[a-zA-Z0-9 .-]{0,16}".prop_map(GrantValue::Text),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop::collection::btree_map("[a-z_]{1,10}", inner, 0..5).prop_map(GrantValue::Map)
    })
}

fn grant() -> impl Strategy<Value = Grant> {
    prop::collection::btree_map("[a-z_]{1,10}", grant_value(), 0..5).prop_map(Grant)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    /// Slugging is idempotent and produces DNS-safe labels.
    #[test]
    fn service_slug_is_idempotent(product in "[ -~]{0,40}") {
        let once = service_slug(&product);
        prop_assert_eq!(service_slug(&once), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!once.starts_with('-'));
    }

    /// Signed license records survive the canonical round trip, and any
    /// single-byte flip in the license body breaks the signature.
    #[test]
    fn signed_license_roundtrip_and_tamper(own in grant(), name in "[a-zA-Z ]{1,16}") {
        let keypair = Keypair::generate();
        let author = Author::new(name, "vendor.example.com", "Vendor App", keypair.vk());

        let mut grants = BTreeMap::new();
        grants.insert(author.service.clone(), own);
        let license = License {
            author,
            client: None,
            dependencies: Vec::new(),
            grant: grants,
            machine: None,
            timespan: None,
        };
        let bytes = license.canonical_bytes().unwrap();
        let signed = SignedLicense {
            signature: keypair.sign(&bytes),
            license,
        };

        // Round trip of the persisted form.
        let encoded = signed.canonical_bytes().unwrap();
        let decoded: SignedLicense = licet_codec::decode(&encoded).unwrap();
        prop_assert_eq!(&decoded, &signed);
        prop_assert_eq!(decoded.canonical_bytes().unwrap(), encoded);

        // The signature holds for the original bytes.
        signed.verify_signature().unwrap();

        // And fails against a different grant body.
        let mut tampered = signed.clone();
        tampered
            .license
            .grant
            .insert("smuggled".into(), Grant::default());
        prop_assert!(tampered.verify_signature().is_err());
    }
}
