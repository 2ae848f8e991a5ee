//! The facade surface: keypair lifecycle, issue/verify round trips, and
//! canonical stability of persisted records.

mod common;

use std::path::Path;

use licet_core::{AuthorityConfig, Credential, LicenseAuthority, SearchPath, SignedLicense, VerifyOptions};
use serde_json::json;

use common::{author_keypair, awesome_author, grant, issue_leaf, publishing, static_verifier};

const USERNAME: &str = "admin@awesome-inc.com";
const PASSWORD: &str = "password";

#[tokio::test]
async fn keypair_lifecycle_through_the_facade() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AuthorityConfig::for_application("licet-tests");
    config.search_path = SearchPath::new(vec![dir.path().to_path_buf()]);
    let authority = LicenseAuthority::with_resolver(config, licet_core::StaticAuthority::new());

    // Create from a seed file, deterministically.
    let seed_path = dir.path().join("author.crypto-seed");
    std::fs::write(&seed_path, "ff".repeat(32)).unwrap();

    let (record, saved) = authority
        .create_keypair(
            Path::new("author.crypto-keypair"),
            Some(&seed_path),
            USERNAME,
            PASSWORD,
            false,
        )
        .unwrap();
    assert_eq!(
        licet_codec::b64::encode(record.vk),
        common::AUTHOR_VK_B64
    );

    // Load it back with the right credentials.
    let (_loaded, keypair) = authority
        .load_keypair(&saved, &[Credential::new(USERNAME, PASSWORD)])
        .unwrap();
    assert_eq!(keypair.vk(), record.vk);

    // Creating again refuses to overwrite.
    let err = authority
        .create_keypair(
            Path::new("author.crypto-keypair"),
            None,
            USERNAME,
            PASSWORD,
            false,
        )
        .unwrap_err();
    assert_eq!(err.code(), "file-exists");
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn issue_verify_resolve_through_the_facade() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());

    let config = AuthorityConfig::for_application("licet-tests");
    let authority = LicenseAuthority::with_resolver(config, publishing(&author));
    let options = VerifyOptions::default();

    let params = licet_core::IssueParams::new(author, grant(json!({"Hz": 42}))).bearer();
    let signed = authority
        .issue_license(&keypair, params, &options)
        .await
        .unwrap();

    let verified = authority.verify_license(&signed, &options).await.unwrap();
    let grants = authority.resolve_grants(&verified);
    assert_eq!(
        grants.get("awesome-py-app").unwrap(),
        &grant(json!({"Hz": 42}))
    );
}

#[tokio::test]
async fn persisted_license_bytes_are_canonical() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));
    let options = VerifyOptions::default();

    let signed = issue_leaf(
        &verifier,
        &keypair,
        author,
        grant(json!({"License": "abc", "limits": {"seats": 3}})),
        None,
        &options,
    )
    .await;

    // encode(decode(encode(x))) == encode(x), and decode accepts its own
    // output.
    let bytes = signed.canonical_bytes().unwrap();
    let decoded: SignedLicense = licet_codec::decode(&bytes).unwrap();
    assert_eq!(decoded, signed);
    assert_eq!(decoded.canonical_bytes().unwrap(), bytes);

    // Canonical bytes are sorted-key compact JSON.
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with(r#"{"license":{"author":{"domain":"#));
}
