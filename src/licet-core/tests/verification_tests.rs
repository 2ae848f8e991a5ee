//! End-to-end verification scenarios: issuance, chained dependencies,
//! authority checks, machine binding, time windows, and tampering.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use licet_core::{
    Author, AuthorityResolver, BackoffPolicy, CancellationToken, Client, Grant, IssueParams,
    Issuer, Keypair, LicenseError, SignedLicense, StaticAuthority, Timespan, Verifier,
    VerifyOptions, MAX_DEPENDENCY_DEPTH,
};
use serde_json::json;
use uuid::Uuid;

use common::{
    author_keypair, awesome_author, grant, issue_leaf, publishing, static_verifier, AUTHOR_SERVICE,
    AUTHOR_VK_B64,
};

fn leaf_grant() -> Grant {
    grant(json!({"License": "ebyzJLMpLFJGjGCGBm820c3"}))
}

// ============================================================================
// Scenario 1 & 2: deterministic author, leaf issuance
// ============================================================================

#[test]
fn deterministic_author_keys() {
    let keypair = author_keypair();
    assert_eq!(licet_codec::b64::encode(keypair.vk()), AUTHOR_VK_B64);
}

#[tokio::test]
async fn issued_leaf_verifies_under_deterministic_key() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));
    let options = VerifyOptions::default();

    let signed = issue_leaf(
        &verifier,
        &keypair,
        author,
        leaf_grant(),
        Some(Client {
            name: "End User".into(),
            pubkey: Keypair::generate().vk(),
        }),
        &options,
    )
    .await;

    // The canonical bytes verify under the deterministic vk.
    signed.verify_signature().unwrap();
    let verified = verifier.verify(&signed, &options).await.unwrap();
    assert!(verified.effective_grants().contains_key(AUTHOR_SERVICE));
}

#[tokio::test]
async fn bearer_issuance_requires_opt_in() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));

    let params = IssueParams::new(author, leaf_grant());
    let err = Issuer::new(&verifier)
        .issue(&keypair, params, &VerifyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::BearerNotConfirmed));
}

#[tokio::test]
async fn issuance_rejects_foreign_author_key() {
    let keypair = author_keypair();
    let author = awesome_author(Keypair::generate().vk());
    let verifier = static_verifier(publishing(&author));

    let params = IssueParams::new(author, leaf_grant()).bearer();
    let err = Issuer::new(&verifier)
        .issue(&keypair, params, &VerifyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::AuthorKeyMismatch { .. }));
}

#[tokio::test]
async fn issuance_requires_own_grant_key() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));

    let mut params = IssueParams::new(author, leaf_grant()).bearer();
    params.grant.clear();
    let err = Issuer::new(&verifier)
        .issue(&keypair, params, &VerifyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::MissingOwnGrant { .. }));
}

// ============================================================================
// Scenario 3: chained licenses
// ============================================================================

struct Chain {
    verifier: Verifier<StaticAuthority>,
    server_keypair: Keypair,
    server_author: Author,
    child: SignedLicense,
}

/// Author C grants `crypto-licensing`; the server vendor chains on it.
async fn build_chain() -> Chain {
    let lic_keypair = Keypair::generate();
    let lic_author = Author::new(
        "Dominion R&D",
        "dominionrnd.com",
        "Crypto Licensing",
        lic_keypair.vk(),
    )
    .with_service("crypto-licensing");

    let server_keypair = Keypair::generate();
    let server_author = Author::new(
        "Dominion R&D",
        "dominionrnd.com",
        "Crypto Licensing Server",
        server_keypair.vk(),
    )
    .with_service("crypto-licensing-server");

    let mut table = publishing(&lic_author);
    table.publish(
        server_author.service.clone(),
        server_author.domain.clone(),
        server_author.pubkey,
    );
    let verifier = static_verifier(table);
    let options = VerifyOptions::default();

    let child = issue_leaf(
        &verifier,
        &lic_keypair,
        lic_author,
        grant(json!({"Hz": 1000, "machines": 1})),
        Some(Client {
            name: "Crypto Licensing Server".into(),
            pubkey: server_keypair.vk(),
        }),
        &options,
    )
    .await;

    Chain {
        verifier,
        server_keypair,
        server_author,
        child,
    }
}

#[tokio::test]
async fn chained_license_verifies_and_refines() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    let params = IssueParams::new(chain.server_author.clone(), grant(json!({"sessions": 5})))
        .with_dependency(chain.child.clone())
        .with_grant(
            "crypto-licensing",
            grant(json!({"override": {"Hz": 100}})),
        )
        .bearer();

    let parent = Issuer::new(&chain.verifier)
        .issue(&chain.server_keypair, params, &options)
        .await
        .unwrap();

    let verified = chain.verifier.verify(&parent, &options).await.unwrap();
    assert_eq!(verified.dependencies.len(), 1);

    let grants = verified.effective_grants();
    assert_eq!(
        grants.get("crypto-licensing").unwrap(),
        &grant(json!({"Hz": 100, "machines": 1}))
    );
    assert_eq!(
        grants.get("crypto-licensing-server").unwrap(),
        &grant(json!({"sessions": 5}))
    );
}

#[tokio::test]
async fn chain_fails_without_dependency_authority() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    let params = IssueParams::new(chain.server_author.clone(), grant(json!({"sessions": 5})))
        .with_dependency(chain.child.clone())
        .bearer();
    let parent = Issuer::new(&chain.verifier)
        .issue(&chain.server_keypair, params, &options)
        .await
        .unwrap();

    // A verifier whose DNS only knows the server key cannot confirm the
    // embedded child's author.
    let table = publishing(&chain.server_author);
    let blind = static_verifier(table);
    let err = blind.verify(&parent, &options).await.unwrap_err();
    assert!(matches!(err, LicenseError::NoRecord { .. }));
}

#[tokio::test]
async fn refinement_without_matching_dependency_fails() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    // Bypass the issuer: hand-build a license whose non-own grant key has
    // no dependency behind it.
    let license = licet_core::License {
        author: chain.server_author.clone(),
        client: None,
        dependencies: Vec::new(),
        grant: [
            ("crypto-licensing-server".to_string(), grant(json!({}))),
            ("crypto-licensing".to_string(), grant(json!({"override": {"Hz": 1}}))),
        ]
        .into_iter()
        .collect(),
        machine: None,
        timespan: None,
    };
    let bytes = license.canonical_bytes().unwrap();
    let signed = SignedLicense {
        signature: chain.server_keypair.sign(&bytes),
        license,
    };

    let err = chain.verifier.verify(&signed, &options).await.unwrap_err();
    assert!(matches!(err, LicenseError::UnauthorizedRefinement { .. }));
}

#[tokio::test]
async fn override_of_ungranted_leaf_fails() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    let license = licet_core::License {
        author: chain.server_author.clone(),
        client: None,
        dependencies: vec![chain.child.clone()],
        grant: [
            ("crypto-licensing-server".to_string(), grant(json!({}))),
            (
                "crypto-licensing".to_string(),
                // The child grants Hz and machines, never "seats".
                grant(json!({"override": {"seats": 100}})),
            ),
        ]
        .into_iter()
        .collect(),
        machine: None,
        timespan: None,
    };
    let bytes = license.canonical_bytes().unwrap();
    let signed = SignedLicense {
        signature: chain.server_keypair.sign(&bytes),
        license,
    };

    let err = chain.verifier.verify(&signed, &options).await.unwrap_err();
    assert!(
        matches!(err, LicenseError::UnauthorizedRefinement { ref grant_path, .. } if grant_path == "seats")
    );
}

#[tokio::test]
async fn dependency_issued_to_other_client_fails() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    // The child names the server vendor as client; a third party cannot
    // chain on it.
    let thief_keypair = Keypair::generate();
    let thief_author = Author::new(
        "Thief",
        "thief.example.com",
        "Stolen Chain",
        thief_keypair.vk(),
    );
    let license = licet_core::License {
        author: thief_author,
        client: None,
        dependencies: vec![chain.child.clone()],
        grant: [("stolen-chain".to_string(), grant(json!({})))]
            .into_iter()
            .collect(),
        machine: None,
        timespan: None,
    };
    let bytes = license.canonical_bytes().unwrap();
    let signed = SignedLicense {
        signature: thief_keypair.sign(&bytes),
        license,
    };

    let err = chain
        .verifier
        .verify(&signed, &VerifyOptions { confirm: false, ..options })
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::DependencyClientMismatch { .. }));
}

// ============================================================================
// Scenario 4: DNS authority
// ============================================================================

#[tokio::test]
async fn dns_mismatch_is_not_authoritative() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));
    let options = VerifyOptions::default();

    let signed = issue_leaf(&verifier, &keypair, author.clone(), leaf_grant(), None, &options).await;

    // Republish the domain with an unrelated key.
    let mut hijacked = StaticAuthority::new();
    hijacked.publish(
        author.service.clone(),
        author.domain.clone(),
        Keypair::generate().vk(),
    );
    let err = static_verifier(hijacked)
        .verify(&signed, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NotAuthoritative { .. }));
}

// ============================================================================
// Scenario 5: machine binding
// ============================================================================

#[tokio::test]
async fn machine_binding_checks_host() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));

    let host = Uuid::new_v4();
    let options = VerifyOptions::default().with_machine(host);

    let params = IssueParams::new(author, leaf_grant())
        .with_machine(host)
        .bearer();
    let signed = Issuer::new(&verifier)
        .issue(&keypair, params, &options)
        .await
        .unwrap();

    // Same host verifies.
    verifier.verify(&signed, &options).await.unwrap();

    // Another host does not.
    let elsewhere = VerifyOptions::default().with_machine(Uuid::new_v4());
    let err = verifier.verify(&signed, &elsewhere).await.unwrap_err();
    assert!(matches!(err, LicenseError::WrongMachine { .. }));
}

// ============================================================================
// Time windows
// ============================================================================

#[tokio::test]
async fn time_window_is_enforced() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));

    let start = Utc::now();
    let timespan = Timespan {
        start,
        length: 3600,
    };
    let options = VerifyOptions::default().with_now(start + ChronoDuration::seconds(10));

    let params = IssueParams::new(author, leaf_grant())
        .with_timespan(timespan)
        .bearer();
    let signed = Issuer::new(&verifier)
        .issue(&keypair, params, &options)
        .await
        .unwrap();

    // Inside the window.
    verifier.verify(&signed, &options).await.unwrap();

    // Before the window.
    let early = VerifyOptions::default().with_now(start - ChronoDuration::seconds(1));
    assert!(matches!(
        verifier.verify(&signed, &early).await.unwrap_err(),
        LicenseError::NotYetValid { .. }
    ));

    // At and past the end (half-open window).
    let late = VerifyOptions::default().with_now(start + ChronoDuration::seconds(3600));
    assert!(matches!(
        verifier.verify(&signed, &late).await.unwrap_err(),
        LicenseError::Expired { .. }
    ));
}

// ============================================================================
// Tampering
// ============================================================================

#[tokio::test]
async fn tampering_with_license_bytes_fails_signature() {
    let chain = build_chain().await;
    let options = VerifyOptions::default();

    let params = IssueParams::new(chain.server_author.clone(), grant(json!({"sessions": 5})))
        .with_dependency(chain.child.clone())
        .bearer();
    let parent = Issuer::new(&chain.verifier)
        .issue(&chain.server_keypair, params, &options)
        .await
        .unwrap();

    // Mutating the top-level grant breaks the parent signature.
    let mut tampered = parent.clone();
    tampered
        .license
        .grant
        .insert("crypto-licensing-server".into(), grant(json!({"sessions": 9999})));
    assert!(matches!(
        chain.verifier.verify(&tampered, &options).await.unwrap_err(),
        LicenseError::BadSignature { .. }
    ));

    // Mutating an embedded dependency also breaks the parent signature:
    // dependencies are owned by value inside the signed bytes.
    let mut tampered = parent.clone();
    tampered.license.dependencies[0]
        .license
        .grant
        .insert("crypto-licensing".into(), grant(json!({"Hz": 1_000_000})));
    assert!(matches!(
        chain.verifier.verify(&tampered, &options).await.unwrap_err(),
        LicenseError::BadSignature { .. }
    ));
}

// ============================================================================
// Depth cap, cancellation, retry, caching
// ============================================================================

#[tokio::test]
async fn dependency_recursion_is_capped() {
    let keypair = Keypair::generate();
    let author = Author::new("Deep", "deep.example.com", "Deep App", keypair.vk());
    let service = author.service.clone();

    let mut signed: Option<SignedLicense> = None;
    for _ in 0..=MAX_DEPENDENCY_DEPTH {
        let license = licet_core::License {
            author: author.clone(),
            client: None,
            dependencies: signed.take().into_iter().collect(),
            grant: [(service.clone(), Grant::default())].into_iter().collect(),
            machine: None,
            timespan: None,
        };
        let bytes = license.canonical_bytes().unwrap();
        signed = Some(SignedLicense {
            signature: keypair.sign(&bytes),
            license,
        });
    }

    let verifier = static_verifier(StaticAuthority::new());
    let err = verifier
        .verify(&signed.unwrap(), &VerifyOptions::default().unconfirmed())
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::DependencyTooDeep { .. }));
}

#[tokio::test]
async fn cancelled_verification_returns_cancelled() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let verifier = static_verifier(publishing(&author));
    let options = VerifyOptions::default();

    let signed = issue_leaf(&verifier, &keypair, author, leaf_grant(), None, &options).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = verifier
        .verify(&signed, &VerifyOptions::default().with_cancel(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::Cancelled));
}

/// Resolver that counts lookups and can be switched to transient failure.
struct FlakyAuthority {
    inner: StaticAuthority,
    lookups: Mutex<usize>,
    failing: Mutex<bool>,
}

impl FlakyAuthority {
    fn new(inner: StaticAuthority) -> Self {
        Self {
            inner,
            lookups: Mutex::new(0),
            failing: Mutex::new(false),
        }
    }

    fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl AuthorityResolver for FlakyAuthority {
    async fn author_key(&self, service: &str, domain: &str) -> Result<[u8; 32], LicenseError> {
        *self.lookups.lock().unwrap() += 1;
        if *self.failing.lock().unwrap() {
            return Err(LicenseError::TransientDns {
                path: format!("{service}.{domain}"),
                reason: "connection timed out".into(),
            });
        }
        self.inner.author_key(service, domain).await
    }
}

#[tokio::test]
async fn dns_cache_lives_for_one_pass() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let plain = static_verifier(publishing(&author));
    let options = VerifyOptions::default();

    // Two sibling dependencies by the same author: one lookup suffices.
    let child_a = issue_leaf(
        &plain,
        &keypair,
        author.clone(),
        grant(json!({"Hz": 10})),
        None,
        &options,
    )
    .await;

    let parent_keypair = Keypair::generate();
    let parent_author = Author::new(
        "Parent",
        "parent.example.com",
        "Parent App",
        parent_keypair.vk(),
    );
    let license = licet_core::License {
        author: parent_author.clone(),
        client: None,
        dependencies: vec![child_a.clone(), child_a],
        grant: [(parent_author.service.clone(), Grant::default())]
            .into_iter()
            .collect(),
        machine: None,
        timespan: None,
    };
    let bytes = license.canonical_bytes().unwrap();
    let parent = SignedLicense {
        signature: parent_keypair.sign(&bytes),
        license,
    };

    let mut table = publishing(&author);
    table.publish(
        parent_author.service.clone(),
        parent_author.domain.clone(),
        parent_author.pubkey,
    );
    let counting = Arc::new(FlakyAuthority::new(table));
    let verifier = Verifier::new(counting.clone()).with_backoff(BackoffPolicy::none());

    verifier.verify(&parent, &options).await.unwrap();
    // One lookup for the parent, one for the shared child author.
    assert_eq!(counting.lookups(), 2);

    // A second pass starts a fresh cache.
    verifier.verify(&parent, &options).await.unwrap();
    assert_eq!(counting.lookups(), 4);
}

#[tokio::test]
async fn stale_confirmation_substitutes_when_opted_in() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let options = VerifyOptions::default();

    let plain = static_verifier(publishing(&author));
    let signed = issue_leaf(&plain, &keypair, author.clone(), leaf_grant(), None, &options).await;

    let flaky = Arc::new(FlakyAuthority::new(publishing(&author)));
    let verifier = Verifier::new(flaky.clone()).with_backoff(BackoffPolicy::none());

    // First verification succeeds and records the confirmation.
    verifier.verify(&signed, &options).await.unwrap();

    // DNS goes dark.
    flaky.set_failing(true);

    // Without opt-in: unreachable.
    assert!(matches!(
        verifier.verify(&signed, &options).await.unwrap_err(),
        LicenseError::AuthorityUnreachable { .. }
    ));

    // With opt-in: the cached confirmation of the same canonical bytes
    // substitutes.
    verifier
        .verify(&signed, &VerifyOptions::default().allow_stale())
        .await
        .unwrap();

    // A different license (different canonical bytes) has no cached
    // confirmation and still fails.
    flaky.set_failing(false);
    let other = issue_leaf(
        &plain,
        &keypair,
        author,
        grant(json!({"License": "different"})),
        None,
        &options,
    )
    .await;
    flaky.set_failing(true);
    assert!(matches!(
        verifier
            .verify(&other, &VerifyOptions::default().allow_stale())
            .await
            .unwrap_err(),
        LicenseError::AuthorityUnreachable { .. }
    ));
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let keypair = author_keypair();
    let author = awesome_author(keypair.vk());
    let options = VerifyOptions::default();

    let plain = static_verifier(publishing(&author));
    let signed = issue_leaf(&plain, &keypair, author.clone(), leaf_grant(), None, &options).await;

    let flaky = Arc::new(FlakyAuthority::new(publishing(&author)));
    flaky.set_failing(true);
    let verifier = Verifier::new(flaky.clone()).with_backoff(BackoffPolicy {
        delays: vec![std::time::Duration::ZERO, std::time::Duration::ZERO],
    });

    let err = verifier.verify(&signed, &options).await.unwrap_err();
    assert!(matches!(err, LicenseError::AuthorityUnreachable { .. }));
    // Initial attempt plus one retry per configured delay.
    assert_eq!(flaky.lookups(), 3);
}
