//! Shared fixtures for the licet-core integration tests.
#![allow(dead_code)]

use licet_core::{
    Author, BackoffPolicy, Client, Grant, IssueParams, Issuer, Keypair, SignedLicense,
    StaticAuthority, Verifier, VerifyOptions,
};

/// The deterministic-author seed from the test vectors.
pub const AUTHOR_SEED: [u8; 32] = [0xFF; 32];

/// Expected base64 (unpadded) of the deterministic author's verifying key.
pub const AUTHOR_VK_B64: &str = "dqFZIESm5PURJlvKc6YE2QsFKdHfYCvjChmpJXZg0fU";

pub const AUTHOR_DOMAIN: &str = "awesome-py-app.dominionrnd.com";
pub const AUTHOR_SERVICE: &str = "awesome-py-app";

/// The deterministic author keypair.
pub fn author_keypair() -> Keypair {
    Keypair::from_seed(&AUTHOR_SEED).unwrap()
}

/// The vendor identity used across the scenarios.
pub fn awesome_author(vk: [u8; 32]) -> Author {
    Author::new("Awesome, Inc.", AUTHOR_DOMAIN, "AwesomePyApp", vk).with_service(AUTHOR_SERVICE)
}

/// A grant object from JSON literal syntax.
pub fn grant(value: serde_json::Value) -> Grant {
    serde_json::from_value(value).unwrap()
}

/// A verifier over a static authority table, with retries disabled.
pub fn static_verifier(authority: StaticAuthority) -> Verifier<StaticAuthority> {
    Verifier::new(authority).with_backoff(BackoffPolicy::none())
}

/// An authority table that already publishes the given author's key.
pub fn publishing(author: &Author) -> StaticAuthority {
    let mut table = StaticAuthority::new();
    table.publish(author.service.clone(), author.domain.clone(), author.pubkey);
    table
}

/// Issue a leaf license (no dependencies) to `client`.
pub async fn issue_leaf(
    verifier: &Verifier<StaticAuthority>,
    keypair: &Keypair,
    author: Author,
    own_grant: Grant,
    client: Option<Client>,
    options: &VerifyOptions,
) -> SignedLicense {
    let mut params = IssueParams::new(author, own_grant);
    params = match client {
        Some(client) => params.with_client(client),
        None => params.bearer(),
    };
    Issuer::new(verifier)
        .issue(keypair, params, options)
        .await
        .unwrap()
}
