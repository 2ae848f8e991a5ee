//! # licet-core
//!
//! The license authority engine: issue, verify, and resolve grants for
//! cryptographically signed license trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   LicenseAuthority                          │
//! │                                                             │
//! │  ┌──────────────┐  ┌───────────────────┐  ┌─────────────┐  │
//! │  │  Discovery   │  │      Issuer       │  │  KeyStore   │  │
//! │  │ (search path)│  │ (sign new trees)  │  │ (licet-     │  │
//! │  └──────┬───────┘  └─────────┬─────────┘  │  keystore)  │  │
//! │         │                    │            └─────────────┘  │
//! │         ▼                    ▼                              │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │                    Verifier                      │      │
//! │  │  signature → DNS authority → time → machine →    │      │
//! │  │  dependencies (DFS) → grant refinement           │      │
//! │  └─────────────────────┬────────────────────────────┘      │
//! │                        │                                   │
//! │         ┌──────────────┴──────────────┐                    │
//! │         ▼                             ▼                    │
//! │  ┌──────────────┐            ┌─────────────────┐           │
//! │  │ DnsAuthority │            │  GrantResolver  │           │
//! │  │ Resolver     │            │ (pure DFS merge)│           │
//! │  └──────────────┘            └─────────────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! Single-threaded cooperative with explicit I/O points: disk reads in the
//! keystore and discovery, DNS queries in the resolver. All cross-call
//! state is immutable or owned by one verification pass, so an outer
//! runtime may run multiple verifications concurrently. Long operations
//! take a cancellation token and return `Cancelled` without side effects.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod authority;
mod config;
mod discovery;
mod error;
mod grants;
mod issuer;
mod machine;
mod verifier;

pub mod dns;
pub mod model;

pub use authority::LicenseAuthority;
pub use config::AuthorityConfig;
pub use discovery::{Discovered, Discovery};
pub use dns::{AuthorityResolver, DnsAuthorityResolver, StaticAuthority};
pub use error::LicenseError;
pub use grants::{effective_grants, OVERRIDE_KEY};
pub use issuer::{IssueParams, Issuer};
pub use machine::machine_uuid;
pub use model::{
    domainkey_path, domainkey_record, service_slug, Author, Client, Grant, GrantValue, License,
    SignedLicense, Timespan,
};
pub use verifier::{
    BackoffPolicy, VerifiedLicense, Verifier, VerifyOptions, MAX_DEPENDENCY_DEPTH,
};

// Re-exported so applications depend on one crate for the whole surface.
pub use licet_keystore::{Credential, Keypair, SearchPath};
pub use tokio_util::sync::CancellationToken;
