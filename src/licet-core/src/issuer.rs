//! License issuance.
//!
//! Anyone holding an author signing key can issue a license, but issuance
//! refuses to produce records that could never verify: the keypair must
//! match the claimed author key, the grant map must carry the author's own
//! service, every other grant key must name a service some dependency
//! actually provides, and each dependency must verify in isolation with the
//! caller's options. Bearer licenses (no client) require explicit opt-in.

use std::collections::{BTreeMap, BTreeSet};

use licet_keystore::Keypair;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::dns::AuthorityResolver;
use crate::error::LicenseError;
use crate::model::{Author, Client, Grant, License, SignedLicense, Timespan};
use crate::verifier::{Verifier, VerifyOptions};

/// Everything a new license is assembled from.
#[derive(Clone, Debug)]
pub struct IssueParams {
    /// The issuing vendor identity; `pubkey` must match the signing key.
    pub author: Author,
    /// The recipient; `None` issues a bearer license and requires
    /// [`IssueParams::allow_bearer`].
    pub client: Option<Client>,
    /// Service-keyed grants; must include `author.service`.
    pub grant: BTreeMap<String, Grant>,
    /// Dependency licenses this one refines, in declaration order.
    pub dependencies: Vec<SignedLicense>,
    /// Optional host binding.
    pub machine: Option<Uuid>,
    /// Optional validity window.
    pub timespan: Option<Timespan>,
    /// Explicit opt-in for issuing without a client.
    pub allow_bearer: bool,
}

impl IssueParams {
    /// Start from the mandatory pieces: author plus their own grant.
    #[must_use]
    pub fn new(author: Author, own_grant: Grant) -> Self {
        let mut grant = BTreeMap::new();
        grant.insert(author.service.clone(), own_grant);
        Self {
            author,
            client: None,
            grant,
            dependencies: Vec::new(),
            machine: None,
            timespan: None,
            allow_bearer: false,
        }
    }

    /// Set the recipient.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Add a dependency license.
    #[must_use]
    pub fn with_dependency(mut self, dependency: SignedLicense) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add a refinement grant for a dependency-provided service.
    #[must_use]
    pub fn with_grant(mut self, service: impl Into<String>, grant: Grant) -> Self {
        self.grant.insert(service.into(), grant);
        self
    }

    /// Bind the license to one machine.
    #[must_use]
    pub fn with_machine(mut self, machine: Uuid) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Limit the license to a validity window.
    #[must_use]
    pub fn with_timespan(mut self, timespan: Timespan) -> Self {
        self.timespan = Some(timespan);
        self
    }

    /// Permit issuing a bearer license (no client).
    #[must_use]
    pub fn bearer(mut self) -> Self {
        self.allow_bearer = true;
        self
    }
}

/// The license issuer, bound to a verifier for dependency checking.
pub struct Issuer<'a, R> {
    verifier: &'a Verifier<R>,
}

impl<'a, R: AuthorityResolver> Issuer<'a, R> {
    /// Create an issuer over a verifier.
    #[must_use]
    pub fn new(verifier: &'a Verifier<R>) -> Self {
        Self { verifier }
    }

    /// Build, check, and sign a new license.
    ///
    /// The assembled record is verified with the caller's options before it
    /// is returned, so a successful issue yields a license that verifies
    /// here and now.
    ///
    /// # Errors
    ///
    /// The precondition errors of this module, or any verification error
    /// from the dependency or final checks.
    #[instrument(skip_all, fields(service = %params.author.service, domain = %params.author.domain))]
    pub async fn issue(
        &self,
        keypair: &Keypair,
        params: IssueParams,
        options: &VerifyOptions,
    ) -> Result<SignedLicense, LicenseError> {
        let author = &params.author;

        if keypair.vk() != author.pubkey {
            return Err(LicenseError::AuthorKeyMismatch {
                keypair: licet_codec::b64::encode(keypair.vk()),
                claimed: licet_codec::b64::encode(author.pubkey),
            });
        }

        if !params.grant.contains_key(&author.service) {
            return Err(LicenseError::MissingOwnGrant {
                service: author.service.clone(),
            });
        }

        // Every non-own grant key must name a transitively reachable
        // dependency service.
        let mut reachable = BTreeSet::new();
        for dep in &params.dependencies {
            collect_services(dep, &mut reachable);
        }
        for service in params.grant.keys() {
            if service != &author.service && !reachable.contains(service) {
                return Err(LicenseError::UnknownGrantService {
                    service: service.clone(),
                });
            }
        }

        if params.client.is_none() && !params.allow_bearer {
            return Err(LicenseError::BearerNotConfirmed);
        }

        // Each dependency must verify in isolation with the caller's
        // options before we embed it.
        for dep in &params.dependencies {
            self.verifier.verify(dep, options).await?;
        }

        let license = License {
            author: params.author,
            client: params.client,
            dependencies: params.dependencies,
            grant: params.grant,
            machine: params.machine,
            timespan: params.timespan,
        };

        let bytes = license.canonical_bytes()?;
        let signature = keypair.sign(&bytes);
        let signed = SignedLicense { license, signature };

        // The whole point of the precondition checks: what we hand back
        // verifies under the same options it was issued with.
        self.verifier.verify(&signed, options).await?;

        info!(
            client = signed
                .license
                .client
                .as_ref()
                .map_or("(bearer)", |c| c.name.as_str()),
            dependencies = signed.license.dependencies.len(),
            "License issued"
        );

        Ok(signed)
    }
}

/// Collect `author.service` labels across a dependency tree.
fn collect_services(signed: &SignedLicense, out: &mut BTreeSet<String>) {
    out.insert(signed.license.author.service.clone());
    for dep in &signed.license.dependencies {
        collect_services(dep, out);
    }
}
