//! Recursive license verification.
//!
//! A single license passes through a fixed sequence: parse, signature,
//! DNS authority, time window, machine binding, dependencies (depth-first,
//! left-to-right), and grant refinement. Dependencies are embedded by value
//! in the signed bytes, so the tree is self-contained and a cycle would
//! require a keypair to sign bytes containing its own signature; the depth
//! cap below is purely defensive.
//!
//! All state is either immutable or owned by one verification pass: the DNS
//! cache lives exactly as long as one top-level [`Verifier::verify`] call.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dns::AuthorityResolver;
use crate::error::LicenseError;
use crate::grants;
use crate::machine::machine_uuid;
use crate::model::{leaf_paths, Grant, SignedLicense};

/// Defensive cap on dependency recursion.
pub const MAX_DEPENDENCY_DEPTH: usize = 16;

/// Delays between DNS retry attempts on transient failure.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Sleep before each retry; attempts = delays + 1.
    pub delays: Vec<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(200),
                Duration::from_millis(800),
                Duration::from_millis(3200),
            ],
        }
    }
}

impl BackoffPolicy {
    /// No retries; used by tests and latency-sensitive callers.
    #[must_use]
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }
}

/// Caller-supplied context for one verification.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Host machine id to check bindings against; read from the host when
    /// absent and a license actually requires it.
    pub machine: Option<Uuid>,
    /// The clock; `Utc::now()` when absent.
    pub now: Option<DateTime<Utc>>,
    /// Confirm author keys against DNS. On by default; issuance against an
    /// unpublished domain and hermetic tests turn it off.
    pub confirm: bool,
    /// When DNS is unreachable, accept an author key confirmed by an
    /// earlier successful verification of the same canonical bytes.
    pub dependencies_ok_if_stale: bool,
    /// Cooperative cancellation; checked at every suspension point.
    pub cancel: CancellationToken,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            machine: None,
            now: None,
            confirm: true,
            dependencies_ok_if_stale: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl VerifyOptions {
    /// Check machine bindings against this id instead of the host's.
    #[must_use]
    pub fn with_machine(mut self, machine: Uuid) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Evaluate time windows against this instant.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Skip DNS confirmation of author keys.
    #[must_use]
    pub fn unconfirmed(mut self) -> Self {
        self.confirm = false;
        self
    }

    /// Opt in to stale authority substitution when DNS is down.
    #[must_use]
    pub fn allow_stale(mut self) -> Self {
        self.dependencies_ok_if_stale = true;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A license that passed verification, with its verified dependency trees.
#[derive(Clone, Debug)]
pub struct VerifiedLicense {
    /// The verified record.
    pub signed: SignedLicense,
    /// Verified dependencies, in declaration order.
    pub dependencies: Vec<VerifiedLicense>,
}

impl VerifiedLicense {
    /// The effective, deduplicated grant set delivered by this tree.
    #[must_use]
    pub fn effective_grants(&self) -> BTreeMap<String, Grant> {
        grants::effective_grants(self)
    }
}

/// Per-pass state: the DNS cache for one top-level verify call.
#[derive(Default)]
struct PassCache {
    keys: HashMap<(String, String), [u8; 32]>,
}

/// The license verifier.
///
/// Holds the resolver seam and, across calls, a map of canonical-byte
/// digests whose author keys were confirmed by earlier successful
/// verifications (the stale-substitution store; consulted only when the
/// caller opts in).
pub struct Verifier<R> {
    resolver: R,
    machine_id_path: Option<PathBuf>,
    backoff: BackoffPolicy,
    confirmed: Mutex<HashMap<[u8; 32], [u8; 32]>>,
}

impl<R: AuthorityResolver> Verifier<R> {
    /// Create a verifier over an authority resolver.
    #[must_use]
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            machine_id_path: None,
            backoff: BackoffPolicy::default(),
            confirmed: Mutex::new(HashMap::new()),
        }
    }

    /// Read the host machine id from this path instead of the platform
    /// default.
    #[must_use]
    pub fn with_machine_id_path(mut self, path: PathBuf) -> Self {
        self.machine_id_path = Some(path);
        self
    }

    /// Replace the DNS retry policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Verify a signed license tree.
    ///
    /// # Errors
    ///
    /// The terminal error of the first failing step, per the verification
    /// sequence.
    #[instrument(skip_all, fields(author = %signed.license.author.name, product = %signed.license.author.product))]
    pub async fn verify(
        &self,
        signed: &SignedLicense,
        options: &VerifyOptions,
    ) -> Result<VerifiedLicense, LicenseError> {
        let mut pass = PassCache::default();
        self.verify_node(signed, options, &mut pass, 0).await
    }

    /// Parse a license from bytes and verify it.
    ///
    /// # Errors
    ///
    /// `CorruptRecord` when the bytes do not decode; otherwise as
    /// [`Verifier::verify`].
    pub async fn verify_bytes(
        &self,
        bytes: &[u8],
        options: &VerifyOptions,
    ) -> Result<VerifiedLicense, LicenseError> {
        let signed: SignedLicense = licet_codec::decode(bytes)?;
        self.verify(&signed, options).await
    }

    fn verify_node<'a>(
        &'a self,
        signed: &'a SignedLicense,
        options: &'a VerifyOptions,
        pass: &'a mut PassCache,
        depth: usize,
    ) -> BoxFuture<'a, Result<VerifiedLicense, LicenseError>> {
        Box::pin(async move {
            if options.cancel.is_cancelled() {
                return Err(LicenseError::Cancelled);
            }
            if depth >= MAX_DEPENDENCY_DEPTH {
                return Err(LicenseError::DependencyTooDeep {
                    limit: MAX_DEPENDENCY_DEPTH,
                });
            }

            let license = &signed.license;
            let author = &license.author;

            // Signature over the canonical license bytes.
            signed.verify_signature()?;

            // Authority: the DNS-published key must equal the claimed one.
            if options.confirm {
                self.confirm_authority(signed, options, pass).await?;
            }

            // Time window.
            if let Some(timespan) = &license.timespan {
                let now = options.now.unwrap_or_else(Utc::now);
                if now < timespan.start {
                    return Err(LicenseError::NotYetValid {
                        starts: timespan.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    });
                }
                if !timespan.contains(now) {
                    return Err(LicenseError::Expired {
                        ended: timespan.end().to_rfc3339_opts(SecondsFormat::Secs, true),
                    });
                }
            }

            // Machine binding.
            if let Some(required) = license.machine {
                let detected = match options.machine {
                    Some(machine) => machine,
                    None => machine_uuid(self.machine_id_path.as_deref())?,
                };
                if required != detected {
                    return Err(LicenseError::WrongMachine { required, detected });
                }
            }

            // Dependencies, depth-first and left-to-right.
            let mut dependencies = Vec::with_capacity(license.dependencies.len());
            for dep in &license.dependencies {
                if let Some(client) = &dep.license.client {
                    if client.pubkey != author.pubkey {
                        return Err(LicenseError::DependencyClientMismatch {
                            client: licet_codec::b64::encode(client.pubkey),
                            author: licet_codec::b64::encode(author.pubkey),
                        });
                    }
                }
                dependencies.push(self.verify_node(dep, options, pass, depth + 1).await?);
            }

            // Grant refinement: every non-own key must be backed by a
            // dependency grant, and every override leaf must exist there.
            let dep_grants = grants::merge_dependency_grants(&dependencies);
            for (service, grant) in &license.grant {
                if service == &author.service {
                    continue;
                }
                let Some(dep_grant) = dep_grants.get(service) else {
                    return Err(LicenseError::UnauthorizedRefinement {
                        service: service.clone(),
                        grant_path: service.clone(),
                    });
                };
                if let Some(overrides) = grant.override_entries() {
                    for path in leaf_paths(overrides) {
                        if !dep_grant.contains_path(&path) {
                            return Err(LicenseError::UnauthorizedRefinement {
                                service: service.clone(),
                                grant_path: path.join("."),
                            });
                        }
                    }
                }
            }

            // Accept: remember the confirmed digest for stale substitution.
            if options.confirm {
                if let Ok(digest) = signed.digest() {
                    if let Ok(mut confirmed) = self.confirmed.lock() {
                        confirmed.insert(digest, author.pubkey);
                    }
                }
            }

            info!(
                service = %author.service,
                domain = %author.domain,
                dependencies = dependencies.len(),
                "License verified"
            );

            Ok(VerifiedLicense {
                signed: signed.clone(),
                dependencies,
            })
        })
    }

    /// Resolve and check the author key, with per-pass caching, retry with
    /// backoff on transient DNS failure, and opt-in stale substitution.
    async fn confirm_authority(
        &self,
        signed: &SignedLicense,
        options: &VerifyOptions,
        pass: &mut PassCache,
    ) -> Result<(), LicenseError> {
        let author = &signed.license.author;
        let cache_key = (author.service.clone(), author.domain.clone());

        let cached = pass.keys.get(&cache_key).copied();
        let found = match cached {
            Some(found) => found,
            None => match self
                .resolve_with_backoff(&author.service, &author.domain, options)
                .await
            {
                Ok(found) => {
                    pass.keys.insert(cache_key, found);
                    found
                }
                Err(err @ LicenseError::AuthorityUnreachable { .. })
                    if options.dependencies_ok_if_stale =>
                {
                    return self.stale_substitute(signed, err);
                }
                Err(err) => return Err(err),
            },
        };

        if found != author.pubkey {
            return Err(LicenseError::NotAuthoritative {
                service: author.service.clone(),
                domain: author.domain.clone(),
                found: licet_codec::b64::encode(found),
                claimed: licet_codec::b64::encode(author.pubkey),
            });
        }
        Ok(())
    }

    /// Accept a previously confirmed (digest, author key) pair in place of
    /// live DNS, or surface the unreachability error.
    fn stale_substitute(
        &self,
        signed: &SignedLicense,
        err: LicenseError,
    ) -> Result<(), LicenseError> {
        let digest = signed.digest()?;
        let confirmed = self.confirmed.lock().ok().and_then(|c| c.get(&digest).copied());
        match confirmed {
            Some(key) if key == signed.license.author.pubkey => {
                warn!(
                    service = %signed.license.author.service,
                    "DNS unreachable; accepting stale authority confirmation"
                );
                Ok(())
            }
            _ => Err(err),
        }
    }

    async fn resolve_with_backoff(
        &self,
        service: &str,
        domain: &str,
        options: &VerifyOptions,
    ) -> Result<[u8; 32], LicenseError> {
        let mut attempt = 0usize;
        loop {
            let lookup = tokio::select! {
                () = options.cancel.cancelled() => return Err(LicenseError::Cancelled),
                result = self.resolver.author_key(service, domain) => result,
            };

            match lookup {
                Ok(key) => return Ok(key),
                Err(LicenseError::TransientDns { path, reason }) => {
                    let Some(delay) = self.backoff.delays.get(attempt).copied() else {
                        return Err(LicenseError::AuthorityUnreachable { path, reason });
                    };
                    warn!(
                        path = %path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient DNS failure, backing off"
                    );
                    tokio::select! {
                        () = options.cancel.cancelled() => return Err(LicenseError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

impl<R> std::fmt::Debug for Verifier<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("backoff", &self.backoff)
            .field("machine_id_path", &self.machine_id_path)
            .finish_non_exhaustive()
    }
}
