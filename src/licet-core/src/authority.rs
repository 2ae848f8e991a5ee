//! The license authority facade.
//!
//! Wires the keystore, resolver, verifier, issuer, and discovery walker
//! behind the handful of operations applications call: create or load a
//! keypair, issue a license, verify one, enumerate valid (keypair, license)
//! pairs, and resolve effective grants.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use licet_keystore::{
    credential_candidates, load_seed, save_record, Credential, EncryptedKeypair, Keypair,
    KeypairRecord,
};
use tracing::instrument;

use crate::config::AuthorityConfig;
use crate::discovery::Discovery;
use crate::dns::{AuthorityResolver, DnsAuthorityResolver};
use crate::error::LicenseError;
use crate::grants::effective_grants;
use crate::issuer::{IssueParams, Issuer};
use crate::model::{Grant, SignedLicense};
use crate::verifier::{VerifiedLicense, Verifier, VerifyOptions};

/// The engine: one configuration plus one resolver seam.
pub struct LicenseAuthority<R> {
    config: AuthorityConfig,
    verifier: Verifier<R>,
}

impl LicenseAuthority<DnsAuthorityResolver> {
    /// Create an authority backed by live DNS.
    #[must_use]
    pub fn new(config: AuthorityConfig) -> Self {
        let resolver = DnsAuthorityResolver::new(config.dns_timeout);
        Self::with_resolver(config, resolver)
    }
}

impl<R: AuthorityResolver> LicenseAuthority<R> {
    /// Create an authority over a custom resolver (DoH, pinned server,
    /// in-memory table).
    #[must_use]
    pub fn with_resolver(config: AuthorityConfig, resolver: R) -> Self {
        let mut verifier = Verifier::new(resolver).with_backoff(config.backoff.clone());
        if let Some(path) = &config.machine_id_path {
            verifier = verifier.with_machine_id_path(path.clone());
        }
        Self { config, verifier }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// The underlying verifier.
    #[must_use]
    pub fn verifier(&self) -> &Verifier<R> {
        &self.verifier
    }

    /// Create a new encrypted keypair and persist it.
    ///
    /// `seed_file`, when given, supplies deterministic seed material from a
    /// `*.crypto-seed` file; otherwise the seed is drawn from the CSPRNG.
    /// The record is saved under the search path per `reverse_save` (see
    /// the keystore), and is never overwritten.
    ///
    /// # Errors
    ///
    /// Keystore and I/O failures, mapped to [`LicenseError`].
    #[instrument(skip(self, username, password))]
    pub fn create_keypair(
        &self,
        file_name: &Path,
        seed_file: Option<&Path>,
        username: &str,
        password: &str,
        reverse_save: bool,
    ) -> Result<(EncryptedKeypair, PathBuf), LicenseError> {
        let record = match seed_file {
            Some(path) => {
                let seed = load_seed(path)?;
                EncryptedKeypair::create(Some(&seed), username, password)?
            }
            None => EncryptedKeypair::create(None, username, password)?,
        };

        let saved = save_record(&record, file_name, &self.config.search_path, reverse_save)?;
        Ok((record, saved))
    }

    /// Load and open a keypair record.
    ///
    /// The credential list is extended with the environment pair
    /// (`CRYPTO_LIC_USERNAME` / `CRYPTO_LIC_PASSWORD`) when set.
    ///
    /// # Errors
    ///
    /// `Io`, `CorruptRecord`, or `BadCredentials` when nothing opens it.
    pub fn load_keypair(
        &self,
        path: &Path,
        credentials: &[Credential],
    ) -> Result<(KeypairRecord, Keypair), LicenseError> {
        let candidates = credential_candidates(credentials);
        Ok(licet_keystore::load_keypair(path, &candidates)?)
    }

    /// Issue a new signed license.
    ///
    /// # Errors
    ///
    /// Issuance precondition failures or verification failures of the
    /// dependencies or the assembled license.
    pub async fn issue_license(
        &self,
        keypair: &Keypair,
        params: IssueParams,
        options: &VerifyOptions,
    ) -> Result<SignedLicense, LicenseError> {
        Issuer::new(&self.verifier).issue(keypair, params, options).await
    }

    /// Verify a signed license tree.
    ///
    /// # Errors
    ///
    /// The first failing verification step's error.
    pub async fn verify_license(
        &self,
        signed: &SignedLicense,
        options: &VerifyOptions,
    ) -> Result<VerifiedLicense, LicenseError> {
        self.verifier.verify(signed, options).await
    }

    /// Walk the search path for usable (keypair, license) pairs.
    ///
    /// Returns the lazy walker; pull results with [`Discovery::next`].
    #[must_use]
    pub fn enumerate_valid_licenses(
        &self,
        credentials: &[Credential],
        options: VerifyOptions,
    ) -> Discovery<'_, R> {
        let candidates = credential_candidates(credentials);
        Discovery::new(&self.config.search_path, candidates, &self.verifier, options)
    }

    /// The effective grant map of a verified tree. Pure: same tree, same
    /// bytes.
    #[must_use]
    pub fn resolve_grants(&self, tree: &VerifiedLicense) -> BTreeMap<String, Grant> {
        effective_grants(tree)
    }
}
