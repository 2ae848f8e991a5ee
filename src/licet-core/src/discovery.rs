//! On-disk discovery of usable (keypair, license) pairs.
//!
//! Walks the configured search path for `*.crypto-keypair*` and
//! `*.crypto-license*` files, opens keypairs with the supplied credential
//! candidates, and verifies licenses with the caller's machine and clock.
//! Results are pulled one at a time through [`Discovery::next`], so the
//! caller schedules the I/O and can stop early.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use licet_keystore::{
    load_keypair, Credential, Keypair, KeypairRecord, SearchPath, KEYPAIR_EXTENSION,
    LICENSE_EXTENSION,
};
use tracing::{debug, info};

use crate::dns::AuthorityResolver;
use crate::model::SignedLicense;
use crate::verifier::{VerifiedLicense, Verifier, VerifyOptions};

/// One discovery result: an opened keypair and, when one verified, a
/// license usable with it.
#[derive(Debug)]
pub struct Discovered {
    /// Where the keypair record was found.
    pub keypair_path: PathBuf,
    /// The record as persisted.
    pub record: KeypairRecord,
    /// The opened keypair.
    pub keypair: Keypair,
    /// Where the verified license was found, when any.
    pub license_path: Option<PathBuf>,
    /// The verified license tree, when any. `None` means the keypair opened
    /// but no license verified for it; the caller may elect to issue one.
    pub license: Option<VerifiedLicense>,
}

/// Lazy walker over the search path.
pub struct Discovery<'a, R> {
    verifier: &'a Verifier<R>,
    options: VerifyOptions,
    candidates: Vec<Credential>,
    keypair_files: VecDeque<PathBuf>,
    license_files: Vec<PathBuf>,
    licenses: Option<Vec<(PathBuf, SignedLicense)>>,
    seen_keys: HashSet<[u8; 32]>,
}

impl<'a, R: AuthorityResolver> Discovery<'a, R> {
    /// Set up a walk of `search` with the given credentials and
    /// verification options. File listing happens up front (it is cheap and
    /// deterministic); parsing and verification happen on demand.
    #[must_use]
    pub fn new(
        search: &SearchPath,
        candidates: Vec<Credential>,
        verifier: &'a Verifier<R>,
        options: VerifyOptions,
    ) -> Self {
        let keypair_files: VecDeque<PathBuf> =
            search.matching_files(KEYPAIR_EXTENSION).into();
        let license_files = search.matching_files(LICENSE_EXTENSION);

        debug!(
            keypairs = keypair_files.len(),
            licenses = license_files.len(),
            "Discovery: search path enumerated"
        );

        Self {
            verifier,
            options,
            candidates,
            keypair_files,
            license_files,
            licenses: None,
            seen_keys: HashSet::new(),
        }
    }

    /// Produce the next (keypair, license) pair, or `None` when the walk is
    /// exhausted.
    ///
    /// Keypair files that fail to open (bad credentials, corrupt record)
    /// are logged and skipped; duplicate keypairs across directories are
    /// reported once. A keypair with no verifying license yields
    /// `license: None`.
    pub async fn next(&mut self) -> Option<Discovered> {
        while let Some(keypair_path) = self.keypair_files.pop_front() {
            if self.options.cancel.is_cancelled() {
                return None;
            }

            let (record, keypair) = match load_keypair(&keypair_path, &self.candidates) {
                Ok(opened) => opened,
                Err(err) => {
                    info!(
                        path = %keypair_path.display(),
                        code = %crate::error::LicenseError::from(err).code(),
                        "Discovery: keypair skipped"
                    );
                    continue;
                }
            };

            if !self.seen_keys.insert(keypair.vk()) {
                debug!(path = %keypair_path.display(), "Discovery: duplicate keypair");
                continue;
            }

            self.ensure_licenses_parsed();
            let licenses = self.licenses.as_deref().unwrap_or(&[]);

            for (license_path, signed) in licenses {
                if !concerns_keypair(signed, &keypair.vk()) {
                    continue;
                }
                match self.verifier.verify(signed, &self.options).await {
                    Ok(verified) => {
                        info!(
                            keypair = %keypair_path.display(),
                            license = %license_path.display(),
                            "Discovery: verified pair found"
                        );
                        return Some(Discovered {
                            keypair_path,
                            record,
                            keypair,
                            license_path: Some(license_path.clone()),
                            license: Some(verified),
                        });
                    }
                    Err(err) => {
                        info!(
                            license = %license_path.display(),
                            code = err.code(),
                            error = %err,
                            "Discovery: license rejected"
                        );
                    }
                }
            }

            // Keypair opened, nothing verified: report it so the caller can
            // request or issue a license for it.
            return Some(Discovered {
                keypair_path,
                record,
                keypair,
                license_path: None,
                license: None,
            });
        }

        None
    }

    fn ensure_licenses_parsed(&mut self) {
        if self.licenses.is_some() {
            return;
        }
        let mut parsed = Vec::with_capacity(self.license_files.len());
        for path in &self.license_files {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    info!(path = %path.display(), error = %err, "Discovery: unreadable license file");
                    continue;
                }
            };
            match licet_codec::decode::<SignedLicense>(&bytes) {
                Ok(signed) => parsed.push((path.clone(), signed)),
                Err(err) => {
                    info!(path = %path.display(), error = %err, "Discovery: corrupt license file");
                }
            }
        }
        self.licenses = Some(parsed);
    }
}

/// Whether a license is usable with a given agent key: issued to it as the
/// client, authored by it (a previously self-issued sub-license), or a
/// bearer license.
fn concerns_keypair(signed: &SignedLicense, vk: &[u8; 32]) -> bool {
    match &signed.license.client {
        Some(client) => &client.pubkey == vk || &signed.license.author.pubkey == vk,
        None => true,
    }
}
