//! Configuration for the license authority engine.

use std::path::PathBuf;
use std::time::Duration;

use licet_keystore::SearchPath;

use crate::verifier::BackoffPolicy;

/// Configuration for a [`crate::LicenseAuthority`].
#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    /// Application name; names the default config directory and the
    /// default record file basenames.
    pub application: String,
    /// Directories searched for keypair and license files, most general to
    /// most specific.
    pub search_path: SearchPath,
    /// Override for the host machine-id file; `None` reads the platform
    /// default.
    pub machine_id_path: Option<PathBuf>,
    /// Per-query DNS timeout.
    pub dns_timeout: Duration,
    /// Retry delays after transient DNS failures.
    pub backoff: BackoffPolicy,
}

impl AuthorityConfig {
    /// Conventional configuration for an application name.
    #[must_use]
    pub fn for_application(application: impl Into<String>) -> Self {
        let application = application.into();
        let search_path = SearchPath::for_application(&application);
        Self {
            application,
            search_path,
            machine_id_path: None,
            dns_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self::for_application("licet")
    }
}
