//! Credential candidates for opening encrypted keypair records.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable naming the default username candidate.
pub const ENV_USERNAME: &str = "CRYPTO_LIC_USERNAME";
/// Environment variable naming the default password candidate.
pub const ENV_PASSWORD: &str = "CRYPTO_LIC_PASSWORD";

/// One username/password candidate.
///
/// The password is wiped on drop; the username is an identity label and is
/// not treated as secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    /// Username, compared case-insensitively by the key derivation.
    #[zeroize(skip)]
    pub username: String,
    /// Password, byte-exact.
    pub password: String,
}

impl Credential {
    /// Build a credential candidate.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Assemble the credential candidate list: the API-supplied candidates in
/// order, then the environment pair (`CRYPTO_LIC_USERNAME` /
/// `CRYPTO_LIC_PASSWORD`) when both are set.
#[must_use]
pub fn credential_candidates(supplied: &[Credential]) -> Vec<Credential> {
    let mut candidates: Vec<Credential> = supplied.to_vec();

    if let (Ok(username), Ok(password)) =
        (std::env::var(ENV_USERNAME), std::env::var(ENV_PASSWORD))
    {
        tracing::debug!(username = %username, "Adding environment credential candidate");
        candidates.push(Credential::new(username, password));
    }

    candidates
}
