//! Error types for license issuance, verification, and discovery.
//!
//! Every kind carries a stable short code for CLI collaborators and log
//! matching; messages are human-readable and never include stack detail.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur across the license authority engine.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A record failed to parse or is internally inconsistent.
    #[error("Corrupt record: {reason}")]
    CorruptRecord {
        /// Parser or consistency diagnostic.
        reason: String,
    },

    /// The license signature does not verify under the author's key.
    #[error("Signature mismatch on license for {author}'s {product:?}")]
    BadSignature {
        /// Author name.
        author: String,
        /// Product name.
        product: String,
    },

    /// No credential candidate opened a keypair record.
    #[error("Bad credentials for keypair record")]
    BadCredentials,

    /// No TXT record exists at the DKIM path.
    #[error("No DNS record at {path}")]
    NoRecord {
        /// The DKIM query path.
        path: String,
    },

    /// The TXT record exists but is not a parseable DKIM key record.
    #[error("Malformed DKIM record at {path}: {reason}")]
    MalformedRecord {
        /// The DKIM query path.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// The DKIM record advertises a key type other than ed25519.
    #[error("Unsupported key type {found:?} at {path}")]
    UnsupportedKeyType {
        /// The DKIM query path.
        path: String,
        /// The advertised key type.
        found: String,
    },

    /// A retriable DNS failure (timeout, refused, network unreachable).
    #[error("Transient DNS failure at {path}: {reason}")]
    TransientDns {
        /// The DKIM query path.
        path: String,
        /// Resolver diagnostic.
        reason: String,
    },

    /// DNS stayed unreachable through every retry (and no acceptable
    /// cached confirmation existed).
    #[error("Authority unreachable for {path}: {reason}")]
    AuthorityUnreachable {
        /// The DKIM query path.
        path: String,
        /// Last resolver diagnostic.
        reason: String,
    },

    /// The DNS-published author key does not match the license's claim.
    #[error("Author key for {service}.{domain} from DKIM {found} != {claimed}")]
    NotAuthoritative {
        /// Author service label.
        service: String,
        /// Author domain.
        domain: String,
        /// Key found in DNS (base64).
        found: String,
        /// Key claimed by the license (base64).
        claimed: String,
    },

    /// The clock is past the license validity window.
    #[error("License expired at {ended}")]
    Expired {
        /// End of the window (RFC3339).
        ended: String,
    },

    /// The clock is before the license validity window.
    #[error("License not valid until {starts}")]
    NotYetValid {
        /// Start of the window (RFC3339).
        starts: String,
    },

    /// The license is bound to a different host.
    #[error("License specifies machine {required}; this host is {detected}")]
    WrongMachine {
        /// Machine id required by the license.
        required: Uuid,
        /// Machine id detected on this host.
        detected: Uuid,
    },

    /// A grant key refines capabilities no dependency actually granted.
    #[error("Unauthorized refinement of {service:?} at {grant_path}")]
    UnauthorizedRefinement {
        /// The refined service key.
        service: String,
        /// The offending grant path.
        grant_path: String,
    },

    /// Dependency recursion exceeded the defensive cap.
    #[error("License dependency tree deeper than {limit} levels")]
    DependencyTooDeep {
        /// The recursion cap.
        limit: usize,
    },

    /// A dependency was issued to a client other than this license's author.
    #[error("Dependency client key {client} doesn't match license author key {author}")]
    DependencyClientMismatch {
        /// Dependency's client key (base64).
        client: String,
        /// This license's author key (base64).
        author: String,
    },

    /// Issuance: the signing keypair is not the claimed author key.
    #[error("Signing key {keypair} doesn't match author pubkey {claimed}")]
    AuthorKeyMismatch {
        /// The keypair's verifying key (base64).
        keypair: String,
        /// The author record's key (base64).
        claimed: String,
    },

    /// Issuance: the grant map has no entry for the author's own service.
    #[error("Grant map is missing the author's own service {service:?}")]
    MissingOwnGrant {
        /// The author service label.
        service: String,
    },

    /// Issuance: a grant key names a service no dependency provides.
    #[error("Grant key {service:?} matches no dependency service")]
    UnknownGrantService {
        /// The unmatched grant key.
        service: String,
    },

    /// Issuance: a bearer license (no client) requires explicit opt-in.
    #[error("Refusing to issue a bearer license without explicit confirmation")]
    BearerNotConfirmed,

    /// Refusing to overwrite an existing file.
    #[error("File already exists: {path}")]
    FileExists {
        /// The path that was not overwritten.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying diagnostic.
        reason: String,
    },

    /// The operation was cancelled before completing; no side effects.
    #[error("Operation cancelled")]
    Cancelled,
}

impl LicenseError {
    /// Stable short code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptRecord { .. } => "corrupt-record",
            Self::BadSignature { .. } => "bad-signature",
            Self::BadCredentials => "bad-credentials",
            Self::NoRecord { .. } => "dns-no-record",
            Self::MalformedRecord { .. } => "dns-malformed",
            Self::UnsupportedKeyType { .. } => "dns-key-type",
            Self::TransientDns { .. } => "dns-transient",
            Self::AuthorityUnreachable { .. } => "authority-unreachable",
            Self::NotAuthoritative { .. } => "not-authoritative",
            Self::Expired { .. } => "expired",
            Self::NotYetValid { .. } => "not-yet-valid",
            Self::WrongMachine { .. } => "wrong-machine",
            Self::UnauthorizedRefinement { .. } => "unauthorized-refinement",
            Self::DependencyTooDeep { .. } => "dependency-too-deep",
            Self::DependencyClientMismatch { .. } => "dependency-client",
            Self::AuthorKeyMismatch { .. } => "author-key-mismatch",
            Self::MissingOwnGrant { .. } => "missing-own-grant",
            Self::UnknownGrantService { .. } => "unknown-grant-service",
            Self::BearerNotConfirmed => "bearer-not-confirmed",
            Self::FileExists { .. } => "file-exists",
            Self::Io { .. } => "io",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientDns { .. })
    }

    /// Process exit code for CLI collaborators: 2 bad credentials,
    /// 3 verification failed, 4 I/O or DNS failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadCredentials => 2,
            Self::CorruptRecord { .. }
            | Self::BadSignature { .. }
            | Self::NotAuthoritative { .. }
            | Self::Expired { .. }
            | Self::NotYetValid { .. }
            | Self::WrongMachine { .. }
            | Self::UnauthorizedRefinement { .. }
            | Self::DependencyTooDeep { .. }
            | Self::DependencyClientMismatch { .. }
            | Self::AuthorKeyMismatch { .. }
            | Self::MissingOwnGrant { .. }
            | Self::UnknownGrantService { .. }
            | Self::BearerNotConfirmed => 3,
            Self::NoRecord { .. }
            | Self::MalformedRecord { .. }
            | Self::UnsupportedKeyType { .. }
            | Self::TransientDns { .. }
            | Self::AuthorityUnreachable { .. }
            | Self::FileExists { .. }
            | Self::Io { .. }
            | Self::Cancelled => 4,
        }
    }
}

impl From<licet_codec::CodecError> for LicenseError {
    fn from(err: licet_codec::CodecError) -> Self {
        Self::CorruptRecord {
            reason: err.to_string(),
        }
    }
}

impl From<licet_crypto::CryptoError> for LicenseError {
    fn from(err: licet_crypto::CryptoError) -> Self {
        Self::CorruptRecord {
            reason: err.to_string(),
        }
    }
}

impl From<licet_keystore::KeystoreError> for LicenseError {
    fn from(err: licet_keystore::KeystoreError) -> Self {
        use licet_keystore::KeystoreError as K;
        match err {
            K::BadCredentials => Self::BadCredentials,
            K::FileExists { path } => Self::FileExists { path },
            K::Io { path, source } => Self::Io {
                path,
                reason: source.to_string(),
            },
            K::CorruptRecord { reason } => Self::CorruptRecord { reason },
            K::NoWritableLocation { name } => Self::Io {
                path: PathBuf::from(name),
                reason: "no writable directory on the search path".into(),
            },
            K::Crypto(e) => Self::CorruptRecord {
                reason: e.to_string(),
            },
        }
    }
}
