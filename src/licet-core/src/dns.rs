//! DNS resolution of author verifying keys.
//!
//! Authors publish their Ed25519 verifying key in a DKIM-style TXT record:
//!
//! ```text
//! {service}.crypto-licensing._domainkey.{domain} TXT "v=DKIM1; k=ed25519; p={base64-vk}"
//! ```
//!
//! The resolver seam is a trait so the verifier can be driven by the real
//! hickory resolver, a DoH variant, or an in-memory table in tests and
//! hermetic hosts.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{
    NameServerConfig, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};

use crate::error::LicenseError;
use crate::model::domainkey_path;

/// Source of author verifying keys for a `(service, domain)` pair.
#[async_trait]
pub trait AuthorityResolver: Send + Sync {
    /// Fetch the 32-byte verifying key published for `service` at `domain`.
    async fn author_key(&self, service: &str, domain: &str) -> Result<[u8; 32], LicenseError>;
}

#[async_trait]
impl<T: AuthorityResolver + ?Sized> AuthorityResolver for std::sync::Arc<T> {
    async fn author_key(&self, service: &str, domain: &str) -> Result<[u8; 32], LicenseError> {
        (**self).author_key(service, domain).await
    }
}

/// Live DNS resolver for author keys.
pub struct DnsAuthorityResolver {
    resolver: TokioAsyncResolver,
}

impl DnsAuthorityResolver {
    /// Create a resolver over the default public name servers.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }

    /// Create a resolver pinned to a specific DNS server.
    #[must_use]
    pub fn with_server(dns_server: IpAddr, timeout: Duration) -> Self {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(
            SocketAddr::new(dns_server, 53),
            Protocol::Udp,
        ));

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// Create a DNS-over-HTTPS resolver (Cloudflare), for networks where
    /// UDP port 53 is blocked.
    #[must_use]
    pub fn with_doh(timeout: Duration) -> Self {
        info!("Creating DNS-over-HTTPS resolver (Cloudflare)");

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::cloudflare_https(), opts),
        }
    }
}

#[async_trait]
impl AuthorityResolver for DnsAuthorityResolver {
    async fn author_key(&self, service: &str, domain: &str) -> Result<[u8; 32], LicenseError> {
        let path = domainkey_path(service, domain);
        debug!(path = %path, "DNS: querying DKIM TXT record");

        let lookup = self.resolver.txt_lookup(path.clone()).await.map_err(|e| {
            match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => LicenseError::NoRecord { path: path.clone() },
                _ => {
                    warn!(path = %path, error = %e, "DNS: transient lookup failure");
                    LicenseError::TransientDns {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                }
            }
        })?;

        // A long DKIM key may be split into several strings within one TXT
        // record; concatenate them. Multiple records at the path is a
        // publication error.
        let records: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect();

        if records.len() != 1 {
            return Err(LicenseError::MalformedRecord {
                path,
                reason: format!("expected a single TXT record, found {}", records.len()),
            });
        }

        let key = parse_dkim_record(&path, &records[0])?;
        debug!(path = %path, "DNS: author key resolved");
        Ok(key)
    }
}

/// Parse the semicolon-separated `k=v` DKIM record body, returning the
/// published verifying key.
///
/// Tags are matched case-insensitively and whitespace around tokens is
/// tolerated, per the DKIM RFC.
///
/// # Errors
///
/// `MalformedRecord` for anything unparsable, `UnsupportedKeyType` when
/// `k=` names a non-ed25519 key.
pub fn parse_dkim_record(path: &str, record: &str) -> Result<[u8; 32], LicenseError> {
    let mut pubkey: Option<String> = None;

    for token in record.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let Some((tag, value)) = token.split_once('=') else {
            return Err(LicenseError::MalformedRecord {
                path: path.to_string(),
                reason: format!("token {token:?} is not tag=value"),
            });
        };
        let tag = tag.trim();
        let value = value.trim();

        if tag.eq_ignore_ascii_case("v") {
            if !value.eq_ignore_ascii_case("DKIM1") {
                return Err(LicenseError::MalformedRecord {
                    path: path.to_string(),
                    reason: format!("record version {value:?}, expected DKIM1"),
                });
            }
        } else if tag.eq_ignore_ascii_case("k") {
            if !value.eq_ignore_ascii_case("ed25519") {
                return Err(LicenseError::UnsupportedKeyType {
                    path: path.to_string(),
                    found: value.to_string(),
                });
            }
        } else if tag.eq_ignore_ascii_case("p") {
            pubkey = Some(value.to_string());
        }
    }

    let encoded = pubkey.ok_or_else(|| LicenseError::MalformedRecord {
        path: path.to_string(),
        reason: "no p= public key tag".into(),
    })?;

    let bytes = licet_codec::b64::decode(&encoded).map_err(|e| LicenseError::MalformedRecord {
        path: path.to_string(),
        reason: format!("p= tag is not base64: {e}"),
    })?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| LicenseError::MalformedRecord {
            path: path.to_string(),
            reason: format!("ed25519 key must be 32 bytes, got {}", bytes.len()),
        })
}

/// In-memory authority table: the resolver used by tests and by hosts that
/// pre-provision author keys instead of querying DNS.
#[derive(Default)]
pub struct StaticAuthority {
    keys: BTreeMap<(String, String), [u8; 32]>,
}

impl StaticAuthority {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a key for a `(service, domain)` pair.
    pub fn publish(&mut self, service: impl Into<String>, domain: impl Into<String>, key: [u8; 32]) {
        self.keys.insert((service.into(), domain.into()), key);
    }
}

#[async_trait]
impl AuthorityResolver for StaticAuthority {
    async fn author_key(&self, service: &str, domain: &str) -> Result<[u8; 32], LicenseError> {
        self.keys
            .get(&(service.to_string(), domain.to_string()))
            .copied()
            .ok_or_else(|| LicenseError::NoRecord {
                path: domainkey_path(service, domain),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "app.crypto-licensing._domainkey.example.com";

    #[test]
    fn parse_valid_record() {
        let record = format!(
            "v=DKIM1; k=ed25519; p={}",
            licet_codec::b64::encode([7u8; 32])
        );
        assert_eq!(parse_dkim_record(PATH, &record).unwrap(), [7u8; 32]);
    }

    #[test]
    fn parse_accepts_padded_key_and_odd_spacing() {
        let record = " v = DKIM1 ;k=ed25519;  p=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA= ";
        assert_eq!(parse_dkim_record(PATH, record).unwrap(), [0u8; 32]);
    }

    #[test]
    fn wrong_version_rejected() {
        let record = "v=DKIM2; k=ed25519; p=AAAA";
        assert!(matches!(
            parse_dkim_record(PATH, record),
            Err(LicenseError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn rsa_key_is_unsupported() {
        let record = "v=DKIM1; k=rsa; p=AAAA";
        assert!(matches!(
            parse_dkim_record(PATH, record),
            Err(LicenseError::UnsupportedKeyType { found, .. }) if found == "rsa"
        ));
    }

    #[test]
    fn missing_key_rejected() {
        let record = "v=DKIM1; k=ed25519";
        assert!(matches!(
            parse_dkim_record(PATH, record),
            Err(LicenseError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn short_key_rejected() {
        let record = "v=DKIM1; k=ed25519; p=AAAAAAAAAAA=";
        assert!(matches!(
            parse_dkim_record(PATH, record),
            Err(LicenseError::MalformedRecord { .. })
        ));
    }

    #[tokio::test]
    async fn static_authority_serves_and_misses() {
        let mut authority = StaticAuthority::new();
        authority.publish("app", "example.com", [9u8; 32]);

        assert_eq!(
            authority.author_key("app", "example.com").await.unwrap(),
            [9u8; 32]
        );
        assert!(matches!(
            authority.author_key("other", "example.com").await,
            Err(LicenseError::NoRecord { .. })
        ));
    }
}
