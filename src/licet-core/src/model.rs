//! License records and their canonical serialization.
//!
//! A license binds an author (a vendor identified by a DNS-published Ed25519
//! key) to an optional client (an agent identified by its own key) and
//! carries a grant map. Licenses embed their dependencies by value, so the
//! author's signature covers the whole tree: tampering with any embedded
//! dependency invalidates the parent.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LicenseError;
use crate::grants::OVERRIDE_KEY;

/// The fixed module label inside every DKIM query path.
pub const DOMAINKEY_MODULE: &str = "crypto-licensing";

/// Convert a product name into its DNS service label: lower-cased, with
/// every run of non-alphanumeric symbols collapsed to a single `-`.
#[must_use]
pub fn service_slug(product: &str) -> String {
    let mut slug = String::with_capacity(product.len());
    let mut pending_dash = false;
    for c in product.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// The DKIM-style DNS path carrying an author's public key.
#[must_use]
pub fn domainkey_path(service: &str, domain: &str) -> String {
    format!("{service}.{DOMAINKEY_MODULE}._domainkey.{domain}")
}

/// The TXT record content publishing a verifying key at a domainkey path.
#[must_use]
pub fn domainkey_record(pubkey: &[u8; 32]) -> String {
    format!("v=DKIM1; k=ed25519; p={}", licet_codec::b64::encode(pubkey))
}

/// The author (vendor) identity on a license.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Author {
    /// Vendor name, for humans.
    pub name: String,
    /// Domain publishing the author's DKIM key record.
    pub domain: String,
    /// Product this license covers.
    pub product: String,
    /// DNS service label; defaults to the product slug.
    pub service: String,
    /// The author's Ed25519 verifying key.
    #[serde(with = "licet_codec::b64")]
    pub pubkey: [u8; 32],
}

impl Author {
    /// Build an author identity, deriving `service` from the product name.
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        product: impl Into<String>,
        pubkey: [u8; 32],
    ) -> Self {
        let product = product.into();
        let service = service_slug(&product);
        Self {
            name: name.into(),
            domain: domain.into(),
            product,
            service,
            pubkey,
        }
    }

    /// Override the derived service label.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// The DKIM path where this author's key is published.
    #[must_use]
    pub fn domainkey_path(&self) -> String {
        domainkey_path(&self.service, &self.domain)
    }
}

/// The recipient agent on a license. Absent means a bearer license.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Client {
    /// Agent name, for humans.
    pub name: String,
    /// The agent's Ed25519 verifying key.
    #[serde(with = "licet_codec::b64")]
    pub pubkey: [u8; 32],
}

/// A validity window: start timestamp plus length in seconds.
///
/// The window is half-open: valid for `now ∈ [start, start + length)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timespan {
    /// Window start, UTC.
    #[serde(with = "rfc3339_seconds")]
    pub start: DateTime<Utc>,
    /// Window length in seconds.
    pub length: u64,
}

impl Timespan {
    /// The first instant past the window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.length.min(i64::MAX as u64) as i64)
    }

    /// Whether `now` falls inside the window.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now < self.end()
    }
}

/// RFC3339 timestamps pinned to whole seconds and a `Z` suffix, so the
/// canonical byte form is unique.
mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(de)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid RFC3339 timestamp: {e}")))
    }
}

/// One value inside a grant: a scalar or a nested mapping. The tree is
/// finite by construction (owned values, no references).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantValue {
    /// Boolean capability flag.
    Bool(bool),
    /// Numeric capability (integer or float).
    Number(serde_json::Number),
    /// Textual capability.
    Text(String),
    /// Nested capability mapping.
    Map(BTreeMap<String, GrantValue>),
}

impl GrantValue {
    /// Whether this value is a scalar (leaf).
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Map(_))
    }
}

/// The capability object granted for one service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grant(pub BTreeMap<String, GrantValue>);

impl Grant {
    /// The entries under this grant's `override` qualifier, if any.
    #[must_use]
    pub fn override_entries(&self) -> Option<&BTreeMap<String, GrantValue>> {
        match self.0.get(OVERRIDE_KEY) {
            Some(GrantValue::Map(entries)) => Some(entries),
            _ => None,
        }
    }

    /// Whether a leaf exists at `path` (a chain of map keys ending in a
    /// scalar or any value).
    #[must_use]
    pub fn contains_path(&self, path: &[String]) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return false;
        };
        let mut current = match self.0.get(first) {
            Some(v) => v,
            None => return false,
        };
        for key in rest {
            match current {
                GrantValue::Map(m) => match m.get(key) {
                    Some(v) => current = v,
                    None => return false,
                },
                _ => return false,
            }
        }
        true
    }
}

/// All leaf paths in a grant-value mapping, in key order.
#[must_use]
pub fn leaf_paths(map: &BTreeMap<String, GrantValue>) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    let mut prefix = Vec::new();
    collect_leaf_paths(map, &mut prefix, &mut paths);
    paths
}

fn collect_leaf_paths(
    map: &BTreeMap<String, GrantValue>,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    for (key, value) in map {
        prefix.push(key.clone());
        match value {
            GrantValue::Map(inner) if !inner.is_empty() => {
                collect_leaf_paths(inner, prefix, out);
            }
            _ => out.push(prefix.clone()),
        }
        prefix.pop();
    }
}

/// An unsigned license record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct License {
    /// The issuing vendor.
    pub author: Author,
    /// The recipient agent; absent for bearer licenses.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client: Option<Client>,
    /// Embedded dependency licenses whose grants this license refines,
    /// in declaration order. Omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dependencies: Vec<SignedLicense>,
    /// Service-keyed capability grants. The key equal to
    /// `author.service` is the authoritative grant of this license.
    pub grant: BTreeMap<String, Grant>,
    /// Host binding; absent means any machine.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub machine: Option<Uuid>,
    /// Validity window; absent means perpetual.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timespan: Option<Timespan>,
}

impl License {
    /// The grant for the author's own service, if present.
    #[must_use]
    pub fn own_grant(&self) -> Option<&Grant> {
        self.grant.get(&self.author.service)
    }

    /// Canonical bytes of this license — the signing input.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` if the record cannot be encoded.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, LicenseError> {
        Ok(licet_codec::encode(self)?)
    }
}

/// A license together with its author's Ed25519 signature over the
/// license's canonical bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignedLicense {
    /// The signed record.
    pub license: License,
    /// Signature over `license.canonical_bytes()`.
    #[serde(with = "licet_codec::b64")]
    pub signature: [u8; 64],
}

impl SignedLicense {
    /// Check the signature against the author's claimed key.
    ///
    /// # Errors
    ///
    /// `BadSignature` when it does not verify, `CorruptRecord` when the
    /// claimed key is not a valid curve point.
    pub fn verify_signature(&self) -> Result<(), LicenseError> {
        let bytes = self.license.canonical_bytes()?;
        let ok = licet_crypto::verify(&self.license.author.pubkey, &bytes, &self.signature)
            .map_err(|e| LicenseError::CorruptRecord {
                reason: e.to_string(),
            })?;
        if ok {
            Ok(())
        } else {
            Err(LicenseError::BadSignature {
                author: self.license.author.name.clone(),
                product: self.license.author.product.clone(),
            })
        }
    }

    /// SHA-256 of this record's canonical bytes: the license's stable
    /// identity, independent of which file it came from.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` if the record cannot be encoded.
    pub fn digest(&self) -> Result<[u8; 32], LicenseError> {
        Ok(licet_codec::digest(self)?)
    }

    /// Canonical byte form of the whole signed record (the file format).
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` if the record cannot be encoded.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, LicenseError> {
        Ok(licet_codec::encode(self)?)
    }
}
