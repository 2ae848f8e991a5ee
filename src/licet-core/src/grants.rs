//! Effective-grant computation over a verified license tree.
//!
//! Merging follows DFS declaration order: dependency subtrees contribute
//! first, and a later contributor changes an already-set leaf only through
//! an explicit `override` sub-mapping. Each license's own grant is
//! authoritative for its own service within its subtree, so the root's own
//! grant has final say over its service. The computation is pure: the same
//! tree always produces the same map, byte for byte.

use std::collections::BTreeMap;

use crate::model::{Grant, GrantValue};
use crate::verifier::VerifiedLicense;

/// The grant qualifier whose entries replace rather than merge.
pub const OVERRIDE_KEY: &str = "override";

/// Compute the effective grant map `{service → capability}` delivered by a
/// verified license tree.
#[must_use]
pub fn effective_grants(tree: &VerifiedLicense) -> BTreeMap<String, Grant> {
    let license = &tree.signed.license;
    let own_service = &license.author.service;

    // Leaves first: the merged grant sets of the dependency subtrees.
    let mut acc = merge_dependency_grants(&tree.dependencies);

    // This license's refinements of inherited services.
    for (service, grant) in &license.grant {
        if service == own_service {
            continue;
        }
        let entry = acc.entry(service.clone()).or_default();
        merge(&mut entry.0, &grant.0, MergePolicy::PreferExisting);
    }

    // The license's own grant is authoritative for its own service.
    if let Some(own) = license.grant.get(own_service) {
        let entry = acc.entry(own_service.clone()).or_default();
        merge(&mut entry.0, &own.0, MergePolicy::PreferIncoming);
    }

    acc
}

/// Merge the effective grant sets of sibling dependencies in declaration
/// order: first writer wins on plain keys, `override` entries replace.
pub(crate) fn merge_dependency_grants(deps: &[VerifiedLicense]) -> BTreeMap<String, Grant> {
    let mut acc: BTreeMap<String, Grant> = BTreeMap::new();
    for dep in deps {
        for (service, grant) in effective_grants(dep) {
            let entry = acc.entry(service).or_default();
            merge(&mut entry.0, &grant.0, MergePolicy::PreferExisting);
        }
    }
    acc
}

#[derive(Clone, Copy, PartialEq)]
enum MergePolicy {
    /// First writer wins on scalar conflicts (dependency order).
    PreferExisting,
    /// Incoming wins on scalar conflicts (a license's own grant).
    PreferIncoming,
}

/// Key-wise deep merge of `incoming` into `base`.
///
/// Entries under `override` bypass the policy: they replace whatever sits
/// at the same key, and the `override` wrapper itself never appears in the
/// result.
fn merge(
    base: &mut BTreeMap<String, GrantValue>,
    incoming: &BTreeMap<String, GrantValue>,
    policy: MergePolicy,
) {
    for (key, value) in incoming {
        if key == OVERRIDE_KEY {
            if let GrantValue::Map(entries) = value {
                for (okey, ovalue) in entries {
                    base.insert(okey.clone(), strip_override(ovalue));
                }
            }
            continue;
        }

        match (base.get_mut(key), value) {
            (Some(GrantValue::Map(existing)), GrantValue::Map(inner)) => {
                merge(existing, inner, policy);
            }
            (Some(existing), _) => {
                if policy == MergePolicy::PreferIncoming {
                    *existing = strip_override(value);
                }
            }
            (None, _) => {
                base.insert(key.clone(), strip_override(value));
            }
        }
    }
}

/// Drop `override` wrappers from a value being introduced wholesale, so the
/// qualifier never leaks into an effective grant.
fn strip_override(value: &GrantValue) -> GrantValue {
    match value {
        GrantValue::Map(map) => {
            let mut out = BTreeMap::new();
            for (key, inner) in map {
                if key == OVERRIDE_KEY {
                    if let GrantValue::Map(entries) = inner {
                        for (okey, ovalue) in entries {
                            out.insert(okey.clone(), strip_override(ovalue));
                        }
                    }
                } else {
                    out.insert(key.clone(), strip_override(inner));
                }
            }
            GrantValue::Map(out)
        }
        other => other.clone(),
    }
}
