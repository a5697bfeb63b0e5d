//! Field-ownership merge rules for ResourceQuota writes.
//!
//! Two write styles exist, mirroring the two ways actors reach the
//! ledger. A *managed apply* asserts the full set of fields one manager
//! cares about: the manager ends up owning exactly the keys in its
//! patch, keys it previously owned but stopped applying are removed,
//! and keys owned by anyone else are left alone. A *plain update*
//! replaces the whole object; ownership follows the values, moving to
//! the updating actor only for keys whose value actually changed.

use std::collections::{BTreeMap, HashMap};

use pkg_constants::meta::{CONTROLLER_IDENTITY, CREATED_BY, LABEL_CREATED_BY, LABEL_TENANT};
use pkg_types::quantity::Quantity;
use pkg_types::quota::ResourceQuota;
use pkg_types::tenant::TenantQuota;

/// The labels and `hard` entries one manager asserts in a managed apply.
#[derive(Debug, Clone, Default)]
pub struct QuotaApply {
    pub labels: HashMap<String, String>,
    pub hard: BTreeMap<String, Quantity>,
}

/// The patch the reconciler asserts on a namespace's quota: both
/// ownership labels plus a zero entry for every tenant-governed key not
/// currently claimed by another writer.
///
/// Zero reserves the key; the real per-namespace ceiling is left for an
/// operator to fill in, and the aggregate ceiling is enforced at
/// admission time rather than through this write.
pub fn reservation_patch(tenant: &TenantQuota, current: Option<&ResourceQuota>) -> QuotaApply {
    let foreign = current
        .map(|q| q.foreign_owned_keys(CONTROLLER_IDENTITY))
        .unwrap_or_default();
    QuotaApply {
        labels: HashMap::from([
            (LABEL_CREATED_BY.to_string(), CREATED_BY.to_string()),
            (LABEL_TENANT.to_string(), tenant.name.clone()),
        ]),
        hard: tenant
            .spec
            .hard
            .keys()
            .filter(|key| !foreign.contains(*key))
            .map(|key| (key.clone(), Quantity::zero()))
            .collect(),
    }
}

/// Merge `patch` into `current` on behalf of `manager`.
///
/// Callers that must not steal foreign fields (the reconciler) exclude
/// them from the patch up front; a key that does appear in the patch
/// always wins and transfers ownership to `manager`.
pub fn apply_managed(
    current: Option<&ResourceQuota>,
    namespace: &str,
    name: &str,
    manager: &str,
    patch: &QuotaApply,
) -> ResourceQuota {
    let mut quota = match current {
        Some(q) => q.clone(),
        None => ResourceQuota::new(namespace, name),
    };

    // Keys this manager previously applied but no longer does are dropped.
    let stale: Vec<String> = quota
        .field_owners
        .iter()
        .filter(|(key, owner)| owner.as_str() == manager && !patch.hard.contains_key(*key))
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        quota.hard.remove(&key);
        quota.field_owners.remove(&key);
    }

    for (key, value) in &patch.hard {
        quota.hard.insert(key.clone(), *value);
        quota.field_owners.insert(key.clone(), manager.to_string());
    }

    for (key, value) in &patch.labels {
        quota.labels.insert(key.clone(), value.clone());
    }

    quota
}

/// Would applying `patch` as `manager` change `current` at all?
/// True when the manager already owns exactly the patch keys with the
/// patch values and all patch labels are present.
pub fn already_applied(current: &ResourceQuota, manager: &str, patch: &QuotaApply) -> bool {
    if current.owned_hard(manager) != patch.hard {
        return false;
    }
    patch
        .labels
        .iter()
        .all(|(key, value)| current.labels.get(key) == Some(value))
}

/// Recompute field ownership after a plain full-object update by `actor`.
///
/// Ownership moves to `actor` only for keys that are new or whose value
/// changed; untouched keys keep their previous owner; keys removed from
/// `hard` lose their owner entry.
pub fn transfer_changed_owners(old: Option<&ResourceQuota>, new: &mut ResourceQuota, actor: &str) {
    let mut owners = BTreeMap::new();
    for (key, value) in &new.hard {
        let previous = old.and_then(|q| q.hard.get(key));
        let owner = if previous == Some(value) {
            old.and_then(|q| q.field_owners.get(key))
                .cloned()
                .unwrap_or_else(|| actor.to_string())
        } else {
            actor.to_string()
        };
        owners.insert(key.clone(), owner);
    }
    new.field_owners = owners;
}

/// Remove both ownership labels, releasing the quota back to unmanaged.
/// The object itself and its `hard`/`used` values are left intact.
pub fn strip_ownership_labels(quota: &mut ResourceQuota) {
    quota.labels.remove(LABEL_TENANT);
    quota.labels.remove(LABEL_CREATED_BY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::tenant::TenantQuotaSpec;

    fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.parse().unwrap()))
            .collect()
    }

    fn ownership_labels(tenant: &str) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_CREATED_BY.to_string(), CREATED_BY.to_string()),
            (LABEL_TENANT.to_string(), tenant.to_string()),
        ])
    }

    fn controller_patch(tenant: &str, hard: &[(&str, &str)]) -> QuotaApply {
        QuotaApply {
            labels: ownership_labels(tenant),
            hard: quantities(hard),
        }
    }

    #[test]
    fn apply_creates_with_labels_and_ownership() {
        let patch = controller_patch("team-a", &[("limits.cpu", "0"), ("requests.cpu", "0")]);
        let quota = apply_managed(None, "ns1", "default", CONTROLLER_IDENTITY, &patch);

        assert_eq!(quota.namespace, "ns1");
        assert_eq!(quota.tenant_label(), Some("team-a"));
        assert_eq!(quota.labels.get(LABEL_CREATED_BY).map(String::as_str), Some(CREATED_BY));
        assert_eq!(quota.hard, quantities(&[("limits.cpu", "0"), ("requests.cpu", "0")]));
        assert!(quota.field_owners.values().all(|m| m == CONTROLLER_IDENTITY));
    }

    #[test]
    fn user_edited_key_survives_reapply() {
        // Controller reserves two keys, a user takes over one of them,
        // then the tenant grows a third key.
        let generated = apply_managed(
            None,
            "ns1",
            "default",
            CONTROLLER_IDENTITY,
            &controller_patch("team-a", &[("limits.cpu", "0"), ("requests.cpu", "0")]),
        );

        let mut edited = generated.clone();
        edited.hard.insert("limits.cpu".to_string(), "50m".parse().unwrap());
        let mut updated = edited.clone();
        transfer_changed_owners(Some(&generated), &mut updated, "kubectl");
        assert_eq!(updated.field_owners.get("limits.cpu").map(String::as_str), Some("kubectl"));
        assert_eq!(
            updated.field_owners.get("requests.cpu").map(String::as_str),
            Some(CONTROLLER_IDENTITY)
        );

        // The reconciler's next patch excludes the foreign key.
        let foreign = updated.foreign_owned_keys(CONTROLLER_IDENTITY);
        assert!(foreign.contains("limits.cpu"));
        let patch = controller_patch(
            "team-a",
            &[("requests.cpu", "0"), ("limits.memory", "0")],
        );
        let result = apply_managed(Some(&updated), "ns1", "default", CONTROLLER_IDENTITY, &patch);

        assert_eq!(
            result.hard,
            quantities(&[
                ("limits.cpu", "50m"),
                ("requests.cpu", "0"),
                ("limits.memory", "0"),
            ])
        );
    }

    #[test]
    fn stale_controller_key_is_dropped_user_key_kept() {
        // Tenant governs three keys, a user claims one, then the tenant
        // shrinks to a single key.
        let generated = apply_managed(
            None,
            "ns1",
            "default",
            CONTROLLER_IDENTITY,
            &controller_patch(
                "team-a",
                &[
                    ("limits.cpu", "0"),
                    ("requests.cpu", "0"),
                    ("requests.memory", "0"),
                ],
            ),
        );

        let mut edited = generated.clone();
        edited.hard.insert("limits.cpu".to_string(), "50m".parse().unwrap());
        let mut updated = edited.clone();
        transfer_changed_owners(Some(&generated), &mut updated, "kubectl");

        let patch = controller_patch("team-a", &[("requests.cpu", "0")]);
        let result = apply_managed(Some(&updated), "ns1", "default", CONTROLLER_IDENTITY, &patch);

        // requests.memory was controller-owned and no longer applied;
        // limits.cpu is the user's and must survive.
        assert_eq!(
            result.hard,
            quantities(&[("limits.cpu", "50m"), ("requests.cpu", "0")])
        );
        assert!(!result.field_owners.contains_key("requests.memory"));
    }

    #[test]
    fn plain_update_transfers_only_changed_keys() {
        let generated = apply_managed(
            None,
            "ns1",
            "default",
            CONTROLLER_IDENTITY,
            &controller_patch("team-a", &[("limits.cpu", "0"), ("requests.cpu", "0")]),
        );

        let mut new = generated.clone();
        new.hard = quantities(&[("limits.cpu", "50m"), ("requests.cpu", "0")]);
        transfer_changed_owners(Some(&generated), &mut new, "alice");

        assert_eq!(new.field_owners.get("limits.cpu").map(String::as_str), Some("alice"));
        assert_eq!(
            new.field_owners.get("requests.cpu").map(String::as_str),
            Some(CONTROLLER_IDENTITY)
        );
    }

    #[test]
    fn plain_update_drops_owners_of_removed_keys() {
        let generated = apply_managed(
            None,
            "ns1",
            "default",
            CONTROLLER_IDENTITY,
            &controller_patch("team-a", &[("limits.cpu", "0"), ("requests.cpu", "0")]),
        );

        let mut new = generated.clone();
        new.hard = quantities(&[("limits.cpu", "0")]);
        transfer_changed_owners(Some(&generated), &mut new, "alice");

        assert!(!new.field_owners.contains_key("requests.cpu"));
        // Unchanged value keeps the controller as owner.
        assert_eq!(
            new.field_owners.get("limits.cpu").map(String::as_str),
            Some(CONTROLLER_IDENTITY)
        );
    }

    #[test]
    fn already_applied_detects_fixed_point() {
        let patch = controller_patch("team-a", &[("limits.cpu", "0")]);
        let quota = apply_managed(None, "ns1", "default", CONTROLLER_IDENTITY, &patch);
        assert!(already_applied(&quota, CONTROLLER_IDENTITY, &patch));

        let grown = controller_patch("team-a", &[("limits.cpu", "0"), ("limits.memory", "0")]);
        assert!(!already_applied(&quota, CONTROLLER_IDENTITY, &grown));

        // A foreign manager owning a patch key breaks the fixed point.
        let mut stolen = quota.clone();
        stolen
            .field_owners
            .insert("limits.cpu".to_string(), "kubectl".to_string());
        assert!(!already_applied(&stolen, CONTROLLER_IDENTITY, &patch));
    }

    #[test]
    fn strip_leaves_values_in_place() {
        let mut quota = apply_managed(
            None,
            "ns1",
            "default",
            CONTROLLER_IDENTITY,
            &controller_patch("team-a", &[("limits.cpu", "0")]),
        );
        quota.used.insert("limits.cpu".to_string(), "10m".parse().unwrap());

        strip_ownership_labels(&mut quota);

        assert!(quota.labels.is_empty());
        assert_eq!(quota.hard, quantities(&[("limits.cpu", "0")]));
        assert_eq!(quota.used.get("limits.cpu").unwrap().millis(), 10);
    }

    fn tenant_governing(keys: &[&str]) -> TenantQuota {
        TenantQuota::new(
            "team-a",
            TenantQuotaSpec {
                hard: keys.iter().map(|k| (k.to_string(), "1".parse().unwrap())).collect(),
                namespace_selector: None,
            },
        )
    }

    #[test]
    fn reservation_zeroes_every_unclaimed_governed_key() {
        let tenant = tenant_governing(&["limits.cpu", "limits.memory"]);
        let patch = reservation_patch(&tenant, None);

        assert_eq!(patch.labels, ownership_labels("team-a"));
        assert_eq!(
            patch.hard,
            quantities(&[("limits.cpu", "0"), ("limits.memory", "0")])
        );
    }

    #[test]
    fn reservation_excludes_foreign_owned_keys() {
        let tenant = tenant_governing(&["limits.cpu", "limits.memory"]);
        let mut quota = ResourceQuota::new("ns1", "default");
        quota.hard.insert("limits.cpu".to_string(), "50m".parse().unwrap());
        quota
            .field_owners
            .insert("limits.cpu".to_string(), "kubectl".to_string());

        let patch = reservation_patch(&tenant, Some(&quota));
        assert_eq!(patch.hard, quantities(&[("limits.memory", "0")]));
    }
}
