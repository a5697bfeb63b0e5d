//! Reverse-index mapping from watched objects to the tenants that must
//! be re-reconciled. The index is recomputed from the live tenant list
//! on every event rather than maintained incrementally; tenant counts
//! are small and the lazy form cannot go stale.

use std::collections::HashMap;

use tracing::warn;

use pkg_constants::meta::QUOTA_NAME_DEFAULT;
use pkg_constants::state::{REGISTRY_NAMESPACES, REGISTRY_QUOTAS, REGISTRY_TENANTS};
use pkg_ledger::Ledger;
use pkg_state::watch::WatchEvent;
use pkg_types::namespace::Namespace;
use pkg_types::quota::ResourceQuota;
use pkg_types::selector::selects;
use pkg_types::tenant::TenantQuota;

/// Tenants whose selector matches a namespace with these labels.
///
/// A malformed selector cannot match anything and must not poison the
/// dispatch for the remaining tenants: it is logged and that tenant is
/// skipped for this event.
pub fn tenants_for_namespace_event(
    tenants: &[TenantQuota],
    labels: &HashMap<String, String>,
) -> Vec<String> {
    let mut matched = Vec::new();
    for tenant in tenants {
        match selects(tenant.spec.namespace_selector.as_ref(), labels) {
            Ok(true) => matched.push(tenant.name.clone()),
            Ok(false) => {}
            Err(e) => {
                warn!(
                    tenant = %tenant.name,
                    "Skipping tenant with invalid namespace selector: {}", e
                );
            }
        }
    }
    matched
}

/// Tenants affected by a change to a ResourceQuota.
///
/// Fast path: the tenant label names the owner directly. Slow path: an
/// unlabeled quota under the well-known name may sit in a namespace that
/// just became eligible, so selectors are re-evaluated against the
/// owning namespace. Unlabeled quotas under any other name are nobody's
/// concern.
pub fn tenants_for_quota_event(
    tenants: &[TenantQuota],
    quota: &ResourceQuota,
    owner: Option<&Namespace>,
) -> Vec<String> {
    if let Some(tenant) = quota.tenant_label() {
        return vec![tenant.to_string()];
    }
    if quota.name != QUOTA_NAME_DEFAULT {
        return Vec::new();
    }
    match owner {
        Some(namespace) => tenants_for_namespace_event(tenants, &namespace.labels),
        None => Vec::new(),
    }
}

/// Resolve one watch event to the tenants to enqueue.
///
/// Keys outside the three watched prefixes (leases, future object
/// kinds) map to nothing. A namespace deletion arrives without the
/// label set that was just removed, so every tenant is requeued and
/// each pass sorts out what it still selects.
pub async fn tenants_for_event(ledger: &Ledger, event: &WatchEvent) -> anyhow::Result<Vec<String>> {
    if let Some(name) = event.key.strip_prefix(REGISTRY_TENANTS) {
        return Ok(vec![name.to_string()]);
    }

    if event.key.strip_prefix(REGISTRY_NAMESPACES).is_some() {
        let tenants = ledger.list_tenants().await?;
        return Ok(match &event.value {
            Some(data) => {
                let namespace: Namespace = serde_json::from_slice(data)?;
                tenants_for_namespace_event(&tenants, &namespace.labels)
            }
            None => tenants.into_iter().map(|t| t.name).collect(),
        });
    }

    if let Some(path) = event.key.strip_prefix(REGISTRY_QUOTAS) {
        // Quota keys are `{namespace}/{name}`.
        let Some((ns_name, quota_name)) = path.split_once('/') else {
            return Ok(Vec::new());
        };
        let tenants = ledger.list_tenants().await?;
        return Ok(match &event.value {
            Some(data) => {
                let quota: ResourceQuota = serde_json::from_slice(data)?;
                let owner = if quota.tenant_label().is_none() && quota.name == QUOTA_NAME_DEFAULT {
                    ledger.get_namespace(ns_name).await?
                } else {
                    None
                };
                tenants_for_quota_event(&tenants, &quota, owner.as_ref())
            }
            None => {
                // The managed quota vanished; tenants selecting its
                // namespace need a pass to recreate it.
                if quota_name != QUOTA_NAME_DEFAULT {
                    return Ok(Vec::new());
                }
                match ledger.get_namespace(ns_name).await? {
                    Some(namespace) => tenants_for_namespace_event(&tenants, &namespace.labels),
                    None => Vec::new(),
                }
            }
        });
    }

    Ok(Vec::new())
}
