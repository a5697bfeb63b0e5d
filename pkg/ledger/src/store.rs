use chrono::Utc;
use tracing::info;

use pkg_constants::meta::QUOTA_NAME_DEFAULT;
use pkg_constants::state::{REGISTRY_NAMESPACES, REGISTRY_QUOTAS, REGISTRY_TENANTS};
use pkg_state::client::StateStore;
use pkg_types::namespace::Namespace;
use pkg_types::quantity::Quantity;
use pkg_types::quota::ResourceQuota;
use pkg_types::selector::{LabelSelector, selects};
use pkg_types::tenant::{TenantQuota, TenantQuotaStatus};

/// Typed access to tenants, namespaces, and quotas over the state store.
///
/// All reads are eventually consistent snapshots: two consecutive calls
/// may observe different states, and callers must not assume
/// linearizability across them.
#[derive(Clone)]
pub struct Ledger {
    store: StateStore,
}

impl Ledger {
    pub fn new(store: StateStore) -> Ledger {
        Ledger { store }
    }

    /// The underlying store, for event log subscriptions.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn tenant_key(name: &str) -> String {
        format!("{REGISTRY_TENANTS}{name}")
    }

    fn namespace_key(name: &str) -> String {
        format!("{REGISTRY_NAMESPACES}{name}")
    }

    fn quota_key(namespace: &str, name: &str) -> String {
        format!("{REGISTRY_QUOTAS}{namespace}/{name}")
    }

    // ------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------

    pub async fn get_tenant(&self, name: &str) -> anyhow::Result<Option<TenantQuota>> {
        match self.store.get(&Self::tenant_key(name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn list_tenants(&self) -> anyhow::Result<Vec<TenantQuota>> {
        let entries = self.store.list_prefix(REGISTRY_TENANTS).await?;
        let mut tenants = Vec::with_capacity(entries.len());
        for (_, data) in entries {
            tenants.push(serde_json::from_slice(&data)?);
        }
        Ok(tenants)
    }

    /// Persist a tenant. A deleting tenant whose last finalizer has been
    /// removed is deleted from the store instead, completing the
    /// two-phase delete.
    pub async fn put_tenant(&self, tenant: &TenantQuota) -> anyhow::Result<()> {
        let key = Self::tenant_key(&tenant.name);
        if tenant.is_deleting() && tenant.finalizers.is_empty() {
            info!("Finalizers cleared, deleting tenant {}", tenant.name);
            return self.store.delete(&key).await;
        }
        self.store.put(&key, &serde_json::to_vec(tenant)?).await
    }

    /// Request deletion of a tenant. With finalizers present the tenant
    /// is only marked with a deletion timestamp and the reconciler takes
    /// it from there; without any it is removed outright.
    pub async fn mark_tenant_deleting(&self, name: &str) -> anyhow::Result<Option<TenantQuota>> {
        let Some(mut tenant) = self.get_tenant(name).await? else {
            return Ok(None);
        };
        if tenant.deletion_timestamp.is_none() {
            tenant.deletion_timestamp = Some(Utc::now());
        }
        self.put_tenant(&tenant).await?;
        Ok(Some(tenant))
    }

    /// Status-only write used by the reconciler; re-reads the object so
    /// a concurrent spec change is not clobbered.
    pub async fn update_tenant_status(
        &self,
        name: &str,
        status: &TenantQuotaStatus,
    ) -> anyhow::Result<()> {
        let Some(mut tenant) = self.get_tenant(name).await? else {
            anyhow::bail!("tenant {} vanished during status update", name);
        };
        tenant.status = status.clone();
        self.put_tenant(&tenant).await
    }

    // ------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------

    pub async fn get_namespace(&self, name: &str) -> anyhow::Result<Option<Namespace>> {
        match self.store.get(&Self::namespace_key(name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn list_namespaces(&self) -> anyhow::Result<Vec<Namespace>> {
        let entries = self.store.list_prefix(REGISTRY_NAMESPACES).await?;
        let mut namespaces = Vec::with_capacity(entries.len());
        for (_, data) in entries {
            namespaces.push(serde_json::from_slice(&data)?);
        }
        Ok(namespaces)
    }

    /// Namespaces the selector matches. A malformed selector surfaces
    /// as a `SelectorError` in the error chain so callers can treat it
    /// as a skip rather than a transient failure.
    pub async fn select_namespaces(
        &self,
        selector: Option<&LabelSelector>,
    ) -> anyhow::Result<Vec<Namespace>> {
        let mut matched = Vec::new();
        for ns in self.list_namespaces().await? {
            if selects(selector, &ns.labels)? {
                matched.push(ns);
            }
        }
        Ok(matched)
    }

    pub async fn put_namespace(&self, namespace: &Namespace) -> anyhow::Result<()> {
        self.store
            .put(
                &Self::namespace_key(&namespace.name),
                &serde_json::to_vec(namespace)?,
            )
            .await
    }

    // ------------------------------------------------------------
    // ResourceQuotas
    // ------------------------------------------------------------

    pub async fn get_resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<ResourceQuota>> {
        match self.store.get(&Self::quota_key(namespace, name)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// The managed quota of a namespace, under its fixed well-known name.
    pub async fn get_default_quota(&self, namespace: &str) -> anyhow::Result<Option<ResourceQuota>> {
        self.get_resource_quota(namespace, QUOTA_NAME_DEFAULT).await
    }

    pub async fn list_resource_quotas(&self, namespace: &str) -> anyhow::Result<Vec<ResourceQuota>> {
        let prefix = format!("{REGISTRY_QUOTAS}{namespace}/");
        let entries = self.store.list_prefix(&prefix).await?;
        let mut quotas = Vec::with_capacity(entries.len());
        for (_, data) in entries {
            quotas.push(serde_json::from_slice(&data)?);
        }
        Ok(quotas)
    }

    /// All quotas across namespaces carrying this tenant's label.
    pub async fn list_resource_quotas_by_tenant(
        &self,
        tenant: &str,
    ) -> anyhow::Result<Vec<ResourceQuota>> {
        let entries = self.store.list_prefix(REGISTRY_QUOTAS).await?;
        let mut quotas = Vec::new();
        for (_, data) in entries {
            let quota: ResourceQuota = serde_json::from_slice(&data)?;
            if quota.tenant_label() == Some(tenant) {
                quotas.push(quota);
            }
        }
        Ok(quotas)
    }

    /// Raw write of a ResourceQuota. Admission and ownership accounting
    /// happen in the callers; by the time an object reaches this point
    /// it has passed both.
    pub async fn put_resource_quota(&self, quota: &ResourceQuota) -> anyhow::Result<()> {
        self.store
            .put(
                &Self::quota_key(&quota.namespace, &quota.name),
                &serde_json::to_vec(quota)?,
            )
            .await
    }

    /// Publish observed consumption for a quota. `hard`, labels, and
    /// ownership are untouched; this is the external enforcement
    /// mechanism's input channel.
    pub async fn update_resource_quota_used(
        &self,
        namespace: &str,
        name: &str,
        used: std::collections::BTreeMap<String, Quantity>,
    ) -> anyhow::Result<Option<ResourceQuota>> {
        let Some(mut quota) = self.get_resource_quota(namespace, name).await? else {
            return Ok(None);
        };
        quota.used = used;
        self.put_resource_quota(&quota).await?;
        Ok(Some(quota))
    }
}
