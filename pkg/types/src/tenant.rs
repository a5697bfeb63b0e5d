use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quantity::Quantity;
use crate::selector::LabelSelector;

/// Cluster-scoped aggregate budget divided among the namespaces its
/// selector matches. The spec is what an operator declares; the status is
/// a derived view rebuilt from the per-namespace ResourceQuotas on every
/// reconcile pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantQuota {
    pub name: String,
    #[serde(default)]
    pub spec: TenantQuotaSpec,
    #[serde(default)]
    pub status: TenantQuotaStatus,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set when deletion has been requested; the object stays visible
    /// until every finalizer has been removed.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantQuotaSpec {
    /// Aggregate ceiling per resource key across all selected namespaces.
    #[serde(default)]
    pub hard: BTreeMap<String, Quantity>,
    /// Selects the namespaces this tenant governs. Absent matches none.
    #[serde(default)]
    pub namespace_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantQuotaStatus {
    /// Sum of per-namespace `hard` ceilings, per resource key.
    #[serde(default)]
    pub allocated: BTreeMap<String, ResourceUsage>,
    /// Sum of per-namespace observed usage, per resource key.
    #[serde(default)]
    pub used: BTreeMap<String, ResourceUsage>,
}

/// One resource key's aggregate across a tenant's namespaces, with the
/// per-namespace contributions that make up the total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub total: Quantity,
    #[serde(default)]
    pub namespaces: BTreeMap<String, Quantity>,
}

impl TenantQuota {
    pub fn new(name: &str, spec: TenantQuotaSpec) -> TenantQuota {
        TenantQuota {
            name: name.to_string(),
            spec,
            status: TenantQuotaStatus::default(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers.push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }
}
