use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use pkg_constants::meta::LABEL_TENANT;

use crate::quantity::Quantity;

/// Per-namespace enforced quota object.
///
/// `hard` is the ceiling writers negotiate through admission; `used` is
/// observed consumption published by the external enforcement mechanism.
/// `field_owners` records, per resource key in `hard`, which write
/// identity last set it. The reconciler consults it so a key a human or
/// another tool has claimed is never clobbered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub hard: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub used: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub field_owners: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ResourceQuota {
    pub fn new(namespace: &str, name: &str) -> ResourceQuota {
        ResourceQuota {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: HashMap::new(),
            hard: BTreeMap::new(),
            used: BTreeMap::new(),
            field_owners: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// The owning tenant, if the tenant label is present and non-empty.
    pub fn tenant_label(&self) -> Option<&str> {
        self.labels
            .get(LABEL_TENANT)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Resource keys currently claimed by any writer other than
    /// `own_identity`. These are the keys a merge must leave untouched.
    pub fn foreign_owned_keys(&self, own_identity: &str) -> BTreeSet<String> {
        self.field_owners
            .iter()
            .filter(|(_, manager)| manager.as_str() != own_identity)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The subset of `hard` currently owned by `manager`.
    pub fn owned_hard(&self, manager: &str) -> BTreeMap<String, Quantity> {
        self.hard
            .iter()
            .filter(|(key, _)| self.field_owners.get(*key).map(String::as_str) == Some(manager))
            .map(|(key, value)| (key.clone(), *value))
            .collect()
    }
}
