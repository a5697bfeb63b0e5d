use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use pkg_constants::meta::{CONTROLLER_IDENTITY, LABEL_TENANT};
use pkg_constants::state::ADMISSION_TIMEOUT_MS;
use pkg_ledger::Ledger;
use pkg_types::quota::ResourceQuota;
use pkg_types::tenant::TenantQuota;

use crate::error::{AdmissionError, ValidationErrors, Violation, ViolationReason};

/// Validates every ResourceQuota create/update before it is persisted.
///
/// Two independent checks run: the tenant label may only be changed by
/// the controller's own identity, and the incoming `hard` map must fit
/// inside the owning tenant's aggregate budget given the last-known
/// allocation snapshot. Reads against the ledger are bounded by a
/// deadline; a slow or unreachable ledger rejects the write instead of
/// blocking the caller.
#[derive(Clone)]
pub struct QuotaValidator {
    ledger: Ledger,
    deadline: Duration,
}

impl QuotaValidator {
    pub fn new(ledger: Ledger) -> QuotaValidator {
        QuotaValidator {
            ledger,
            deadline: Duration::from_millis(ADMISSION_TIMEOUT_MS),
        }
    }

    pub fn with_deadline(ledger: Ledger, deadline: Duration) -> QuotaValidator {
        QuotaValidator { ledger, deadline }
    }

    pub async fn validate_create(&self, new: &ResourceQuota) -> Result<(), AdmissionError> {
        self.validate_budget(new).await
    }

    pub async fn validate_update(
        &self,
        actor: &str,
        old: &ResourceQuota,
        new: &ResourceQuota,
    ) -> Result<(), AdmissionError> {
        self.validate_label_change(actor, old, new)?;
        self.validate_budget(new).await
    }

    /// The tenant label, once set, belongs to the controller. Anyone
    /// else changing it (including adding or removing it) is rejected.
    fn validate_label_change(
        &self,
        actor: &str,
        old: &ResourceQuota,
        new: &ResourceQuota,
    ) -> Result<(), AdmissionError> {
        if actor == CONTROLLER_IDENTITY {
            return Ok(());
        }
        let old_label = old.labels.get(LABEL_TENANT).map(String::as_str).unwrap_or("");
        let new_label = new.labels.get(LABEL_TENANT).map(String::as_str).unwrap_or("");
        if old_label != new_label {
            let err = ValidationErrors {
                kind: "ResourceQuota",
                name: new.name.clone(),
                violations: vec![Violation {
                    field: format!("metadata.labels.{LABEL_TENANT}"),
                    reason: ViolationReason::Immutable,
                    message: "tenant label is immutable".to_string(),
                }],
            };
            warn!(quota = %new.name, actor, "validation error: {}", err);
            return Err(err.into());
        }
        Ok(())
    }

    async fn validate_budget(&self, quota: &ResourceQuota) -> Result<(), AdmissionError> {
        // Untracked objects are none of our business.
        let Some(tenant_name) = quota.tenant_label() else {
            return Ok(());
        };

        let tenant = self.fetch_tenant(tenant_name).await?;

        let mut violations = Vec::new();
        for (key, requested) in &quota.hard {
            // No ceiling declared for this key: ignore it.
            let Some(limit) = tenant.spec.hard.get(key) else {
                continue;
            };
            // Zero is always allowed; it is how slots are reserved and
            // how allocations are handed back.
            if requested.is_zero() {
                continue;
            }

            let allocated = tenant.status.allocated.get(key).cloned().unwrap_or_default();
            let mut new_total = allocated.total;
            if let Some(prior) = allocated.namespaces.get(&quota.namespace) {
                // A decrease of this namespace's own contribution can
                // never push the aggregate up; let it through even if
                // the snapshot is stale.
                if requested <= prior {
                    continue;
                }
                new_total = new_total.saturating_sub(*prior);
            }
            new_total = new_total.saturating_add(*requested);

            if new_total > *limit {
                violations.push(Violation {
                    field: format!("spec.hard.{key}"),
                    reason: ViolationReason::Forbidden,
                    message: format!(
                        "exceeded tenant quota: {tenant_name}, requested: {key}={requested}, total: {key}={new_total}, limited: {key}={limit}"
                    ),
                });
            }
        }

        // Every governed key must be declared, even as zero.
        for key in tenant.spec.hard.keys() {
            if !quota.hard.contains_key(key) {
                violations.push(Violation {
                    field: format!("spec.hard.{key}"),
                    reason: ViolationReason::Required,
                    message: format!("required {key} by tenant quota: {tenant_name}"),
                });
            }
        }

        if !violations.is_empty() {
            let err = ValidationErrors {
                kind: "ResourceQuota",
                name: quota.name.clone(),
                violations,
            };
            warn!(quota = %quota.name, namespace = %quota.namespace, "validation error: {}", err);
            return Err(err.into());
        }
        Ok(())
    }

    async fn fetch_tenant(&self, name: &str) -> Result<TenantQuota, AdmissionError> {
        match timeout(self.deadline, self.ledger.get_tenant(name)).await {
            Err(_) => Err(AdmissionError::Unavailable(format!(
                "tenant quota {name} lookup timed out"
            ))),
            Ok(Err(e)) => Err(AdmissionError::Unavailable(format!(
                "tenant quota {name} lookup failed: {e}"
            ))),
            Ok(Ok(None)) => Err(AdmissionError::Unavailable(format!(
                "tenant quota {name} not found"
            ))),
            Ok(Ok(Some(tenant))) => Ok(tenant),
        }
    }
}
