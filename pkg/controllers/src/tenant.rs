//! The tenant quota controller.
//!
//! A reconcile pass re-derives everything from the ledger: it evaluates
//! the tenant's namespace selector, reserves a governed quota in every
//! matched namespace through the field-ownership merge, releases quotas
//! whose namespace fell out of scope, and republishes the aggregate
//! status. Passes are idempotent, so duplicate or out-of-order events
//! only cost an extra no-op pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use pkg_admission::QuotaValidator;
use pkg_constants::meta::{CONTROLLER_IDENTITY, FINALIZER, QUOTA_NAME_DEFAULT};
use pkg_constants::state::{BACKOFF_BASE_MS, BACKOFF_MAX_SECS};
use pkg_ledger::Ledger;
use pkg_ledger::apply::{already_applied, apply_managed, reservation_patch, strip_ownership_labels};
use pkg_state::watch::WatchEvent;
use pkg_types::namespace::Namespace;
use pkg_types::quantity::Quantity;
use pkg_types::quota::ResourceQuota;
use pkg_types::selector::SelectorError;
use pkg_types::tenant::{ResourceUsage, TenantQuota, TenantQuotaStatus};

use crate::mapper;

/// One tenant's reconcile logic, free of any scheduling concerns.
///
/// Writes go through the same admission validator as external writers;
/// the controller identity only exempts them from the label-immutability
/// rule, not from the budget rules.
#[derive(Clone)]
pub struct TenantQuotaReconciler {
    ledger: Ledger,
    validator: QuotaValidator,
}

impl TenantQuotaReconciler {
    pub fn new(ledger: Ledger) -> Self {
        let validator = QuotaValidator::new(ledger.clone());
        Self { ledger, validator }
    }

    /// Run one full pass for the named tenant.
    ///
    /// A missing tenant is not an error; the deletion that removed it
    /// also triggered this pass. A malformed selector is logged and the
    /// pass is skipped, since retrying cannot fix a parse error.
    pub async fn reconcile(&self, name: &str) -> anyhow::Result<()> {
        let Some(tenant) = self.ledger.get_tenant(name).await? else {
            debug!(tenant = %name, "Tenant gone, nothing to reconcile");
            return Ok(());
        };

        if tenant.is_deleting() {
            return self.finalize(tenant).await;
        }

        let matched = match self
            .ledger
            .select_namespaces(tenant.spec.namespace_selector.as_ref())
            .await
        {
            Ok(namespaces) => namespaces,
            Err(e) if e.downcast_ref::<SelectorError>().is_some() => {
                warn!(tenant = %tenant.name, "Invalid namespace selector, skipping pass: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for ns in &matched {
            self.ensure_quota(&tenant, &ns.name).await?;
        }

        let matched_names: BTreeSet<&str> = matched.iter().map(|ns| ns.name.as_str()).collect();
        self.release_unmatched(&tenant, &matched_names).await?;

        self.update_status(&tenant, &matched).await
    }

    /// Deletion phase: release every quota this tenant still owns, then
    /// drop the finalizer so the object can go away.
    async fn finalize(&self, mut tenant: TenantQuota) -> anyhow::Result<()> {
        if !tenant.has_finalizer(FINALIZER) {
            return Ok(());
        }
        for quota in self.ledger.list_resource_quotas_by_tenant(&tenant.name).await? {
            self.release(&tenant.name, quota).await?;
        }
        tenant.remove_finalizer(FINALIZER);
        // With deletion pending and no finalizers left, this write
        // removes the object from the store.
        self.ledger.put_tenant(&tenant).await?;
        info!(tenant = %tenant.name, "Finalized deleting tenant");
        Ok(())
    }

    /// Reserve the governed quota in one matched namespace: create it if
    /// absent, merge the reservation patch if ours, leave it alone if
    /// another tenant got there first.
    async fn ensure_quota(&self, tenant: &TenantQuota, namespace: &str) -> anyhow::Result<()> {
        let current = self.ledger.get_default_quota(namespace).await?;

        if let Some(quota) = &current {
            if let Some(owner) = quota.tenant_label() {
                if owner != tenant.name {
                    warn!(
                        tenant = %tenant.name,
                        namespace,
                        "Quota already owned by tenant {}, leaving it untouched", owner
                    );
                    return Ok(());
                }
            }
        }

        let patch = reservation_patch(tenant, current.as_ref());
        if let Some(quota) = &current {
            if already_applied(quota, CONTROLLER_IDENTITY, &patch) {
                return Ok(());
            }
        }

        let desired = apply_managed(
            current.as_ref(),
            namespace,
            QUOTA_NAME_DEFAULT,
            CONTROLLER_IDENTITY,
            &patch,
        );
        match &current {
            Some(old) => {
                self.validator
                    .validate_update(CONTROLLER_IDENTITY, old, &desired)
                    .await?;
            }
            None => self.validator.validate_create(&desired).await?,
        }
        self.ledger.put_resource_quota(&desired).await?;
        info!(
            tenant = %tenant.name,
            namespace,
            "Applied quota reservation for {} governed keys",
            patch.hard.len()
        );
        Ok(())
    }

    /// Release every quota still labeled for this tenant whose namespace
    /// the selector no longer matches.
    async fn release_unmatched(
        &self,
        tenant: &TenantQuota,
        matched: &BTreeSet<&str>,
    ) -> anyhow::Result<()> {
        for quota in self.ledger.list_resource_quotas_by_tenant(&tenant.name).await? {
            if matched.contains(quota.namespace.as_str()) {
                continue;
            }
            self.release(&tenant.name, quota).await?;
        }
        Ok(())
    }

    /// Strip both ownership labels, returning the quota to unmanaged.
    /// The object itself and its `hard`/`used` values stay behind.
    async fn release(&self, tenant: &str, quota: ResourceQuota) -> anyhow::Result<()> {
        let mut released = quota.clone();
        strip_ownership_labels(&mut released);
        self.validator
            .validate_update(CONTROLLER_IDENTITY, &quota, &released)
            .await?;
        self.ledger.put_resource_quota(&released).await?;
        info!(
            tenant,
            namespace = %released.namespace,
            "Released quota back to unmanaged"
        );
        Ok(())
    }

    /// Rebuild the aggregate status from the matched namespaces' quotas
    /// and persist it only when it actually changed.
    async fn update_status(
        &self,
        tenant: &TenantQuota,
        matched: &[Namespace],
    ) -> anyhow::Result<()> {
        let mut status = TenantQuotaStatus::default();
        for ns in matched {
            let Some(quota) = self.ledger.get_default_quota(&ns.name).await? else {
                anyhow::bail!(
                    "quota for selected namespace {} missing during aggregation",
                    ns.name
                );
            };
            // The label can move between the selector evaluation and this
            // read when another tenant's pass claims the namespace; count
            // only what is really ours and let the next pass settle it.
            if quota.tenant_label() != Some(tenant.name.as_str()) {
                warn!(
                    tenant = %tenant.name,
                    namespace = %ns.name,
                    "Quota is labeled for another owner, skipping in aggregation"
                );
                continue;
            }
            for (key, value) in &quota.hard {
                add_usage(&mut status.allocated, key, &ns.name, *value);
            }
            for (key, value) in &quota.used {
                add_usage(&mut status.used, key, &ns.name, *value);
            }
        }

        if tenant.status != status {
            self.ledger.update_tenant_status(&tenant.name, &status).await?;
            debug!(tenant = %tenant.name, "Published recomputed aggregate status");
        }
        Ok(())
    }
}

fn add_usage(
    aggregate: &mut BTreeMap<String, ResourceUsage>,
    key: &str,
    namespace: &str,
    value: Quantity,
) {
    let entry = aggregate.entry(key.to_string()).or_default();
    entry.total = entry.total.saturating_add(value);
    entry.namespaces.insert(namespace.to_string(), value);
}

/// Exponential backoff for failed passes, jittered over the upper half
/// so concurrent retries spread out instead of marching in step.
fn retry_delay(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << shift);
    let capped = exp.min(BACKOFF_MAX_SECS * 1_000);
    Duration::from_millis(rand::thread_rng().gen_range(capped / 2..=capped))
}

/// Event loop feeding the reconciler.
///
/// Every watched change is mapped to the tenants it affects and pushed
/// to a per-tenant worker. One worker per tenant serializes that
/// tenant's passes; different tenants reconcile concurrently. Requests
/// coalesce in a one-slot queue because a pass re-reads everything
/// anyway. Reconciliation only runs while this instance holds the
/// leader lease; on gaining it, and on a lagged watch stream, every
/// tenant is resynced.
pub struct TenantQuotaController {
    reconciler: TenantQuotaReconciler,
    resync: Duration,
    leader: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl TenantQuotaController {
    pub fn new(
        reconciler: TenantQuotaReconciler,
        resync: Duration,
        leader: watch::Receiver<bool>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reconciler,
            resync,
            leader,
            shutdown,
        }
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(
            "TenantQuotaController started (resync={}s)",
            self.resync.as_secs()
        );
        let mut leader = self.leader.clone();
        let mut shutdown = self.shutdown.clone();
        let mut events = self.reconciler.ledger.store().event_log.subscribe();
        let mut tick = tokio::time::interval(self.resync);
        let mut workers: HashMap<String, mpsc::Sender<()>> = HashMap::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if *leader.borrow() {
                        self.enqueue_all(&mut workers).await;
                    }
                }
                changed = leader.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *leader.borrow() {
                        info!("Leadership acquired, resyncing all tenants");
                        self.enqueue_all(&mut workers).await;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if *leader.borrow() {
                            self.dispatch(&event, &mut workers).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Watch stream lagged by {} events, resyncing all tenants", missed);
                        if *leader.borrow() {
                            self.enqueue_all(&mut workers).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("TenantQuotaController stopped");
    }

    async fn enqueue_all(&self, workers: &mut HashMap<String, mpsc::Sender<()>>) {
        match self.reconciler.ledger.list_tenants().await {
            Ok(tenants) => {
                for tenant in &tenants {
                    self.enqueue(&tenant.name, workers);
                }
            }
            Err(e) => warn!("Failed to list tenants for resync: {}", e),
        }
    }

    async fn dispatch(&self, event: &WatchEvent, workers: &mut HashMap<String, mpsc::Sender<()>>) {
        match mapper::tenants_for_event(&self.reconciler.ledger, event).await {
            Ok(tenants) => {
                for name in tenants {
                    self.enqueue(&name, workers);
                }
            }
            Err(e) => warn!(key = %event.key, "Failed to map watch event: {}", e),
        }
    }

    fn enqueue(&self, name: &str, workers: &mut HashMap<String, mpsc::Sender<()>>) {
        if let Some(tx) = workers.get(name) {
            // A refused send means a pass is already queued; that pass
            // will observe this change because it re-reads everything.
            let _ = tx.try_send(());
            return;
        }
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(());
        tokio::spawn(worker(
            self.reconciler.clone(),
            name.to_string(),
            rx,
            self.shutdown.clone(),
        ));
        workers.insert(name.to_string(), tx);
    }
}

/// Per-tenant worker: runs queued passes one at a time, retrying failed
/// ones with backoff until they succeed or shutdown is signaled.
async fn worker(
    reconciler: TenantQuotaReconciler,
    name: String,
    mut requests: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            request = requests.recv() => request,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };
        if request.is_none() {
            break;
        }

        let mut failures: u32 = 0;
        while let Err(e) = reconciler.reconcile(&name).await {
            failures += 1;
            let delay = retry_delay(failures);
            warn!(
                tenant = %name,
                "Reconcile failed (attempt {}), retrying in {:?}: {}", failures, delay, e
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
    debug!(tenant = %name, "Worker stopped");
}
