//! Background controllers. The tenant quota controller watches the
//! event log, maps each change to the tenants it affects, and drives
//! per-namespace ResourceQuotas toward each tenant's declared budget.

pub mod mapper;
pub mod tenant;

pub use tenant::{TenantQuotaController, TenantQuotaReconciler};
