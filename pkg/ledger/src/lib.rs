//! The resource ledger: typed access to tenants, namespaces, and quotas
//! over the state store, plus the field-ownership merge rules used when
//! writing ResourceQuotas on behalf of a manager.

pub mod apply;
pub mod store;

pub use store::Ledger;
