//! Shared object model for quotient: resource quantities, label selectors,
//! and the tenant / namespace / quota types persisted in the state store.

pub mod config;
pub mod namespace;
pub mod quantity;
pub mod quota;
pub mod selector;
pub mod tenant;
pub mod validate;
