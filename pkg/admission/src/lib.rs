//! Synchronous admission for ResourceQuota writes: the tenant-label
//! immutability rule and the aggregate budget check. Every write path,
//! the reconciler's own included, goes through here before anything is
//! persisted.

pub mod error;
pub mod validator;

pub use error::{AdmissionError, ValidationErrors, Violation, ViolationReason};
pub use validator::QuotaValidator;
